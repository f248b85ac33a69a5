//! Terminal formatting and raw run logging.

pub mod formatter;
pub mod logger;
