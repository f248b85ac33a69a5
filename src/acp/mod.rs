//! Agent Client Protocol: newline-delimited JSON-RPC over a subprocess's
//! stdio. `protocol` holds the wire types, `session` the per-prompt
//! accumulator, `client` the process lifecycle and request routing, and
//! `adapter` the bridge into the adapter abstraction.

pub mod adapter;
pub mod client;
pub mod protocol;
pub mod session;

pub use adapter::AcpAdapter;
pub use client::AcpClient;
pub use session::{Session, ToolCall, ToolCallStatus};
