//! agentloop library — re-exports internal modules for integration testing.
//!
//! Integration tests in `tests/` cannot access items from a binary crate.
//! This `lib.rs` creates a library target alongside the binary so that
//! `tests/acp_integration.rs` can import `agentloop::acp::AcpClient`, etc.
//!
//! **All application logic lives in the module files (src/acp/, src/config.rs, …).**
//! This file merely makes those modules reachable to external test crates.

pub mod acp;
pub mod adapter;
pub mod cli;
pub mod config;
pub mod context;
pub mod errors;
pub mod hooks;
pub mod interrupt;
pub mod journal;
pub mod orchestrator;
pub mod output;
pub mod safety;
pub mod tasks;
