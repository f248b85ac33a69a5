//! Unified error type for the orchestration engine.
//!
//! All modules use this error type for propagation across module boundaries.
//! The binary entry point wraps it in `anyhow` for display.

/// Errors the orchestration engine can produce.
///
/// Per-iteration adapter failures are recovered locally (fallback chain,
/// corrective feedback) and never unwind out of the controller. Safety
/// and loop stops are normal run outcomes, not errors; they are reported
/// through the run's stop reason.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Backend or tool not found / not reachable.
    #[error("backend unavailable: {0}")]
    Availability(String),

    /// Nonzero exit or process-level failure.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Subprocess, ACP request, or ACP session exceeded its deadline.
    #[error("timed out: {0}")]
    Timeout(String),

    /// Malformed message or unmatched response id.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Invalid limits or malformed configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// I/O failure talking to a subprocess or log file.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, EngineError>;
