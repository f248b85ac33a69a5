//! Adapter abstraction: a uniform execution contract over agent backends.
//!
//! Each backend kind gets one [`Adapter`] implementation. The registry picks
//! a primary at startup and keeps an ordered fallback list (see
//! [`registry`]); the controller only ever talks to the trait.

pub mod command;
pub mod registry;

use std::collections::HashMap;
use std::fmt;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::Result;

/// Closed set of backend variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdapterKind {
    /// ACP agent spoken to over stdin/stdout JSON-RPC.
    Acp,
    /// `claude` CLI invoked per prompt.
    Claude,
    /// `codex` CLI invoked per prompt.
    Codex,
    /// `gemini` CLI invoked per prompt.
    Gemini,
}

impl AdapterKind {
    /// All variants in default priority order.
    pub const ALL: [AdapterKind; 4] = [
        AdapterKind::Acp,
        AdapterKind::Claude,
        AdapterKind::Codex,
        AdapterKind::Gemini,
    ];

    pub fn parse(s: &str) -> Option<AdapterKind> {
        match s {
            "acp" => Some(AdapterKind::Acp),
            "claude" => Some(AdapterKind::Claude),
            "codex" => Some(AdapterKind::Codex),
            "gemini" => Some(AdapterKind::Gemini),
            _ => None,
        }
    }
}

impl fmt::Display for AdapterKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterKind::Acp => write!(f, "acp"),
            AdapterKind::Claude => write!(f, "claude"),
            AdapterKind::Codex => write!(f, "codex"),
            AdapterKind::Gemini => write!(f, "gemini"),
        }
    }
}

/// How the backend decides whether a requested tool call may run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PermissionMode {
    /// Always allow.
    AutoApprove,
    /// Always refuse.
    DenyAll,
    /// Allow only tool names in the configured set.
    Allowlist(Vec<String>),
    /// Prompt an external decision-maker. Not wired to one yet: falls back
    /// to auto-approve with a warning on stderr, never silently.
    Interactive,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::AutoApprove
    }
}

/// Per-backend settings, supplied externally at construction.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub enabled: bool,
    /// Extra arguments appended to the backend invocation.
    pub extra_args: Vec<String>,
    /// Environment overrides for the spawned process.
    pub env: HashMap<String, String>,
    /// Wall-clock timeout for one execution.
    pub timeout: Duration,
    pub max_retries: u32,
    pub permission_mode: PermissionMode,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        AdapterConfig {
            enabled: true,
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout: Duration::from_secs(600),
            max_retries: 0,
            permission_mode: PermissionMode::default(),
        }
    }
}

/// Per-call options; unset fields take adapter-specific defaults.
#[derive(Debug, Clone, Default)]
pub struct ExecuteOptions {
    pub timeout: Option<Duration>,
    pub verbose: bool,
    pub model: Option<String>,
}

/// Result of one adapter execution.
#[derive(Debug, Clone)]
pub struct AdapterResponse {
    pub success: bool,
    pub output: String,
    /// Empty when `success` is true.
    pub error: String,
    pub tokens_used: u64,
    pub cost: f64,
    /// Free-form per-backend details (backend name, duration, exit code…).
    pub metadata: HashMap<String, String>,
}

impl AdapterResponse {
    pub fn ok(output: String) -> Self {
        AdapterResponse {
            success: true,
            output,
            error: String::new(),
            tokens_used: 0,
            cost: 0.0,
            metadata: HashMap::new(),
        }
    }

    pub fn failed(error: String) -> Self {
        AdapterResponse {
            success: false,
            output: String::new(),
            error,
            tokens_used: 0,
            cost: 0.0,
            metadata: HashMap::new(),
        }
    }
}

/// Uniform execution contract over heterogeneous agent backends.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// Which backend variant this adapter drives.
    fn kind(&self) -> AdapterKind;

    /// Probe the environment for this backend (binary on PATH, etc.).
    async fn check_availability(&self) -> bool;

    /// Execute a prompt. Infrastructure failures (spawn, timeout) surface as
    /// `Err`; an agent that ran but reported failure is an `Ok` response
    /// with `success == false`.
    async fn execute(&self, prompt: &str, options: &ExecuteOptions) -> Result<AdapterResponse>;

    /// Rough cost estimate in dollars for running this prompt once.
    fn estimate_cost(&self, prompt: &str) -> f64;
}
