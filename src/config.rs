//! Configuration: `.agentloop.toml` discovery, CLI overrides, and run identity.
//!
//! Settings come from three layers. Built-in defaults sit at the bottom,
//! a `.agentloop.toml` found by walking up from the working directory
//! overrides them, and CLI flags override both.

use serde::Deserialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::adapter::{AdapterConfig, AdapterKind, PermissionMode};
use crate::errors::{EngineError, Result};
use crate::safety::SafetyConfig;

pub const CONFIG_FILE_NAME: &str = ".agentloop.toml";

/// Contents of `.agentloop.toml`.
#[derive(Debug, Clone, Deserialize, Default)]
pub struct FileConfig {
    #[serde(default)]
    pub safety: SafetyConfig,
    #[serde(default)]
    pub run: RunSection,
    /// Per-backend sections keyed by adapter name ("acp", "claude", ...).
    #[serde(default)]
    pub adapters: HashMap<String, AdapterSection>,
}

/// The `[run]` section.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct RunSection {
    pub prompt_file: Option<String>,
    pub adapter: Option<String>,
    pub model: Option<String>,
    /// Checkpoint every N iterations (0 = disabled).
    pub checkpoint_interval: u32,
    /// Scan command run after each checkpoint.
    pub scan_command: Option<String>,
    /// Pause between iterations. Zero disables the pause.
    pub retry_delay_secs: u64,
}

/// One `[adapters.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AdapterSection {
    pub enabled: bool,
    pub command: Option<String>,
    pub extra_args: Vec<String>,
    pub env: HashMap<String, String>,
    pub timeout_secs: u64,
    pub max_retries: u32,
    pub permission_mode: Option<String>,
    /// Tool names permitted when `permission_mode = "allowlist"`.
    pub allowed_tools: Vec<String>,
}

impl Default for AdapterSection {
    fn default() -> Self {
        AdapterSection {
            enabled: true,
            command: None,
            extra_args: Vec::new(),
            env: HashMap::new(),
            timeout_secs: 600,
            max_retries: 0,
            permission_mode: None,
            allowed_tools: Vec::new(),
        }
    }
}

impl AdapterSection {
    /// Convert a file section into runtime adapter settings.
    pub fn to_adapter_config(&self) -> Result<AdapterConfig> {
        let permission_mode = match self.permission_mode.as_deref() {
            None | Some("auto_approve") => PermissionMode::AutoApprove,
            Some("deny_all") => PermissionMode::DenyAll,
            Some("allowlist") => PermissionMode::Allowlist(self.allowed_tools.clone()),
            Some("interactive") => PermissionMode::Interactive,
            Some(other) => {
                return Err(EngineError::Configuration(format!(
                    "unknown permission_mode '{}'",
                    other
                )))
            }
        };
        Ok(AdapterConfig {
            enabled: self.enabled,
            extra_args: self.extra_args.clone(),
            env: self.env.clone(),
            timeout: Duration::from_secs(self.timeout_secs),
            max_retries: self.max_retries,
            permission_mode,
        })
    }
}

/// A discovered project: root directory plus parsed file config.
#[derive(Debug, Clone)]
pub struct ProjectConfig {
    pub root: PathBuf,
    pub config: FileConfig,
}

/// Discover project configuration by walking up from CWD.
///
/// A missing `.agentloop.toml` is not an error: the CWD becomes the root
/// and defaults apply.
pub fn discover() -> Result<ProjectConfig> {
    let cwd = env::current_dir()?;
    discover_from(&cwd)
}

fn discover_from(start: &Path) -> Result<ProjectConfig> {
    let mut current = start;
    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.is_file() {
            let config = load_config(&config_path)?;
            return Ok(ProjectConfig {
                root: current.to_path_buf(),
                config,
            });
        }
        match current.parent() {
            Some(parent) => current = parent,
            None => {
                return Ok(ProjectConfig {
                    root: start.to_path_buf(),
                    config: FileConfig::default(),
                })
            }
        }
    }
}

fn load_config(path: &Path) -> Result<FileConfig> {
    let content = fs::read_to_string(path)?;
    toml::from_str(&content).map_err(|e| {
        EngineError::Configuration(format!("failed to parse {}: {}", path.display(), e))
    })
}

/// Generate a unique run ID: `run-{8 hex chars}`.
/// Uses a hash of timestamp and process ID.
fn generate_run_id() -> String {
    let mut hasher = DefaultHasher::new();
    std::time::SystemTime::now().hash(&mut hasher);
    std::process::id().hash(&mut hasher);
    let hash = hasher.finish();
    format!("run-{:08x}", hash as u32)
}

/// Fully resolved configuration for one run.
#[derive(Debug, Clone)]
pub struct Config {
    /// The base prompt driving the loop.
    pub prompt: String,
    pub safety: SafetyConfig,
    /// Backend forced via `--adapter`, if any.
    pub preferred_adapter: Option<AdapterKind>,
    pub model: Option<String>,
    pub adapter_configs: HashMap<AdapterKind, AdapterConfig>,
    pub adapter_commands: HashMap<AdapterKind, String>,
    pub checkpoint_interval: u32,
    pub scan_command: Option<String>,
    pub retry_delay: Duration,
    pub project_root: PathBuf,
    pub journal_path: PathBuf,
    pub run_id: String,
    pub verbose: bool,
}

/// CLI-level overrides fed into [`Config::from_run_args`].
#[derive(Debug, Clone, Default)]
pub struct RunArgs {
    pub prompt: Option<String>,
    pub prompt_file: Option<String>,
    pub once: bool,
    pub limit: Option<u32>,
    pub max_cost: Option<f64>,
    pub max_runtime_secs: Option<u64>,
    pub adapter: Option<String>,
    pub model: Option<String>,
    pub checkpoint_interval: Option<u32>,
    pub verbose: bool,
}

impl Config {
    /// Merge CLI args over the discovered project config.
    pub fn from_run_args(args: RunArgs, project: ProjectConfig) -> Result<Self> {
        if args.once && args.limit.is_some() {
            return Err(EngineError::Configuration(
                "--once and --limit are mutually exclusive".to_string(),
            ));
        }

        let prompt = resolve_prompt(&args, &project)?;

        let mut safety = project.config.safety.clone();
        if args.once {
            safety.max_iterations = 1;
        } else if let Some(limit) = args.limit {
            safety.max_iterations = limit;
        }
        if let Some(max_cost) = args.max_cost {
            safety.max_cost = max_cost;
        }
        if let Some(max_runtime) = args.max_runtime_secs {
            safety.max_runtime_secs = max_runtime;
        }
        safety.validate()?;

        let preferred_adapter = match args
            .adapter
            .as_deref()
            .or(project.config.run.adapter.as_deref())
        {
            Some(name) => Some(AdapterKind::parse(name).ok_or_else(|| {
                EngineError::Configuration(format!("unknown adapter '{}'", name))
            })?),
            None => None,
        };

        let (adapter_configs, adapter_commands) = adapter_setup(&project)?;

        let run = &project.config.run;
        let retry_delay = Duration::from_secs(run.retry_delay_secs);

        let journal_path = project.root.join(".agentloop").join("journal.db");

        Ok(Config {
            prompt,
            safety,
            preferred_adapter,
            model: args.model.or_else(|| run.model.clone()),
            adapter_configs,
            adapter_commands,
            checkpoint_interval: args
                .checkpoint_interval
                .unwrap_or(run.checkpoint_interval),
            scan_command: run.scan_command.clone(),
            retry_delay,
            project_root: project.root,
            journal_path,
            run_id: generate_run_id(),
            verbose: args.verbose,
        })
    }
}

/// Resolve per-backend settings and commands from a project config.
pub fn adapter_setup(
    project: &ProjectConfig,
) -> Result<(
    HashMap<AdapterKind, AdapterConfig>,
    HashMap<AdapterKind, String>,
)> {
    let mut adapter_configs = HashMap::new();
    let mut adapter_commands = HashMap::new();
    for kind in AdapterKind::ALL {
        let section = project.config.adapters.get(&kind.to_string());
        let adapter_config = match section {
            Some(section) => section.to_adapter_config()?,
            None => AdapterConfig::default(),
        };
        let command = section
            .and_then(|s| s.command.clone())
            .unwrap_or_else(|| default_command(kind).to_string());
        adapter_configs.insert(kind, adapter_config);
        adapter_commands.insert(kind, command);
    }
    Ok((adapter_configs, adapter_commands))
}

/// Default invocation for each backend when the config names none.
pub fn default_command(kind: AdapterKind) -> &'static str {
    match kind {
        AdapterKind::Acp => "claude-code-acp",
        AdapterKind::Claude => "claude -p",
        AdapterKind::Codex => "codex exec",
        AdapterKind::Gemini => "gemini -p",
    }
}

fn resolve_prompt(args: &RunArgs, project: &ProjectConfig) -> Result<String> {
    if let Some(ref prompt) = args.prompt {
        if prompt.trim().is_empty() {
            return Err(EngineError::Configuration("prompt is empty".to_string()));
        }
        return Ok(prompt.clone());
    }

    let path = args
        .prompt_file
        .clone()
        .or_else(|| project.config.run.prompt_file.clone())
        .ok_or_else(|| {
            EngineError::Configuration(
                "no prompt given: pass one directly, use --prompt-file, or set \
                 run.prompt_file in .agentloop.toml"
                    .to_string(),
            )
        })?;
    let path = if Path::new(&path).is_absolute() {
        PathBuf::from(path)
    } else {
        project.root.join(path)
    };

    let prompt = fs::read_to_string(&path).map_err(|e| {
        EngineError::Configuration(format!("failed to read prompt file {}: {}", path.display(), e))
    })?;
    if prompt.trim().is_empty() {
        return Err(EngineError::Configuration(format!(
            "prompt file {} is empty",
            path.display()
        )));
    }
    Ok(prompt)
}
