//! CLI argument parsing using clap.

use clap::{Parser, Subcommand};

/// Autonomous agent orchestration loop with hard safety limits.
///
/// Feeds a prompt to an agent backend over and over, carrying each result
/// forward, until the agent declares completion or a safety ceiling stops
/// the run. Use --once to test a prompt before unleashing a full loop.
#[derive(Parser, Debug)]
#[command(name = "agentloop", version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run the iteration loop on a prompt
    Run {
        /// Prompt text; omit to use --prompt-file or run.prompt_file from
        /// .agentloop.toml
        #[arg(value_name = "PROMPT")]
        prompt: Option<String>,

        /// Read the prompt from a file (relative paths resolve against the
        /// project root)
        #[arg(long, value_name = "FILE")]
        prompt_file: Option<String>,

        /// Run exactly once (conflicts with --limit)
        #[arg(short = 'o', long)]
        once: bool,

        /// Maximum iterations; 0 = unlimited
        #[arg(long, value_name = "N", env = "AGENTLOOP_LIMIT")]
        limit: Option<u32>,

        /// Maximum cumulative cost in dollars; 0 = unlimited
        #[arg(long, value_name = "DOLLARS")]
        max_cost: Option<f64>,

        /// Maximum wall-clock runtime in seconds; 0 = unlimited
        #[arg(long, value_name = "SECS")]
        max_runtime: Option<u64>,

        /// Force a backend: acp, claude, codex, gemini
        #[arg(long, value_name = "BACKEND", env = "AGENTLOOP_ADAPTER")]
        adapter: Option<String>,

        /// Model name passed through to the backend
        #[arg(long, value_name = "MODEL", env = "AGENTLOOP_MODEL")]
        model: Option<String>,

        /// Git-checkpoint every N iterations; 0 = disabled
        #[arg(long, value_name = "N")]
        checkpoint_interval: Option<u32>,

        /// Print extra progress detail
        #[arg(short, long)]
        verbose: bool,
    },
    /// Show journal entries for a run
    Status {
        /// Run ID to inspect (defaults to the most recent run)
        #[arg(value_name = "RUN_ID")]
        run_id: Option<String>,

        /// How many recent iterations to show
        #[arg(long, value_name = "N", default_value_t = 10)]
        limit: u32,
    },
    /// Probe each configured backend for availability
    Adapters,
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }
}
