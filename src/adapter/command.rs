//! Generic CLI-wrapping adapter.
//!
//! Spawns a named executable per prompt, delivers the prompt on stdin or as
//! a trailing argument, captures stdout as the response text and stderr as
//! diagnostics. A nonzero exit code is a failure; the wall-clock timeout
//! force-terminates the process.

use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::adapter::{Adapter, AdapterConfig, AdapterKind, AdapterResponse, ExecuteOptions};
use crate::errors::{EngineError, Result};

/// How the prompt reaches the spawned process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptDelivery {
    /// Written to the child's stdin, then stdin is closed.
    Stdin,
    /// Appended as the final command-line argument.
    TrailingArg,
}

/// Adapter that wraps an arbitrary agent CLI.
pub struct CommandAdapter {
    kind: AdapterKind,
    /// Shell-style command string, e.g. `claude --print`.
    command: String,
    delivery: PromptDelivery,
    config: AdapterConfig,
    /// Dollars per 1k prompt characters, for `estimate_cost`.
    cost_per_kchar: f64,
}

impl CommandAdapter {
    pub fn new(
        kind: AdapterKind,
        command: impl Into<String>,
        delivery: PromptDelivery,
        config: AdapterConfig,
    ) -> Self {
        CommandAdapter {
            kind,
            command: command.into(),
            delivery,
            config,
            cost_per_kchar: 0.003,
        }
    }

    pub fn with_cost_per_kchar(mut self, rate: f64) -> Self {
        self.cost_per_kchar = rate;
        self
    }

    fn build_command(&self, prompt: &str, options: &ExecuteOptions) -> Result<Command> {
        let (program, mut args) = parse_command(&self.command)?;
        args.extend(self.config.extra_args.iter().cloned());
        if let Some(ref model) = options.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        if self.delivery == PromptDelivery::TrailingArg {
            args.push(prompt.to_string());
        }

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &self.config.env {
            cmd.env(key, value);
        }
        Ok(cmd)
    }
}

#[async_trait]
impl Adapter for CommandAdapter {
    fn kind(&self) -> AdapterKind {
        self.kind
    }

    async fn check_availability(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        let Ok((program, _)) = parse_command(&self.command) else {
            return false;
        };
        which(&program).await
    }

    async fn execute(&self, prompt: &str, options: &ExecuteOptions) -> Result<AdapterResponse> {
        let start = Instant::now();
        let timeout = options.timeout.unwrap_or(self.config.timeout);

        let mut cmd = self.build_command(prompt, options)?;
        let mut child = cmd.spawn().map_err(|e| {
            EngineError::Availability(format!("failed to spawn '{}': {e}", self.command))
        })?;

        if self.delivery == PromptDelivery::Stdin {
            let mut stdin = child
                .stdin
                .take()
                .ok_or_else(|| EngineError::Execution("stdin not piped".to_string()))?;
            let bytes = prompt.as_bytes().to_vec();
            // Fed from its own task: a prompt larger than the pipe buffer
            // would otherwise block here before the timeout below is armed.
            // A write error means the child exited early; its exit status
            // carries the failure. Dropping stdin signals end-of-input.
            tokio::spawn(async move {
                let _ = stdin.write_all(&bytes).await;
            });
        } else {
            drop(child.stdin.take());
        }

        let wait = child.wait_with_output();
        let output = match tokio::time::timeout(timeout, wait).await {
            Ok(result) => result
                .map_err(|e| EngineError::Execution(format!("failed to wait for child: {e}")))?,
            Err(_) => {
                // kill_on_drop reaps the child once the future is dropped.
                return Err(EngineError::Timeout(format!(
                    "{} exceeded {}s",
                    self.command,
                    timeout.as_secs()
                )));
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        let stderr = String::from_utf8_lossy(&output.stderr).to_string();
        if options.verbose && !stderr.is_empty() {
            eprintln!("{stderr}");
        }

        let mut resp = if output.status.success() {
            AdapterResponse::ok(stdout)
        } else {
            let mut error = format!("{} exited with status {}", self.command, output.status);
            if !stderr.is_empty() {
                error.push_str("\nstderr: ");
                error.push_str(stderr.trim_end());
            }
            AdapterResponse::failed(error)
        };
        resp.cost = self.estimate_cost(prompt);
        resp.metadata
            .insert("backend".to_string(), self.kind.to_string());
        resp.metadata.insert(
            "duration_ms".to_string(),
            start.elapsed().as_millis().to_string(),
        );
        if let Some(code) = output.status.code() {
            resp.metadata.insert("exit_code".to_string(), code.to_string());
        }
        Ok(resp)
    }

    fn estimate_cost(&self, prompt: &str) -> f64 {
        (prompt.chars().count() as f64 / 1000.0) * self.cost_per_kchar
    }
}

/// Parse a shell-style command string into (program, args).
///
/// Uses `shlex::split()` for POSIX-style tokenisation, supporting quoted
/// arguments and escaped spaces.
pub fn parse_command(command: &str) -> Result<(String, Vec<String>)> {
    let parts = shlex::split(command).ok_or_else(|| {
        EngineError::Configuration(format!("invalid command: failed to parse \"{command}\""))
    })?;
    if parts.is_empty() {
        return Err(EngineError::Configuration("command is empty".to_string()));
    }
    let mut iter = parts.into_iter();
    let program = iter.next().unwrap();
    Ok((program, iter.collect()))
}

/// Check whether `program` resolves on PATH (or exists as given).
pub(crate) async fn which(program: &str) -> bool {
    if program.contains('/') {
        return tokio::fs::try_exists(program).await.unwrap_or(false);
    }
    Command::new("which")
        .arg(program)
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await
        .map(|s| s.success())
        .unwrap_or(false)
}
