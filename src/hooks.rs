//! Checkpoint and scan hooks run between iterations.
//!
//! A checkpoint snapshots workspace state (git commit) so a bad iteration
//! can be rolled back by hand; a scan runs an arbitrary command (linter,
//! test suite, security scanner) and reports its verdict. Hook failures
//! are reported to the caller, which logs them and keeps looping.

use std::path::PathBuf;
use std::process::Stdio;

use tokio::process::Command;

use crate::errors::{EngineError, Result};

/// What a checkpoint attempt did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointOutcome {
    pub committed: bool,
    pub detail: String,
}

/// Git-based workspace checkpointing.
pub struct GitCheckpoint {
    repo_dir: PathBuf,
}

impl GitCheckpoint {
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        GitCheckpoint {
            repo_dir: repo_dir.into(),
        }
    }

    async fn run_git(&self, args: &[&str]) -> Result<std::process::Output> {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.repo_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| EngineError::Execution(format!("failed to run git: {}", e)))?;
        Ok(output)
    }

    /// Whether the working tree has uncommitted changes.
    pub async fn has_changes(&self) -> Result<bool> {
        let output = self.run_git(&["status", "--porcelain"]).await?;
        if !output.status.success() {
            return Err(EngineError::Execution(format!(
                "git status failed: {}",
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(!output.stdout.is_empty())
    }

    /// Commit everything in the working tree as an iteration checkpoint.
    ///
    /// A clean tree is not an error; the outcome says nothing was committed.
    pub async fn checkpoint(&self, iteration: u32) -> Result<CheckpointOutcome> {
        if !self.has_changes().await? {
            return Ok(CheckpointOutcome {
                committed: false,
                detail: "working tree clean".to_string(),
            });
        }

        let add = self.run_git(&["add", "-A"]).await?;
        if !add.status.success() {
            return Err(EngineError::Execution(format!(
                "git add failed: {}",
                String::from_utf8_lossy(&add.stderr).trim()
            )));
        }

        let message = format!("checkpoint: iteration {}", iteration);
        let commit = self.run_git(&["commit", "-m", &message]).await?;
        if !commit.status.success() {
            return Err(EngineError::Execution(format!(
                "git commit failed: {}",
                String::from_utf8_lossy(&commit.stderr).trim()
            )));
        }

        Ok(CheckpointOutcome {
            committed: true,
            detail: message,
        })
    }
}

/// Result of a scan command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanReport {
    pub passed: bool,
    pub output: String,
}

/// Runs a configured command and treats exit status as the verdict.
pub struct CommandScan {
    command: String,
    work_dir: PathBuf,
}

impl CommandScan {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        CommandScan {
            command: command.into(),
            work_dir: work_dir.into(),
        }
    }

    pub async fn run(&self) -> Result<ScanReport> {
        let (program, args) = crate::adapter::command::parse_command(&self.command)?;
        let output = Command::new(&program)
            .args(&args)
            .current_dir(&self.work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| {
                EngineError::Execution(format!("failed to run scan '{}': {}", program, e))
            })?;

        let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr);
        if !stderr.trim().is_empty() {
            if !text.is_empty() {
                text.push('\n');
            }
            text.push_str(stderr.trim());
        }

        Ok(ScanReport {
            passed: output.status.success(),
            output: text,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    async fn git_available() -> bool {
        Command::new("git")
            .arg("--version")
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    async fn init_repo(dir: &Path) {
        for args in [
            vec!["init", "-q"],
            vec!["config", "user.email", "loop@example.com"],
            vec!["config", "user.name", "loop"],
        ] {
            let status = Command::new("git")
                .args(&args)
                .current_dir(dir)
                .status()
                .await
                .unwrap();
            assert!(status.success());
        }
    }

    #[tokio::test]
    async fn checkpoint_commits_dirty_tree() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;
        std::fs::write(dir.path().join("file.txt"), "contents").unwrap();

        let checkpoint = GitCheckpoint::new(dir.path());
        assert!(checkpoint.has_changes().await.unwrap());

        let outcome = checkpoint.checkpoint(3).await.unwrap();
        assert!(outcome.committed);
        assert_eq!(outcome.detail, "checkpoint: iteration 3");
        assert!(!checkpoint.has_changes().await.unwrap());
    }

    #[tokio::test]
    async fn checkpoint_on_clean_tree_is_noop() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        init_repo(dir.path()).await;

        let checkpoint = GitCheckpoint::new(dir.path());
        let outcome = checkpoint.checkpoint(1).await.unwrap();
        assert!(!outcome.committed);
        assert_eq!(outcome.detail, "working tree clean");
    }

    #[tokio::test]
    async fn status_outside_a_repo_fails() {
        if !git_available().await {
            return;
        }
        let dir = tempfile::tempdir().unwrap();
        let checkpoint = GitCheckpoint::new(dir.path());
        let err = checkpoint.has_changes().await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn scan_reports_pass_and_fail() {
        let dir = tempfile::tempdir().unwrap();

        let ok = CommandScan::new("echo all-clear", dir.path());
        let report = ok.run().await.unwrap();
        assert!(report.passed);
        assert!(report.output.contains("all-clear"));

        let bad = CommandScan::new("false", dir.path());
        let report = bad.run().await.unwrap();
        assert!(!report.passed);
    }

    #[tokio::test]
    async fn missing_scan_binary_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let scan = CommandScan::new("definitely-not-a-real-scanner-xyz", dir.path());
        assert!(scan.run().await.is_err());
    }
}
