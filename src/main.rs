//! agentloop - iterative agent orchestration with hard safety limits

use anyhow::Result;
use std::process::ExitCode;

use agentloop::orchestrator::{self, Orchestrator, RunStatus};
use agentloop::{cli, config, interrupt, journal};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<ExitCode> {
    let args = cli::Args::parse_args();

    match args.command {
        cli::Command::Run {
            prompt,
            prompt_file,
            once,
            limit,
            max_cost,
            max_runtime,
            adapter,
            model,
            checkpoint_interval,
            verbose,
        } => {
            interrupt::register_signal_handler()?;

            // Walk up the directory tree to find .agentloop.toml
            let project = config::discover()?;
            let run_args = config::RunArgs {
                prompt,
                prompt_file,
                once,
                limit,
                max_cost,
                max_runtime_secs: max_runtime,
                adapter,
                model,
                checkpoint_interval,
                verbose,
            };
            let config = config::Config::from_run_args(run_args, project)?;

            let mut orchestrator = Orchestrator::new(config);
            let state = orchestrator.run().await?;

            match state.status {
                RunStatus::Completed => Ok(ExitCode::SUCCESS),
                RunStatus::Stopped => Ok(ExitCode::from(2)),
                _ => Ok(ExitCode::FAILURE),
            }
        }
        cli::Command::Status { run_id, limit } => {
            let project = config::discover()?;
            let db_path = project.root.join(".agentloop").join("journal.db");
            if !db_path.exists() {
                eprintln!("No journal found at {}", db_path.display());
                return Ok(ExitCode::FAILURE);
            }
            let db = journal::init_db(db_path.to_string_lossy().as_ref())?;

            let run_id = match run_id {
                Some(id) => id,
                None => match journal::latest_run_id(&db)? {
                    Some(id) => id,
                    None => {
                        eprintln!("Journal is empty");
                        return Ok(ExitCode::FAILURE);
                    }
                },
            };

            let entries = journal::query_recent(&db, &run_id, limit)?;
            if entries.is_empty() {
                eprintln!("No iterations recorded for {run_id}");
                return Ok(ExitCode::FAILURE);
            }

            let totals = journal::run_totals(&db, &run_id)?;
            println!(
                "Run {run_id}: {} iterations, {} succeeded, ${:.4} spent, {}s total",
                totals.iterations, totals.successes, totals.total_cost, totals.total_duration_secs
            );
            println!();
            for entry in entries {
                let mark = if entry.success { "✓" } else { "✗" };
                let detail = if entry.success {
                    entry
                        .output_preview
                        .as_deref()
                        .and_then(|p| p.lines().next())
                        .unwrap_or("")
                        .to_string()
                } else {
                    entry.error.unwrap_or_default()
                };
                println!(
                    "  {mark} #{} [{}] {} ({:.1}s, ${:.4}) {}",
                    entry.iteration,
                    entry.backend.as_deref().unwrap_or("?"),
                    entry.trigger_reason,
                    entry.duration_secs,
                    entry.cost,
                    detail
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        cli::Command::Adapters => {
            let project = config::discover()?;
            let (configs, commands) = config::adapter_setup(&project)?;
            let adapters = orchestrator::build_adapters(&configs, &commands);

            let mut any_available = false;
            for adapter in adapters {
                let kind = adapter.kind();
                let command = commands
                    .get(&kind)
                    .map(String::as_str)
                    .unwrap_or("(default)");
                let available = adapter.check_availability().await;
                any_available |= available;
                let status = if available { "available" } else { "unavailable" };
                println!("  {:8} {status:12} {command}", kind.to_string());
            }

            if any_available {
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
    }
}
