//! The iteration control loop.
//!
//! One orchestrator drives one run: it consults the safety governor at the
//! top of every iteration, executes the current prompt through the adapter
//! selection, feeds results back into the prompt context, journals each
//! iteration, and checkpoints on the configured cadence. All mutation
//! happens on the single loop task.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use crate::adapter::registry::{select_adapters, AdapterSelection};
use crate::adapter::{Adapter, AdapterKind, ExecuteOptions};
use crate::adapter::command::{CommandAdapter, PromptDelivery};
use crate::acp::AcpAdapter;
use crate::config::Config;
use crate::context::PromptContext;
use crate::errors::{EngineError, Result};
use crate::hooks::{CommandScan, GitCheckpoint};
use crate::interrupt;
use crate::journal;
use crate::output::{formatter, logger};
use crate::safety::{SafetyCheckParams, SafetyGovernor};
use crate::tasks::{Task, TaskList, TaskStatus};

/// Lifecycle of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Idle,
    Running,
    /// The completion marker appeared in agent output.
    Completed,
    /// A safety limit, the failure breaker, loop detection, or a user
    /// stop request ended the run.
    Stopped,
    /// Setup failed before the loop could start.
    Errored,
}

/// Why an iteration ran (or why the loop moved on).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerReason {
    Initial,
    /// Previous iteration succeeded but advisory tasks remain open.
    TaskIncomplete,
    PreviousSuccess,
    /// Previous iteration failed; this one carries corrective feedback.
    Recovery,
    LoopDetected,
    SafetyLimit,
    UserStop,
}

impl TriggerReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerReason::Initial => "initial",
            TriggerReason::TaskIncomplete => "task_incomplete",
            TriggerReason::PreviousSuccess => "previous_success",
            TriggerReason::Recovery => "recovery",
            TriggerReason::LoopDetected => "loop_detected",
            TriggerReason::SafetyLimit => "safety_limit",
            TriggerReason::UserStop => "user_stop",
        }
    }
}

/// Everything recorded about one iteration.
#[derive(Debug, Clone)]
pub struct IterationRecord {
    pub iteration: u32,
    pub trigger: TriggerReason,
    pub backend: String,
    pub success: bool,
    pub output_preview: String,
    pub error: Option<String>,
    pub duration_secs: f64,
    pub tokens_used: u64,
    pub cost: f64,
}

/// Snapshot of a run's progress.
#[derive(Debug, Clone)]
pub struct RunState {
    pub run_id: String,
    pub status: RunStatus,
    pub iterations_completed: u32,
    pub elapsed_secs: f64,
    pub total_cost: f64,
    pub stop_reason: Option<String>,
    pub history: Vec<IterationRecord>,
    /// Advisory tasks extracted from the prompt, with current statuses.
    pub tasks: Vec<Task>,
}

impl RunState {
    fn new(run_id: String) -> Self {
        RunState {
            run_id,
            status: RunStatus::Idle,
            iterations_completed: 0,
            elapsed_secs: 0.0,
            total_cost: 0.0,
            stop_reason: None,
            history: Vec::new(),
            tasks: Vec::new(),
        }
    }
}

/// Handle for requesting a graceful stop from outside the loop.
#[derive(Clone)]
pub struct StopHandle {
    flag: Arc<AtomicBool>,
}

impl StopHandle {
    /// Request a stop at the next iteration boundary. The in-flight
    /// iteration is allowed to finish.
    pub fn stop(&self) {
        self.flag.store(true, Ordering::SeqCst);
    }
}

/// Handle for observing a run's progress from outside the loop.
///
/// The loop publishes a fresh [`RunState`] at every iteration boundary,
/// so a snapshot is at most one iteration behind.
#[derive(Clone)]
pub struct StateHandle {
    shared: Arc<Mutex<RunState>>,
}

impl StateHandle {
    pub fn snapshot(&self) -> RunState {
        self.shared.lock().unwrap().clone()
    }
}

/// Drives the loop for one run.
pub struct Orchestrator {
    config: Config,
    state: RunState,
    shared: Arc<Mutex<RunState>>,
    stop: Arc<AtomicBool>,
    /// Injected selection for tests; built from config otherwise.
    selection: Option<AdapterSelection>,
}

impl Orchestrator {
    pub fn new(config: Config) -> Self {
        let run_id = config.run_id.clone();
        let state = RunState::new(run_id);
        Orchestrator {
            config,
            shared: Arc::new(Mutex::new(state.clone())),
            state,
            stop: Arc::new(AtomicBool::new(false)),
            selection: None,
        }
    }

    /// Build with a pre-selected adapter chain instead of probing.
    pub fn with_selection(config: Config, selection: AdapterSelection) -> Self {
        let mut orchestrator = Orchestrator::new(config);
        orchestrator.selection = Some(selection);
        orchestrator
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    pub fn state_handle(&self) -> StateHandle {
        StateHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            flag: Arc::clone(&self.stop),
        }
    }

    fn publish_state(&self) {
        *self.shared.lock().unwrap() = self.state.clone();
    }

    fn stop_requested(&self) -> bool {
        self.stop.load(Ordering::SeqCst) || interrupt::stop_requested()
    }

    /// Run the loop to its end. Errors only on setup failures (bad config,
    /// no backend available); everything after that is reported through
    /// [`RunState`].
    pub async fn run(&mut self) -> Result<RunState> {
        if self.state.status == RunStatus::Running {
            return Err(EngineError::Execution("run already in progress".to_string()));
        }
        self.state = RunState::new(self.config.run_id.clone());
        self.state.status = RunStatus::Running;
        self.publish_state();

        let mut governor = match SafetyGovernor::new(self.config.safety.clone()) {
            Ok(g) => g,
            Err(e) => {
                self.state.status = RunStatus::Errored;
                return Err(e);
            }
        };

        let selection = match self.selection.take() {
            Some(selection) => selection,
            None => {
                match select_adapters(
                    build_adapters(&self.config.adapter_configs, &self.config.adapter_commands),
                    self.config.preferred_adapter,
                )
                .await
                {
                    Ok(selection) => selection,
                    Err(e) => {
                        self.state.status = RunStatus::Errored;
                        return Err(e);
                    }
                }
            }
        };

        let db = match journal::init_db(&self.config.journal_path.to_string_lossy()) {
            Ok(db) => Some(db),
            Err(e) => {
                eprintln!("agentloop: journal disabled: {:#}", e);
                None
            }
        };
        let checkpoint = (self.config.checkpoint_interval > 0)
            .then(|| GitCheckpoint::new(&self.config.project_root));
        let scan = self
            .config
            .scan_command
            .as_ref()
            .map(|cmd| CommandScan::new(cmd, &self.config.project_root));

        let log_path = logger::setup_log_file(&self.state.run_id);
        if self.config.verbose {
            println!("Log will be written to {}", log_path);
        }

        let started = Instant::now();
        let mut context = PromptContext::new(&self.config.prompt);
        let mut tasks = TaskList::from_prompt(&self.config.prompt);
        self.state.tasks = tasks.tasks().to_vec();
        let mut trigger = TriggerReason::Initial;
        let mut iteration = 0u32;

        let (status, stop_reason) = loop {
            if self.stop_requested() {
                break (RunStatus::Stopped, "stop requested".to_string());
            }

            let check = governor.check(SafetyCheckParams {
                iterations: iteration,
                elapsed_secs: started.elapsed().as_secs(),
                total_cost: self.state.total_cost,
            });
            if !check.passed {
                break (
                    RunStatus::Stopped,
                    check.reason.unwrap_or_else(|| "safety limit".to_string()),
                );
            }
            if governor.failure_breaker_tripped() {
                break (
                    RunStatus::Stopped,
                    format!(
                        "{} consecutive failures",
                        governor.consecutive_failures()
                    ),
                );
            }
            // The marker may sit in the base prompt or in output appended
            // last iteration; either way the work is declared done before
            // anything else runs.
            if context.is_complete() {
                break (RunStatus::Completed, "completion marker emitted".to_string());
            }

            iteration += 1;
            formatter::print_iteration_header(iteration, self.config.safety.max_iterations);

            // Advisory only: mark the next open task as the one being
            // worked on. Nothing is scheduled from it.
            let current_task = tasks.next_pending().map(|t| t.id);
            if let Some(id) = current_task {
                tasks.set_status(id, TaskStatus::InProgress);
            }

            let options = ExecuteOptions {
                timeout: None,
                verbose: self.config.verbose,
                model: self.config.model.clone(),
            };
            let prompt = context.current_prompt();

            let iter_started = Instant::now();
            let response = selection.execute_with_fallback(&prompt, &options).await;
            let duration_secs = iter_started.elapsed().as_secs_f64();

            self.state.total_cost += response.cost;
            let record = IterationRecord {
                iteration,
                trigger,
                backend: response
                    .metadata
                    .get("backend")
                    .cloned()
                    .unwrap_or_else(|| selection.primary_kind().to_string()),
                success: response.success,
                output_preview: journal::output_preview(&response.output),
                error: (!response.success).then(|| response.error.clone()),
                duration_secs,
                tokens_used: response.tokens_used,
                cost: response.cost,
            };
            formatter::print_iteration_result(&record);
            logger::append_line(
                &log_path,
                &format!(
                    "iteration {} via {}: {}",
                    iteration,
                    record.backend,
                    if record.success { "ok" } else { "failed" }
                ),
            );
            self.journal_record(db.as_ref(), &record);
            self.state.history.push(record);
            self.state.iterations_completed = iteration;

            if response.success {
                governor.record_success();
                context.append_output(iteration, &response.output);
                if let Some(id) = current_task {
                    tasks.set_status(id, TaskStatus::Completed);
                }
                self.state.tasks = tasks.tasks().to_vec();

                if governor.detect_loop(&response.output) {
                    break (
                        RunStatus::Stopped,
                        "repeated output detected, agent appears stuck".to_string(),
                    );
                }

                trigger = if tasks.next_pending().is_some() {
                    TriggerReason::TaskIncomplete
                } else {
                    TriggerReason::PreviousSuccess
                };
            } else {
                governor.record_failure();
                if let Some(id) = current_task {
                    tasks.set_status(id, TaskStatus::Pending);
                }
                self.state.tasks = tasks.tasks().to_vec();
                context.append_error_feedback(iteration, &response.error);
                trigger = TriggerReason::Recovery;
            }
            self.publish_state();

            if let Some(ref checkpoint) = checkpoint {
                if iteration % self.config.checkpoint_interval == 0 {
                    self.run_checkpoint(checkpoint, scan.as_ref(), iteration).await;
                }
            }
            // Applies between every pair of iterations, not just after a
            // failure. The stop checks at the top of the loop run first
            // on the next pass.
            if !self.config.retry_delay.is_zero() {
                tokio::time::sleep(self.config.retry_delay).await;
            }
        };

        // Final checkpoint so nothing from the last iterations is left
        // uncommitted.
        if let Some(ref checkpoint) = checkpoint {
            self.run_checkpoint(checkpoint, scan.as_ref(), iteration).await;
        }

        self.state.status = status;
        self.state.stop_reason = Some(stop_reason.clone());
        self.state.elapsed_secs = started.elapsed().as_secs_f64();
        self.publish_state();
        formatter::print_stop_reason(&stop_reason);
        formatter::print_run_summary(&self.state);
        Ok(self.state.clone())
    }

    fn journal_record(&self, db: Option<&journal::Db>, record: &IterationRecord) {
        let Some(db) = db else { return };
        let entry = journal::JournalEntry {
            run_id: self.state.run_id.clone(),
            iteration: record.iteration,
            backend: Some(record.backend.clone()),
            trigger_reason: record.trigger.as_str().to_string(),
            success: record.success,
            error: record.error.clone(),
            output_preview: Some(record.output_preview.clone()),
            duration_secs: record.duration_secs,
            tokens_used: record.tokens_used,
            cost: record.cost,
            created_at: chrono::Utc::now().to_rfc3339(),
        };
        if let Err(e) = journal::insert_entry(db, &entry) {
            eprintln!("agentloop: failed to write journal entry: {:#}", e);
        }
    }

    async fn run_checkpoint(
        &self,
        checkpoint: &GitCheckpoint,
        scan: Option<&CommandScan>,
        iteration: u32,
    ) {
        match checkpoint.checkpoint(iteration).await {
            Ok(outcome) if outcome.committed => {
                println!("Checkpoint: {}", outcome.detail);
                if let Some(scan) = scan {
                    match scan.run().await {
                        Ok(report) if report.passed => {}
                        Ok(report) => {
                            eprintln!("agentloop: scan failed:\n{}", report.output);
                        }
                        Err(e) => eprintln!("agentloop: scan error: {}", e),
                    }
                }
            }
            Ok(_) => {}
            Err(e) => eprintln!("agentloop: checkpoint failed: {}", e),
        }
    }
}

/// One candidate adapter per backend kind, in priority order.
pub fn build_adapters(
    configs: &std::collections::HashMap<AdapterKind, crate::adapter::AdapterConfig>,
    commands: &std::collections::HashMap<AdapterKind, String>,
) -> Vec<Arc<dyn Adapter>> {
    let mut adapters: Vec<Arc<dyn Adapter>> = Vec::new();
    for kind in AdapterKind::ALL {
        let adapter_config = configs.get(&kind).cloned().unwrap_or_default();
        let command = commands
            .get(&kind)
            .cloned()
            .unwrap_or_else(|| crate::config::default_command(kind).to_string());
        match kind {
            AdapterKind::Acp => {
                adapters.push(Arc::new(AcpAdapter::new(command, adapter_config)));
            }
            _ => {
                adapters.push(Arc::new(CommandAdapter::new(
                    kind,
                    command,
                    PromptDelivery::TrailingArg,
                    adapter_config,
                )));
            }
        }
    }
    adapters
}
