//! Terminal output formatting with ANSI colors.

use colored::Colorize;

use crate::acp::session::{ToolCall, ToolCallStatus};
use crate::orchestrator::{IterationRecord, RunState};

/// Print the banner for one iteration.
pub fn print_iteration_header(iteration: u32, max_iterations: u32) {
    println!();
    if max_iterations == 0 {
        println!("{}", format!("── Iteration {} (unlimited) ──", iteration).bold());
    } else {
        println!(
            "{}",
            format!("── Iteration {} of {} ──", iteration, max_iterations).bold()
        );
    }
}

/// Print one tool call as the agent reports it.
pub fn print_tool_call(call: &ToolCall) {
    let line = format!("→ {}", call.name).cyan();
    match call.status {
        ToolCallStatus::Failed => {
            println!("{}", format!("✗ {} failed", call.name).red());
            if let Some(ref error) = call.error {
                for l in error.lines().take(5) {
                    println!("{}", l.red());
                }
            }
        }
        ToolCallStatus::Completed => println!("{} {}", line, "done".dimmed()),
        _ => println!("{}", line),
    }
}

/// Print the outcome line for one finished iteration.
pub fn print_iteration_result(record: &IterationRecord) {
    if record.success {
        println!(
            "{}",
            format!(
                "✓ Done ({:.1}s{})",
                record.duration_secs,
                if record.cost > 0.0 {
                    format!(", ${:.4}", record.cost)
                } else {
                    String::new()
                }
            )
            .green()
        );
    } else {
        let error = record.error.as_deref().unwrap_or("unknown error");
        println!("{}", format!("✗ Failed: {}", error).red());
    }
}

/// Print a warning when execution falls over to another backend.
pub fn print_fallback(from: &str, to: &str) {
    println!(
        "{}",
        format!("Backend {} failed, falling back to {}", from, to).yellow()
    );
}

/// Print why the loop stopped.
pub fn print_stop_reason(reason: &str) {
    println!();
    println!("{}", format!("Stopping: {}", reason).yellow());
}

/// Print the end-of-run summary.
pub fn print_run_summary(state: &RunState) {
    let total = state.iterations_completed;
    let successes = state
        .history
        .iter()
        .filter(|r| r.success)
        .count() as u32;
    let rate = if total == 0 {
        0.0
    } else {
        100.0 * f64::from(successes) / f64::from(total)
    };

    println!();
    println!("{}", "Run summary".bold());
    println!("  iterations: {} ({} succeeded, {:.0}%)", total, successes, rate);
    println!("  elapsed:    {:.1}s", state.elapsed_secs);
    if state.total_cost > 0.0 {
        println!("  cost:       ${:.4}", state.total_cost);
    }
    if !state.tasks.is_empty() {
        let done = state
            .tasks
            .iter()
            .filter(|t| t.status == crate::tasks::TaskStatus::Completed)
            .count();
        println!("  tasks:      {}/{} completed", done, state.tasks.len());
    }
    if let Some(ref reason) = state.stop_reason {
        println!("  stopped:    {}", reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::orchestrator::{RunStatus, TriggerReason};

    // Smoke tests: these print, so we only check they don't panic.

    #[test]
    fn headers_handle_unlimited() {
        print_iteration_header(3, 0);
        print_iteration_header(3, 50);
    }

    #[test]
    fn summary_handles_empty_run() {
        let state = RunState {
            run_id: "run-x".to_string(),
            status: RunStatus::Completed,
            iterations_completed: 0,
            elapsed_secs: 0.0,
            total_cost: 0.0,
            stop_reason: None,
            history: Vec::new(),
            tasks: Vec::new(),
        };
        print_run_summary(&state);
    }

    #[test]
    fn result_lines_render_both_outcomes() {
        let ok = IterationRecord {
            iteration: 1,
            trigger: TriggerReason::Initial,
            backend: "acp".to_string(),
            success: true,
            output_preview: "done".to_string(),
            error: None,
            duration_secs: 2.0,
            tokens_used: 0,
            cost: 0.01,
        };
        print_iteration_result(&ok);

        let failed = IterationRecord {
            success: false,
            error: Some("exit code 1".to_string()),
            cost: 0.0,
            ..ok
        };
        print_iteration_result(&failed);
    }
}
