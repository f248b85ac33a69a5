//! Safety governor: resource ceilings, failure circuit breaker, and loop detection.
//!
//! The governor is consulted at the top of every iteration. Limit checks are
//! stateless per call; the consecutive-failure counter and the recent-output
//! ring buffer are the only state it carries. All of it is mutated from the
//! single controller task, so no locking is needed here.

use crate::errors::{EngineError, Result};

/// Default loop-detection similarity threshold (0–1, 1 = identical).
const DEFAULT_LOOP_THRESHOLD: f64 = 0.90;

/// Default number of recent outputs kept for loop detection.
const DEFAULT_LOOP_WINDOW: usize = 5;

/// Ceilings and thresholds for a run. A ceiling of 0 means unlimited.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(default)]
pub struct SafetyConfig {
    /// Maximum iterations before the run is stopped (0 = unlimited).
    pub max_iterations: u32,
    /// Maximum wall-clock runtime in seconds (0 = unlimited).
    pub max_runtime_secs: u64,
    /// Maximum cumulative cost in dollars (0.0 = unlimited).
    pub max_cost: f64,
    /// Consecutive adapter failures tolerated before the breaker trips.
    pub max_consecutive_failures: u32,
    /// Similarity score at or above which two outputs count as a loop.
    pub loop_threshold: f64,
    /// How many recent non-empty outputs to compare against.
    pub loop_window: usize,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        SafetyConfig {
            max_iterations: 50,
            max_runtime_secs: 0,
            max_cost: 0.0,
            max_consecutive_failures: 3,
            loop_threshold: DEFAULT_LOOP_THRESHOLD,
            loop_window: DEFAULT_LOOP_WINDOW,
        }
    }
}

impl SafetyConfig {
    /// Validate thresholds. Ceilings of zero are "unlimited" and always valid.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.loop_threshold) {
            return Err(EngineError::Configuration(format!(
                "loop_threshold must be within [0, 1], got {}",
                self.loop_threshold
            )));
        }
        if self.max_cost < 0.0 {
            return Err(EngineError::Configuration(format!(
                "max_cost must not be negative, got {}",
                self.max_cost
            )));
        }
        if self.loop_window == 0 {
            return Err(EngineError::Configuration(
                "loop_window must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Partial update for [`SafetyConfig`]; unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct SafetyConfigUpdate {
    pub max_iterations: Option<u32>,
    pub max_runtime_secs: Option<u64>,
    pub max_cost: Option<f64>,
    pub max_consecutive_failures: Option<u32>,
    pub loop_threshold: Option<f64>,
}

/// Snapshot of the run's consumption, passed to [`SafetyGovernor::check`].
#[derive(Debug, Clone, Copy)]
pub struct SafetyCheckParams {
    pub iterations: u32,
    pub elapsed_secs: u64,
    pub total_cost: f64,
}

/// Outcome of a limit check.
#[derive(Debug, Clone, PartialEq)]
pub struct SafetyCheckResult {
    pub passed: bool,
    /// Human-readable reason for the first violated dimension.
    pub reason: Option<String>,
}

impl SafetyCheckResult {
    fn pass() -> Self {
        SafetyCheckResult {
            passed: true,
            reason: None,
        }
    }

    fn fail(reason: String) -> Self {
        SafetyCheckResult {
            passed: false,
            reason: Some(reason),
        }
    }
}

/// Enforces resource ceilings and detects stagnating output.
pub struct SafetyGovernor {
    config: SafetyConfig,
    consecutive_failures: u32,
    /// Ring of the most recent non-empty outputs, oldest first.
    recent_outputs: Vec<String>,
}

impl SafetyGovernor {
    pub fn new(config: SafetyConfig) -> Result<Self> {
        config.validate()?;
        Ok(SafetyGovernor {
            config,
            consecutive_failures: 0,
            recent_outputs: Vec::new(),
        })
    }

    /// Compare consumption against the configured ceilings.
    ///
    /// Dimensions are checked in a fixed order (iterations, runtime, cost) so
    /// the first violated one is reported. A ceiling at or below the current
    /// value fails the check before the next iteration begins.
    pub fn check(&self, params: SafetyCheckParams) -> SafetyCheckResult {
        if self.config.max_iterations > 0 && params.iterations >= self.config.max_iterations {
            return SafetyCheckResult::fail(format!(
                "iteration limit reached ({}/{})",
                params.iterations, self.config.max_iterations
            ));
        }
        if self.config.max_runtime_secs > 0 && params.elapsed_secs >= self.config.max_runtime_secs {
            return SafetyCheckResult::fail(format!(
                "runtime limit reached ({}s/{}s)",
                params.elapsed_secs, self.config.max_runtime_secs
            ));
        }
        if self.config.max_cost > 0.0 && params.total_cost >= self.config.max_cost {
            return SafetyCheckResult::fail(format!(
                "cost limit reached (${:.2}/${:.2})",
                params.total_cost, self.config.max_cost
            ));
        }
        SafetyCheckResult::pass()
    }

    /// Record a successful iteration; resets the failure streak.
    pub fn record_success(&mut self) {
        self.consecutive_failures = 0;
    }

    /// Record a failed iteration.
    pub fn record_failure(&mut self) {
        self.consecutive_failures += 1;
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    /// Whether the consecutive-failure breaker has tripped.
    ///
    /// Independent of [`check`](Self::check); the caller treats a tripped
    /// breaker as a stop condition.
    pub fn failure_breaker_tripped(&self) -> bool {
        self.config.max_consecutive_failures > 0
            && self.consecutive_failures >= self.config.max_consecutive_failures
    }

    /// Compare `output` against recent outputs; true when any similarity
    /// score reaches the threshold.
    ///
    /// Empty output is never compared and never stored. A new non-empty
    /// output is always appended afterwards, evicting the oldest entry once
    /// the window is full — even when a loop was just detected.
    pub fn detect_loop(&mut self, output: &str) -> bool {
        if output.is_empty() {
            return false;
        }

        let detected = self
            .recent_outputs
            .iter()
            .any(|prev| similarity_ratio(prev, output) >= self.config.loop_threshold);

        while self.recent_outputs.len() >= self.config.loop_window {
            self.recent_outputs.remove(0);
        }
        self.recent_outputs.push(output.to_string());

        detected
    }

    /// Clear all counters and the loop-detection history.
    pub fn reset(&mut self) {
        self.consecutive_failures = 0;
        self.recent_outputs.clear();
    }

    /// Clear only the loop-detection history.
    pub fn clear_loop_history(&mut self) {
        self.recent_outputs.clear();
    }

    /// Apply a partial configuration update.
    pub fn update_config(&mut self, update: SafetyConfigUpdate) -> Result<()> {
        let mut next = self.config.clone();
        if let Some(v) = update.max_iterations {
            next.max_iterations = v;
        }
        if let Some(v) = update.max_runtime_secs {
            next.max_runtime_secs = v;
        }
        if let Some(v) = update.max_cost {
            next.max_cost = v;
        }
        if let Some(v) = update.max_consecutive_failures {
            next.max_consecutive_failures = v;
        }
        if let Some(v) = update.loop_threshold {
            next.loop_threshold = v;
        }
        next.validate()?;
        self.config = next;
        Ok(())
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }
}

/// Normalized Levenshtein similarity in [0, 1]; identical strings score 1.0.
///
/// Distance is computed over Unicode scalar values with the classic
/// two-row dynamic program, then normalized by the longer string's length.
pub fn similarity_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }

    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }

    let dist = levenshtein(&a_chars, &b_chars);
    1.0 - (dist as f64 / max_len as f64)
}

fn levenshtein(a: &[char], b: &[char]) -> usize {
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0usize; b.len() + 1];

    for (i, &ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}
