//! Prompt context: the base task prompt plus stacked per-iteration feedback.
//!
//! Each iteration's outcome is appended as a delimited block so the next
//! iteration "sees" the previous result. Corrective feedback after a failure
//! is the only repair mechanism the loop has.

/// Fixed literal that unconditionally stops the run when it appears in the
/// evolving context text.
pub const COMPLETION_MARKER: &str = "<promise>COMPLETE</promise>";

/// Holds the prompt text handed to the adapter each iteration.
#[derive(Debug, Clone)]
pub struct PromptContext {
    base_prompt: String,
    feedback: Vec<String>,
}

impl PromptContext {
    pub fn new(base_prompt: impl Into<String>) -> Self {
        PromptContext {
            base_prompt: base_prompt.into(),
            feedback: Vec::new(),
        }
    }

    /// The full prompt for the next iteration: base prompt, then all
    /// feedback blocks in the order they were recorded.
    pub fn current_prompt(&self) -> String {
        if self.feedback.is_empty() {
            return self.base_prompt.clone();
        }
        let mut out = self.base_prompt.clone();
        for block in &self.feedback {
            out.push_str("\n\n---\n");
            out.push_str(block);
        }
        out
    }

    pub fn base_prompt(&self) -> &str {
        &self.base_prompt
    }

    /// Record a successful iteration's output.
    pub fn append_output(&mut self, iteration: u32, output: &str) {
        self.feedback.push(format!(
            "**Previous result (iteration {}):**\n{}",
            iteration,
            output.trim_end()
        ));
    }

    /// Record a failed iteration's error text as corrective feedback.
    pub fn append_error_feedback(&mut self, iteration: u32, error: &str) {
        self.feedback.push(format!(
            "**Previous attempt failed (iteration {}):**\n{}\nFix the problem above before continuing.",
            iteration,
            error.trim_end()
        ));
    }

    /// Whether the completion marker appears anywhere in the context.
    pub fn is_complete(&self) -> bool {
        self.base_prompt.contains(COMPLETION_MARKER)
            || self.feedback.iter().any(|f| f.contains(COMPLETION_MARKER))
    }

    pub fn feedback_count(&self) -> usize {
        self.feedback.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn current_prompt_without_feedback_is_base() {
        let ctx = PromptContext::new("Build the widget.");
        assert_eq!(ctx.current_prompt(), "Build the widget.");
    }

    #[test]
    fn feedback_blocks_stack_in_order() {
        let mut ctx = PromptContext::new("Build the widget.");
        ctx.append_output(1, "Created widget skeleton.");
        ctx.append_error_feedback(2, "tests failed: missing field `id`");

        let prompt = ctx.current_prompt();
        assert!(prompt.starts_with("Build the widget."));
        let first = prompt.find("Previous result (iteration 1)").unwrap();
        let second = prompt.find("Previous attempt failed (iteration 2)").unwrap();
        assert!(first < second);
        assert!(prompt.contains("missing field `id`"));
        assert!(prompt.contains("Fix the problem above"));
    }

    #[test]
    fn completion_marker_detected_in_output() {
        let mut ctx = PromptContext::new("Do the thing.");
        assert!(!ctx.is_complete());
        ctx.append_output(1, "All done. <promise>COMPLETE</promise>");
        assert!(ctx.is_complete());
    }

    #[test]
    fn completion_marker_detected_in_base_prompt() {
        let ctx = PromptContext::new("- [x] <promise>COMPLETE</promise>");
        assert!(ctx.is_complete());
    }

    #[test]
    fn error_feedback_counts() {
        let mut ctx = PromptContext::new("p");
        ctx.append_error_feedback(1, "boom");
        ctx.append_error_feedback(2, "boom again");
        assert_eq!(ctx.feedback_count(), 2);
    }
}
