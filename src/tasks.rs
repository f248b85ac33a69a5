//! Advisory task bookkeeping extracted from the initial prompt.
//!
//! Tasks are parsed once from the prompt text by simple pattern matching
//! (markdown checkboxes and numbered items). They are bookkeeping only —
//! the controller marks them in progress / completed as iterations proceed,
//! but nothing is scheduled from them.

use chrono::Utc;

/// Lifecycle of an advisory task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
}

/// A single extracted task.
#[derive(Debug, Clone)]
pub struct Task {
    /// Sequential id, starting at 1.
    pub id: u32,
    pub description: String,
    pub status: TaskStatus,
    pub created_at: String,
    pub updated_at: String,
}

/// Extract tasks from prompt text.
///
/// Recognized lines:
/// - `- [ ] description` / `* [ ] description` (unchecked boxes → pending)
/// - `- [x] description` (checked boxes → completed)
/// - `1. description` (numbered items → pending)
pub fn extract_tasks(prompt: &str) -> Vec<Task> {
    let now = Utc::now().to_rfc3339();
    let mut tasks = Vec::new();

    for line in prompt.lines() {
        let trimmed = line.trim();
        let parsed = parse_checkbox(trimmed).or_else(|| parse_numbered(trimmed));
        if let Some((description, status)) = parsed {
            if description.is_empty() {
                continue;
            }
            tasks.push(Task {
                id: tasks.len() as u32 + 1,
                description,
                status,
                created_at: now.clone(),
                updated_at: now.clone(),
            });
        }
    }

    tasks
}

fn parse_checkbox(line: &str) -> Option<(String, TaskStatus)> {
    let rest = line
        .strip_prefix("- ")
        .or_else(|| line.strip_prefix("* "))?;
    if let Some(desc) = rest.strip_prefix("[ ] ") {
        return Some((desc.trim().to_string(), TaskStatus::Pending));
    }
    if let Some(desc) = rest
        .strip_prefix("[x] ")
        .or_else(|| rest.strip_prefix("[X] "))
    {
        return Some((desc.trim().to_string(), TaskStatus::Completed));
    }
    None
}

fn parse_numbered(line: &str) -> Option<(String, TaskStatus)> {
    let dot = line.find(". ")?;
    if dot == 0 || !line[..dot].chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    Some((line[dot + 2..].trim().to_string(), TaskStatus::Pending))
}

/// In-memory task list with status transitions.
#[derive(Debug, Clone, Default)]
pub struct TaskList {
    tasks: Vec<Task>,
}

impl TaskList {
    pub fn from_prompt(prompt: &str) -> Self {
        TaskList {
            tasks: extract_tasks(prompt),
        }
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    /// First pending task, if any.
    pub fn next_pending(&self) -> Option<&Task> {
        self.tasks
            .iter()
            .find(|t| t.status == TaskStatus::Pending)
    }

    pub fn set_status(&mut self, id: u32, status: TaskStatus) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.status = status;
            task.updated_at = Utc::now().to_rfc3339();
        }
    }

    pub fn counts(&self) -> (usize, usize, usize) {
        let pending = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .count();
        let in_progress = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::InProgress)
            .count();
        let completed = self
            .tasks
            .iter()
            .filter(|t| t.status == TaskStatus::Completed)
            .count();
        (pending, in_progress, completed)
    }

    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.status == TaskStatus::Completed)
    }
}
