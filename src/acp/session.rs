//! Per-prompt session state accumulated from streaming updates.

use serde_json::Value;

use crate::acp::protocol::{Update, UpdateKind};

/// Lifecycle of an agent-side tool call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolCallStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

impl ToolCallStatus {
    fn parse(s: &str) -> Option<ToolCallStatus> {
        match s {
            "pending" => Some(ToolCallStatus::Pending),
            "running" => Some(ToolCallStatus::Running),
            "completed" => Some(ToolCallStatus::Completed),
            "failed" => Some(ToolCallStatus::Failed),
            _ => None,
        }
    }
}

/// One tool invocation reported by the agent.
///
/// Created by a `tool_call` update; mutated in place by `tool_call_update`
/// notifications matched on id. Never deleted.
#[derive(Debug, Clone)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
    pub status: ToolCallStatus,
    pub result: Option<Value>,
    pub error: Option<String>,
}

/// Accumulator for one prompt's worth of agent activity.
///
/// Owned exclusively by the ACP client; all fields are cleared at the start
/// of every new prompt.
#[derive(Debug, Clone, Default)]
pub struct Session {
    /// Opaque id generated at client start.
    pub session_id: String,
    pub output: String,
    pub thoughts: String,
    pub tool_calls: Vec<ToolCall>,
    pub completed: bool,
    pub error: Option<String>,
}

impl Session {
    pub fn new(session_id: impl Into<String>) -> Self {
        Session {
            session_id: session_id.into(),
            ..Default::default()
        }
    }

    /// Clear everything except the session id, ready for a new prompt.
    pub fn reset(&mut self) {
        self.output.clear();
        self.thoughts.clear();
        self.tool_calls.clear();
        self.completed = false;
        self.error = None;
    }

    /// Apply one streaming update, dispatching on its `kind`.
    ///
    /// Unknown tool-call ids and kind-less updates are ignored — streaming
    /// noise must never kill the session.
    pub fn apply_update(&mut self, update: &Update) {
        let Some(kind) = update.kind else { return };
        match kind {
            UpdateKind::AgentMessageChunk => {
                if let Some(ref content) = update.content {
                    self.output.push_str(content);
                }
            }
            UpdateKind::AgentThoughtChunk => {
                if let Some(ref content) = update.content {
                    self.thoughts.push_str(content);
                }
            }
            UpdateKind::ToolCall => {
                let Some(ref id) = update.tool_call_id else {
                    return;
                };
                self.tool_calls.push(ToolCall {
                    id: id.clone(),
                    name: update.tool_name.clone().unwrap_or_default(),
                    arguments: update.arguments.clone().unwrap_or(Value::Null),
                    status: ToolCallStatus::Pending,
                    result: None,
                    error: None,
                });
            }
            UpdateKind::ToolCallUpdate => {
                let Some(ref id) = update.tool_call_id else {
                    return;
                };
                let Some(call) = self.tool_calls.iter_mut().find(|c| &c.id == id) else {
                    // Update for a tool call we never saw: drop it.
                    return;
                };
                if let Some(ref status) = update.status {
                    if let Some(parsed) = ToolCallStatus::parse(status) {
                        call.status = parsed;
                    }
                }
                if update.result.is_some() {
                    call.result = update.result.clone();
                }
                if update.error.is_some() {
                    call.error = update.error.clone();
                }
            }
            UpdateKind::Plan => {
                // Plans are informational; nothing to accumulate.
            }
        }
    }
}
