//! ACP wire format: newline-delimited JSON-RPC 2.0 with streaming updates.
//!
//! Each direction of the stream carries one JSON object per line. Requests
//! carry a client-assigned integer id; responses are correlated by that id.
//! Unsolicited `update` notifications (no id) stream deltas tagged by a
//! `kind` discriminator.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{EngineError, Result};

pub const JSONRPC_VERSION: &str = "2.0";

/// Method name for streaming update notifications.
pub const UPDATE_METHOD: &str = "update";

/// Method name for running a prompt.
pub const RUN_METHOD: &str = "agent/run";

/// Method name for the handshake.
pub const INITIALIZE_METHOD: &str = "initialize";

/// Method name for cancelling the in-flight prompt.
pub const CANCEL_METHOD: &str = "agent/cancel";

/// A client-to-agent request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Request {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl Request {
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        Request {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.into(),
            params,
        }
    }
}

/// An agent-to-client response, correlated by id.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Response {
    pub jsonrpc: String,
    pub id: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Streaming delta kinds.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum UpdateKind {
    AgentMessageChunk,
    AgentThoughtChunk,
    ToolCall,
    ToolCallUpdate,
    Plan,
}

/// Payload of an `update` notification.
///
/// Kept flat rather than as an internally-tagged enum: agents routinely
/// include fields that only apply to some kinds, and unknown extras must
/// not be fatal.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Update {
    pub kind: Option<UpdateKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(rename = "toolName", skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(rename = "toolCallId", skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Any inbound line from the agent.
#[derive(Debug, Clone, PartialEq)]
pub enum Incoming {
    Response(Response),
    Update(Update),
}

/// Decode one line from the agent's output stream.
///
/// A line with an `id` is a response; a line with `method == "update"` is a
/// streaming notification. Anything else is a protocol error the caller may
/// choose to log and skip.
pub fn decode_line(line: &str) -> Result<Incoming> {
    let value: Value = serde_json::from_str(line)
        .map_err(|e| EngineError::Protocol(format!("malformed message: {e}")))?;

    if value.get("id").is_some() && value.get("method").is_none() {
        let resp: Response = serde_json::from_value(value)
            .map_err(|e| EngineError::Protocol(format!("malformed response: {e}")))?;
        return Ok(Incoming::Response(resp));
    }

    if value.get("method").and_then(Value::as_str) == Some(UPDATE_METHOD) {
        let params = value.get("params").cloned().unwrap_or(Value::Null);
        let update: Update = serde_json::from_value(params)
            .map_err(|e| EngineError::Protocol(format!("malformed update: {e}")))?;
        return Ok(Incoming::Update(update));
    }

    Err(EngineError::Protocol(format!(
        "unrecognized message: {line}"
    )))
}

/// Encode a request as one newline-terminated line.
pub fn encode_request(request: &Request) -> Result<String> {
    let mut line = serde_json::to_string(request)
        .map_err(|e| EngineError::Protocol(format!("failed to encode request: {e}")))?;
    line.push('\n');
    Ok(line)
}
