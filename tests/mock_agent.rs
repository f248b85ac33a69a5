//! Mock ACP agent binary for integration testing.
//!
//! This is the server side of the wire protocol: it reads newline-delimited
//! JSON-RPC requests on stdin and answers on stdout.
//!
//! Behaviour:
//! - `initialize`: announces itself as "mock-agent"
//! - `agent/run`: emits an `agent_message_chunk` update with text from the
//!   `MOCK_RESPONSE` environment variable (default: "Mock response"), then
//!   returns a result. Does not emit any tool calls.
//! - `MOCK_RESPONSE=ECHO_PROMPT` echoes the received prompt back, so tests
//!   can verify what the client actually sent.
//! - `MOCK_RESPONSE=FAIL` returns a JSON-RPC error instead of a result.
//! - `agent/cancel`: acknowledged with an empty result.
//!
//! Build: `cargo build --examples --features test-mock-agents`

use std::io::{self, BufRead, Write};

use serde_json::{json, Value};

fn send(line: &Value) {
    let mut stdout = io::stdout().lock();
    let _ = writeln!(stdout, "{line}");
    let _ = stdout.flush();
}

fn respond(id: u64, result: Value) {
    send(&json!({"jsonrpc": "2.0", "id": id, "result": result}));
}

fn notify_chunk(text: &str) {
    send(&json!({
        "jsonrpc": "2.0",
        "method": "update",
        "params": {"kind": "agent_message_chunk", "content": text},
    }));
}

fn main() {
    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };
        if line.trim().is_empty() {
            continue;
        }
        let request: Value = match serde_json::from_str(&line) {
            Ok(v) => v,
            Err(e) => {
                eprintln!("mock-agent: ignoring malformed line: {e}");
                continue;
            }
        };
        let id = request["id"].as_u64().unwrap_or(0);

        match request["method"].as_str() {
            Some("initialize") => {
                respond(
                    id,
                    json!({"agentInfo": {"name": "mock-agent", "version": "0.1.0"}}),
                );
            }
            Some("agent/run") => {
                let configured = std::env::var("MOCK_RESPONSE")
                    .unwrap_or_else(|_| "Mock response".to_string());

                if configured == "FAIL" {
                    send(&json!({
                        "jsonrpc": "2.0",
                        "id": id,
                        "error": {"code": -32000, "message": "mock agent failure"},
                    }));
                    continue;
                }

                let text = if configured == "ECHO_PROMPT" {
                    request["params"]["prompt"]
                        .as_str()
                        .unwrap_or("PROMPT_NOT_SET")
                        .to_string()
                } else {
                    configured
                };

                notify_chunk(&text);
                respond(id, json!({"stopReason": "end_turn"}));
            }
            Some("agent/cancel") => {
                respond(id, json!({}));
            }
            other => {
                eprintln!("mock-agent: unexpected method {other:?}");
            }
        }
    }
}
