//! Line-delimited JSON-RPC client for a spawned agent subprocess.
//!
//! The client owns the child process end to end: it spawns it with piped
//! stdio, runs a background read loop over stdout, routes responses to
//! pending requests by id, and folds `update` notifications into the
//! current [`Session`]. Requests are written to the child's stdin one
//! JSON object per line.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, ChildStdin};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::acp::protocol::{
    decode_line, encode_request, Incoming, Request, Response, CANCEL_METHOD, INITIALIZE_METHOD,
    RUN_METHOD,
};
use crate::acp::session::Session;
use crate::adapter::command::parse_command;
use crate::adapter::PermissionMode;
use crate::errors::{EngineError, Result};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<Response>>>>;

/// Client for one agent subprocess speaking newline-delimited JSON-RPC.
pub struct AcpClient {
    command: String,
    timeout: Duration,
    permission_mode: PermissionMode,
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    reader: Option<JoinHandle<()>>,
    pending: PendingMap,
    session: Arc<Mutex<Session>>,
    next_id: AtomicU64,
    initialized: bool,
}

impl AcpClient {
    pub fn new(
        command: impl Into<String>,
        timeout: Duration,
        permission_mode: PermissionMode,
    ) -> Self {
        let session_id = format!("sess-{:x}", std::process::id() as u64 ^ now_millis());
        AcpClient {
            command: command.into(),
            timeout,
            permission_mode,
            child: None,
            stdin: None,
            reader: None,
            pending: Arc::new(Mutex::new(HashMap::new())),
            session: Arc::new(Mutex::new(Session::new(session_id))),
            next_id: AtomicU64::new(0),
            initialized: false,
        }
    }

    pub fn is_running(&self) -> bool {
        self.child.is_some()
    }

    /// Spawn the agent process and start the stdout read loop.
    pub fn start(&mut self) -> Result<()> {
        if self.child.is_some() {
            return Err(EngineError::Execution(
                "agent process already running".to_string(),
            ));
        }

        let (program, args) = parse_command(&self.command)?;
        let mut child = tokio::process::Command::new(&program)
            .args(&args)
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                EngineError::Availability(format!("failed to spawn agent '{}': {}", program, e))
            })?;

        let stdin = child.stdin.take().ok_or_else(|| {
            EngineError::Execution("agent process has no stdin handle".to_string())
        })?;
        let stdout = child.stdout.take().ok_or_else(|| {
            EngineError::Execution("agent process has no stdout handle".to_string())
        })?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    eprintln!("agentloop: agent stderr: {}", line);
                }
            });
        }

        let pending = Arc::clone(&self.pending);
        let session = Arc::clone(&self.session);
        let reader = tokio::spawn(async move {
            let mut lines = BufReader::new(stdout).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line(&line) {
                    Ok(Incoming::Response(response)) => {
                        let sender = pending.lock().unwrap().remove(&response.id);
                        match sender {
                            Some(tx) => {
                                let _ = tx.send(response);
                            }
                            None => {
                                // Late reply to a timed-out or cancelled request.
                                eprintln!(
                                    "agentloop: dropping response for unknown request id {}",
                                    response.id
                                );
                            }
                        }
                    }
                    Ok(Incoming::Update(update)) => {
                        session.lock().unwrap().apply_update(&update);
                    }
                    Err(e) => {
                        eprintln!("agentloop: ignoring malformed agent line: {}", e);
                    }
                }
            }
        });

        self.child = Some(child);
        self.stdin = Some(stdin);
        self.reader = Some(reader);
        self.initialized = false;
        Ok(())
    }

    /// Send one prompt and block until the agent finishes its turn.
    ///
    /// Returns a snapshot of the session accumulated for this prompt.
    /// The previous prompt's output is cleared before the request goes out.
    pub async fn send_prompt(&mut self, prompt: &str) -> Result<Session> {
        if self.child.is_none() {
            return Err(EngineError::Execution(
                "agent process not started".to_string(),
            ));
        }

        if !self.initialized {
            self.initialize().await?;
        }

        let session_id = {
            let mut session = self.session.lock().unwrap();
            session.reset();
            session.session_id.clone()
        };

        let mut params = json!({
            "sessionId": session_id,
            "prompt": prompt,
            "permissionMode": permission_wire_name(&self.permission_mode),
        });
        if let PermissionMode::Allowlist(ref tools) = self.permission_mode {
            params["allowedTools"] = json!(tools);
        }
        if matches!(self.permission_mode, PermissionMode::Interactive) {
            eprintln!(
                "agentloop: interactive permission mode has no terminal here, \
                 falling back to auto-approve"
            );
        }

        let response = self.send_request(RUN_METHOD, Some(params)).await?;

        let mut session = self.session.lock().unwrap();
        match response.error {
            Some(err) => {
                session.error = Some(format!("agent error {}: {}", err.code, err.message));
            }
            None => {
                session.completed = true;
            }
        }
        Ok(session.clone())
    }

    /// Best-effort cancellation of the in-flight turn.
    pub async fn cancel(&mut self) -> Result<()> {
        if self.child.is_none() {
            return Ok(());
        }
        let session_id = self.session.lock().unwrap().session_id.clone();
        self.send_request(CANCEL_METHOD, Some(json!({ "sessionId": session_id })))
            .await?;
        Ok(())
    }

    /// Kill the agent process and tear down the read loop.
    ///
    /// Pending requests observe a dropped channel and fail; safe to call
    /// more than once.
    pub async fn stop(&mut self) -> Result<()> {
        self.stdin.take();
        if let Some(mut child) = self.child.take() {
            let _ = child.kill().await;
            let _ = child.wait().await;
        }
        if let Some(reader) = self.reader.take() {
            let _ = reader.await;
        }
        self.pending.lock().unwrap().clear();
        self.session.lock().unwrap().reset();
        self.initialized = false;
        Ok(())
    }

    async fn initialize(&mut self) -> Result<()> {
        let params = json!({
            "clientInfo": { "name": "agentloop", "version": env!("CARGO_PKG_VERSION") },
        });
        let response = self.send_request(INITIALIZE_METHOD, Some(params)).await?;
        if let Some(err) = response.error {
            return Err(EngineError::Protocol(format!(
                "initialize failed with code {}: {}",
                err.code, err.message
            )));
        }
        self.initialized = true;
        Ok(())
    }

    /// Write one request line and wait for its response, bounded by the
    /// client timeout. Ids are monotonic and never reused.
    async fn send_request(&mut self, method: &str, params: Option<Value>) -> Result<Response> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let request = Request::new(id, method, params);
        let line = encode_request(&request)?;

        let (tx, rx) = oneshot::channel();
        self.pending.lock().unwrap().insert(id, tx);

        let stdin = self.stdin.as_mut().ok_or_else(|| {
            EngineError::Execution("agent stdin closed".to_string())
        })?;
        if let Err(e) = stdin.write_all(line.as_bytes()).await {
            self.pending.lock().unwrap().remove(&id);
            return Err(EngineError::Protocol(format!(
                "failed to write request to agent: {}",
                e
            )));
        }
        if let Err(e) = stdin.flush().await {
            self.pending.lock().unwrap().remove(&id);
            return Err(EngineError::Protocol(format!(
                "failed to flush request to agent: {}",
                e
            )));
        }

        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => {
                // Read loop dropped the sender: process died mid-request.
                self.pending.lock().unwrap().remove(&id);
                Err(EngineError::Protocol(
                    "agent process closed its output before responding".to_string(),
                ))
            }
            Err(_) => {
                self.pending.lock().unwrap().remove(&id);
                Err(EngineError::Timeout(format!(
                    "agent did not answer '{}' within {:?}",
                    method, self.timeout
                )))
            }
        }
    }
}

fn permission_wire_name(mode: &PermissionMode) -> &'static str {
    match mode {
        PermissionMode::AutoApprove => "auto_approve",
        PermissionMode::DenyAll => "deny_all",
        PermissionMode::Allowlist(_) => "allowlist",
        // No terminal to prompt on; the caller is warned and we approve.
        PermissionMode::Interactive => "auto_approve",
    }
}

fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell_agent(dir: &tempfile::TempDir, script: &str) -> String {
        let path = dir.path().join("agent.sh");
        std::fs::write(&path, script).unwrap();
        format!("sh {}", path.display())
    }

    #[test]
    fn permission_wire_names() {
        assert_eq!(permission_wire_name(&PermissionMode::AutoApprove), "auto_approve");
        assert_eq!(permission_wire_name(&PermissionMode::DenyAll), "deny_all");
        assert_eq!(
            permission_wire_name(&PermissionMode::Allowlist(vec!["bash".to_string()])),
            "allowlist"
        );
        assert_eq!(permission_wire_name(&PermissionMode::Interactive), "auto_approve");
    }

    #[tokio::test]
    async fn prompt_round_trip_with_shell_agent() {
        let dir = tempfile::tempdir().unwrap();
        let command = shell_agent(
            &dir,
            concat!(
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}'\n",
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"method\":\"update\",\"params\":",
                "{\"kind\":\"agent_message_chunk\",\"content\":\"hello from agent\"}}'\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"stopReason\":\"end_turn\"}}'\n",
            ),
        );

        let mut client =
            AcpClient::new(command, Duration::from_secs(5), PermissionMode::AutoApprove);
        client.start().unwrap();
        let session = client.send_prompt("do the thing").await.unwrap();
        assert!(session.completed);
        assert_eq!(session.output, "hello from agent");
        assert!(session.error.is_none());
        client.stop().await.unwrap();
        assert!(!client.is_running());
    }

    #[tokio::test]
    async fn error_response_sets_session_error() {
        let dir = tempfile::tempdir().unwrap();
        let command = shell_agent(
            &dir,
            concat!(
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}'\n",
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"error\":",
                "{\"code\":-32000,\"message\":\"agent crashed\"}}'\n",
            ),
        );

        let mut client =
            AcpClient::new(command, Duration::from_secs(5), PermissionMode::AutoApprove);
        client.start().unwrap();
        let session = client.send_prompt("do the thing").await.unwrap();
        assert!(!session.completed);
        assert_eq!(
            session.error.as_deref(),
            Some("agent error -32000: agent crashed")
        );
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn unknown_id_response_is_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let command = shell_agent(
            &dir,
            concat!(
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}'\n",
                "read _\n",
                // A reply no request ever asked for must not be routed
                // anywhere; the real reply after it still lands.
                "echo '{\"jsonrpc\":\"2.0\",\"id\":99,\"result\":{\"stopReason\":\"end_turn\"}}'\n",
                "echo '{\"jsonrpc\":\"2.0\",\"method\":\"update\",\"params\":",
                "{\"kind\":\"agent_message_chunk\",\"content\":\"still here\"}}'\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"stopReason\":\"end_turn\"}}'\n",
            ),
        );

        let mut client =
            AcpClient::new(command, Duration::from_secs(5), PermissionMode::AutoApprove);
        client.start().unwrap();
        let session = client.send_prompt("do the thing").await.unwrap();
        assert!(session.completed);
        assert_eq!(session.output, "still here");
        assert!(client.pending.lock().unwrap().is_empty());
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn silent_agent_times_out() {
        let dir = tempfile::tempdir().unwrap();
        let command = shell_agent(
            &dir,
            concat!(
                "read _\n",
                "echo '{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{}}'\n",
                "sleep 30\n",
            ),
        );

        let mut client = AcpClient::new(
            command,
            Duration::from_millis(500),
            PermissionMode::AutoApprove,
        );
        client.start().unwrap();
        let err = client.send_prompt("do the thing").await.unwrap_err();
        assert!(matches!(err, EngineError::Timeout(_)));
        assert!(client.pending.lock().unwrap().is_empty());
        client.stop().await.unwrap();
    }

    #[tokio::test]
    async fn start_fails_for_missing_binary() {
        let mut client = AcpClient::new(
            "definitely-not-a-real-agent-binary-xyz",
            Duration::from_secs(1),
            PermissionMode::AutoApprove,
        );
        let err = client.start().unwrap_err();
        assert!(matches!(err, EngineError::Availability(_)));
    }
}
