//! [`Adapter`] implementation backed by a persistent ACP agent process.

use tokio::sync::Mutex;

use crate::acp::client::AcpClient;
use crate::adapter::command::{parse_command, which};
use crate::adapter::{Adapter, AdapterConfig, AdapterKind, AdapterResponse, ExecuteOptions};
use crate::errors::Result;

/// Drives one long-lived agent subprocess through [`AcpClient`].
///
/// Unlike the one-shot command adapters, the agent process survives across
/// prompts; the client resets its session between turns. The tokio mutex
/// serializes prompts, which the wire protocol requires anyway.
pub struct AcpAdapter {
    command: String,
    config: AdapterConfig,
    client: Mutex<AcpClient>,
}

impl AcpAdapter {
    pub fn new(command: impl Into<String>, config: AdapterConfig) -> Self {
        let command = command.into();
        let client = AcpClient::new(
            command.clone(),
            config.timeout,
            config.permission_mode.clone(),
        );
        AcpAdapter {
            command,
            config,
            client: Mutex::new(client),
        }
    }

    /// Shut down the underlying agent process if one is running.
    pub async fn shutdown(&self) -> Result<()> {
        self.client.lock().await.stop().await
    }
}

#[async_trait::async_trait]
impl Adapter for AcpAdapter {
    fn kind(&self) -> AdapterKind {
        AdapterKind::Acp
    }

    async fn check_availability(&self) -> bool {
        if !self.config.enabled {
            return false;
        }
        match parse_command(&self.command) {
            Ok((program, _)) => which(&program).await,
            Err(_) => false,
        }
    }

    async fn execute(&self, prompt: &str, options: &ExecuteOptions) -> Result<AdapterResponse> {
        let started = std::time::Instant::now();
        let mut client = self.client.lock().await;
        if !client.is_running() {
            client.start()?;
        }

        let session = match client.send_prompt(prompt).await {
            Ok(session) => session,
            Err(e) => {
                // A dead or wedged process would poison every later turn.
                let _ = client.stop().await;
                return Err(e);
            }
        };

        if options.verbose {
            for call in &session.tool_calls {
                crate::output::formatter::print_tool_call(call);
            }
        }

        let mut response = if session.completed {
            AdapterResponse::ok(session.output.clone())
        } else {
            AdapterResponse::failed(
                session
                    .error
                    .clone()
                    .unwrap_or_else(|| "agent turn ended without completing".to_string()),
            )
        };
        response
            .metadata
            .insert("backend".to_string(), self.kind().to_string());
        response.metadata.insert(
            "duration_ms".to_string(),
            started.elapsed().as_millis().to_string(),
        );
        response.metadata.insert(
            "tool_calls".to_string(),
            session.tool_calls.len().to_string(),
        );
        if !session.thoughts.is_empty() {
            response
                .metadata
                .insert("thought_chars".to_string(), session.thoughts.len().to_string());
        }
        Ok(response)
    }

    fn estimate_cost(&self, _prompt: &str) -> f64 {
        // The agent meters its own usage; nothing reliable to estimate here.
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_adapter_is_unavailable() {
        let config = AdapterConfig {
            enabled: false,
            ..Default::default()
        };
        let adapter = AcpAdapter::new("sh", config);
        assert!(!adapter.check_availability().await);
    }

    #[tokio::test]
    async fn missing_binary_is_unavailable() {
        let adapter = AcpAdapter::new(
            "definitely-not-a-real-agent-binary-xyz",
            AdapterConfig::default(),
        );
        assert!(!adapter.check_availability().await);
    }

    #[tokio::test]
    async fn present_binary_is_available() {
        let adapter = AcpAdapter::new("sh -c agent", AdapterConfig::default());
        assert!(adapter.check_availability().await);
    }

    #[tokio::test]
    async fn execute_against_shell_agent() {
        use std::io::Write as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.sh");
        let mut f = std::fs::File::create(&path).unwrap();
        writeln!(f, "read _").unwrap();
        writeln!(f, "echo '{{\"jsonrpc\":\"2.0\",\"id\":0,\"result\":{{}}}}'").unwrap();
        writeln!(f, "read _").unwrap();
        writeln!(
            f,
            "echo '{{\"jsonrpc\":\"2.0\",\"method\":\"update\",\"params\":{{\"kind\":\"agent_message_chunk\",\"content\":\"ok\"}}}}'"
        )
        .unwrap();
        writeln!(f, "echo '{{\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{{}}}}'").unwrap();
        drop(f);

        let adapter = AcpAdapter::new(format!("sh {}", path.display()), AdapterConfig::default());
        let response = adapter
            .execute("go", &ExecuteOptions::default())
            .await
            .unwrap();
        assert!(response.success);
        assert_eq!(response.output, "ok");
        assert_eq!(response.metadata.get("backend").map(String::as_str), Some("acp"));
        adapter.shutdown().await.unwrap();
    }
}
