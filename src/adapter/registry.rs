//! Backend discovery and the fallback chain.
//!
//! At startup the registry probes a fixed priority list of adapters for
//! availability and picks the first available one as the primary; the rest
//! of the list (minus the primary) becomes the ordered fallback chain. The
//! result is owned by one controller instance, not a process-wide global.

use std::sync::Arc;

use crate::adapter::{Adapter, AdapterKind, AdapterResponse, ExecuteOptions};
use crate::errors::{EngineError, Result};

/// The chosen primary adapter plus its ordered fallbacks.
pub struct AdapterSelection {
    pub primary: Arc<dyn Adapter>,
    pub fallbacks: Vec<Arc<dyn Adapter>>,
}

impl AdapterSelection {
    pub fn primary_kind(&self) -> AdapterKind {
        self.primary.kind()
    }

    pub fn fallback_kinds(&self) -> Vec<AdapterKind> {
        self.fallbacks.iter().map(|a| a.kind()).collect()
    }

    /// Execute against the primary, then each fallback in order.
    ///
    /// The first success wins. If every adapter fails, the primary's error
    /// is what gets recorded for the iteration. Infrastructure errors
    /// (spawn failure, timeout) are folded into failed responses here so
    /// the caller sees one uniform shape.
    pub async fn execute_with_fallback(
        &self,
        prompt: &str,
        options: &ExecuteOptions,
    ) -> AdapterResponse {
        let primary_resp = run_one(self.primary.as_ref(), prompt, options).await;
        if primary_resp.success {
            return primary_resp;
        }

        for fallback in &self.fallbacks {
            crate::output::formatter::print_fallback(
                &self.primary.kind().to_string(),
                &fallback.kind().to_string(),
            );
            let resp = run_one(fallback.as_ref(), prompt, options).await;
            if resp.success {
                return resp;
            }
        }

        primary_resp
    }
}

async fn run_one(adapter: &dyn Adapter, prompt: &str, options: &ExecuteOptions) -> AdapterResponse {
    match adapter.execute(prompt, options).await {
        Ok(resp) => resp,
        Err(e) => {
            let mut resp = AdapterResponse::failed(e.to_string());
            resp.metadata
                .insert("backend".to_string(), adapter.kind().to_string());
            resp
        }
    }
}

/// Probe `candidates` in priority order and build an [`AdapterSelection`].
///
/// `preferred` pins the primary to a specific kind (it must still probe as
/// available). Fails with [`EngineError::Availability`] when nothing is
/// reachable.
pub async fn select_adapters(
    candidates: Vec<Arc<dyn Adapter>>,
    preferred: Option<AdapterKind>,
) -> Result<AdapterSelection> {
    let mut available: Vec<Arc<dyn Adapter>> = Vec::new();
    for adapter in candidates {
        if adapter.check_availability().await {
            available.push(adapter);
        }
    }

    if available.is_empty() {
        return Err(EngineError::Availability(
            "no agent backend available; checked the configured priority list".to_string(),
        ));
    }

    let primary_idx = match preferred {
        Some(kind) => available
            .iter()
            .position(|a| a.kind() == kind)
            .ok_or_else(|| {
                EngineError::Availability(format!("preferred backend '{kind}' is not available"))
            })?,
        None => 0,
    };

    let primary = available.remove(primary_idx);
    Ok(AdapterSelection {
        primary,
        fallbacks: available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::Adapter;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Scriptable adapter for registry tests.
    struct FakeAdapter {
        kind: AdapterKind,
        available: bool,
        succeed: bool,
        output: String,
        calls: AtomicU32,
    }

    impl FakeAdapter {
        fn new(kind: AdapterKind, available: bool, succeed: bool, output: &str) -> Arc<Self> {
            Arc::new(FakeAdapter {
                kind,
                available,
                succeed,
                output: output.to_string(),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Adapter for FakeAdapter {
        fn kind(&self) -> AdapterKind {
            self.kind
        }

        async fn check_availability(&self) -> bool {
            self.available
        }

        async fn execute(
            &self,
            _prompt: &str,
            _options: &ExecuteOptions,
        ) -> Result<AdapterResponse> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.succeed {
                Ok(AdapterResponse::ok(self.output.clone()))
            } else {
                Ok(AdapterResponse::failed(format!("{} broke", self.kind)))
            }
        }

        fn estimate_cost(&self, _prompt: &str) -> f64 {
            0.0
        }
    }

    #[tokio::test]
    async fn first_available_becomes_primary() {
        let unavailable = FakeAdapter::new(AdapterKind::Acp, false, true, "");
        let claude = FakeAdapter::new(AdapterKind::Claude, true, true, "ok");
        let codex = FakeAdapter::new(AdapterKind::Codex, true, true, "ok");

        let selection = select_adapters(vec![unavailable, claude, codex], None)
            .await
            .unwrap();
        assert_eq!(selection.primary_kind(), AdapterKind::Claude);
        assert_eq!(selection.fallback_kinds(), vec![AdapterKind::Codex]);
    }

    #[tokio::test]
    async fn preferred_kind_is_pinned() {
        let claude = FakeAdapter::new(AdapterKind::Claude, true, true, "ok");
        let codex = FakeAdapter::new(AdapterKind::Codex, true, true, "ok");

        let selection = select_adapters(vec![claude, codex], Some(AdapterKind::Codex))
            .await
            .unwrap();
        assert_eq!(selection.primary_kind(), AdapterKind::Codex);
        // The primary never appears in its own fallback list.
        assert_eq!(selection.fallback_kinds(), vec![AdapterKind::Claude]);
    }

    #[tokio::test]
    async fn unavailable_preferred_is_an_error() {
        let claude = FakeAdapter::new(AdapterKind::Claude, true, true, "ok");
        let result = select_adapters(vec![claude], Some(AdapterKind::Gemini)).await;
        assert!(matches!(result, Err(EngineError::Availability(_))));
    }

    #[tokio::test]
    async fn no_backends_is_an_error() {
        let result = select_adapters(vec![], None).await;
        assert!(matches!(result, Err(EngineError::Availability(_))));
    }

    #[tokio::test]
    async fn fallback_output_wins_when_primary_fails() {
        let primary = FakeAdapter::new(AdapterKind::Claude, true, false, "");
        let fallback = FakeAdapter::new(AdapterKind::Codex, true, true, "fallback output");
        let selection = AdapterSelection {
            primary: primary.clone(),
            fallbacks: vec![fallback.clone()],
        };

        let resp = selection
            .execute_with_fallback("prompt", &ExecuteOptions::default())
            .await;
        assert!(resp.success);
        assert_eq!(resp.output, "fallback output");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn all_failures_report_primary_error() {
        let primary = FakeAdapter::new(AdapterKind::Claude, true, false, "");
        let fb1 = FakeAdapter::new(AdapterKind::Codex, true, false, "");
        let fb2 = FakeAdapter::new(AdapterKind::Gemini, true, false, "");
        let selection = AdapterSelection {
            primary,
            fallbacks: vec![fb1, fb2],
        };

        let resp = selection
            .execute_with_fallback("prompt", &ExecuteOptions::default())
            .await;
        assert!(!resp.success);
        assert!(resp.error.contains("claude broke"));
    }

    #[tokio::test]
    async fn successful_primary_skips_fallbacks() {
        let primary = FakeAdapter::new(AdapterKind::Claude, true, true, "primary output");
        let fallback = FakeAdapter::new(AdapterKind::Codex, true, true, "unused");
        let selection = AdapterSelection {
            primary,
            fallbacks: vec![fallback.clone()],
        };

        let resp = selection
            .execute_with_fallback("prompt", &ExecuteOptions::default())
            .await;
        assert_eq!(resp.output, "primary output");
        assert_eq!(fallback.calls.load(Ordering::SeqCst), 0);
    }
}
