//! Fallback-chain execution
//!
//! A chain is an ordered list of backend identifiers for one component.
//! Execution tries each backend in turn, skipping any whose breaker is
//! open, routing the attempt through that breaker, and stopping at the
//! first success. The sentinel backend `"none"` terminates the chain with
//! an empty result, a deliberate "give up quietly" step.

use std::future::Future;

use crate::breaker::BreakerRegistry;

/// Chain-terminating sentinel
pub const NONE_BACKEND: &str = "none";

/// Required chains per component
pub mod chains {
    pub const OBJECT_DETECTION: &[&str] = &["on-device", "framework-vision", "cloud-lite", "none"];
    pub const AUDIO_CLASSIFICATION: &[&str] = &["system-analysis", "rule-based", "none"];
    pub const TTS: &[&str] = &["primary", "secondary", "on-device"];
    pub const LLM: &[&str] = &["deep", "fast", "rule-based"];
    pub const TRANSCRIPTION: &[&str] = &["primary", "alt-api", "on-device"];
}

/// Result of walking a chain
#[derive(Debug, Clone, PartialEq)]
pub struct ChainOutcome<T> {
    /// `None` when the chain terminated at the `"none"` sentinel
    pub result: Option<T>,
    /// Backend that produced the result
    pub backend: String,
    /// Whether anything other than the first backend served the call
    pub used_fallback: bool,
}

/// Walk `chain`, executing each backend through its breaker.
///
/// `component` namespaces breaker names so `"primary"` for TTS and
/// `"primary"` for transcription trip independently.
pub async fn run_chain<T, E, F, Fut>(
    component: &str,
    chain: &[&str],
    registry: &BreakerRegistry,
    now_ms: u64,
    mut execute: F,
) -> Result<ChainOutcome<T>, E>
where
    F: FnMut(&str) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut last_error: Option<E> = None;

    for (index, backend) in chain.iter().enumerate() {
        if *backend == NONE_BACKEND {
            tracing::debug!(component, "fallback chain terminated at none");
            return Ok(ChainOutcome {
                result: None,
                backend: NONE_BACKEND.to_string(),
                used_fallback: index > 0,
            });
        }

        let breaker_name = format!("{}:{}", component, backend);
        let breaker = registry.get(&breaker_name);
        if !breaker.lock().should_attempt(now_ms) {
            tracing::debug!(component, backend, "skipping backend: circuit open");
            continue;
        }

        match execute(backend).await {
            Ok(result) => {
                breaker.lock().record_success();
                return Ok(ChainOutcome {
                    result: Some(result),
                    backend: (*backend).to_string(),
                    used_fallback: index > 0,
                });
            }
            Err(err) => {
                tracing::warn!(component, backend, error = %err, "backend failed");
                breaker.lock().record_failure(now_ms);
                last_error = Some(err);
            }
        }
    }

    match last_error {
        Some(err) => Err(err),
        // Every backend skipped (all circuits open): surface as exhaustion
        // by executing none-result semantics.
        None => Ok(ChainOutcome {
            result: None,
            backend: String::new(),
            used_fallback: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn first_backend_success_short_circuits() {
        let registry = BreakerRegistry::new();
        let calls = AtomicU32::new(0);
        let outcome = run_chain("llm", chains::LLM, &registry, 0, |backend| {
            calls.fetch_add(1, Ordering::SeqCst);
            let backend = backend.to_string();
            async move { Ok::<_, redi_core::Error>(backend) }
        })
        .await
        .unwrap();

        assert_eq!(outcome.result.as_deref(), Some("deep"));
        assert!(!outcome.used_fallback);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failure_advances_to_next_backend() {
        let registry = BreakerRegistry::new();
        let outcome = run_chain("llm", chains::LLM, &registry, 0, |backend| {
            let backend = backend.to_string();
            async move {
                if backend == "deep" {
                    Err(redi_core::Error::Provider("down".into()))
                } else {
                    Ok(backend)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(outcome.result.as_deref(), Some("fast"));
        assert!(outcome.used_fallback);
    }

    #[tokio::test]
    async fn none_sentinel_yields_empty_result() {
        let registry = BreakerRegistry::new();
        let outcome = run_chain(
            "object_detection",
            chains::OBJECT_DETECTION,
            &registry,
            0,
            |_| async { Err::<(), _>(redi_core::Error::Provider("down".into())) },
        )
        .await
        .unwrap();

        assert!(outcome.result.is_none());
        assert_eq!(outcome.backend, NONE_BACKEND);
        assert!(outcome.used_fallback);
    }

    #[tokio::test]
    async fn chain_without_sentinel_propagates_last_error() {
        let registry = BreakerRegistry::new();
        let result = run_chain("tts", chains::TTS, &registry, 0, |_| async {
            Err::<(), _>(redi_core::Error::Provider("down".into()))
        })
        .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn open_breaker_skips_backend() {
        let registry = BreakerRegistry::new();
        // Trip the breaker for tts:primary
        {
            let breaker = registry.get("tts:primary");
            let mut guard = breaker.lock();
            for t in 0..5 {
                guard.record_failure(t);
            }
        }

        let outcome = run_chain("tts", chains::TTS, &registry, 10, |backend| {
            let backend = backend.to_string();
            async move { Ok::<_, redi_core::Error>(backend) }
        })
        .await
        .unwrap();

        assert_eq!(outcome.result.as_deref(), Some("secondary"));
        assert!(outcome.used_fallback);
    }

    #[tokio::test]
    async fn breaker_namespacing_is_per_component() {
        let registry = BreakerRegistry::new();
        {
            let breaker = registry.get("tts:primary");
            let mut guard = breaker.lock();
            for t in 0..5 {
                guard.record_failure(t);
            }
        }
        // Transcription's own "primary" is unaffected
        let outcome = run_chain("transcription", chains::TRANSCRIPTION, &registry, 10, |b| {
            let b = b.to_string();
            async move { Ok::<_, redi_core::Error>(b) }
        })
        .await
        .unwrap();
        assert_eq!(outcome.result.as_deref(), Some("primary"));
    }
}
