//! Structured (JSON) completions with repair and bounded retry.

use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use citewire_core::defaults::{STRUCTURED_BACKOFF_MS, STRUCTURED_RETRIES};
use citewire_core::{Error, GenerationBackend, Result};

use crate::json_repair::repair_json;

/// Request a JSON completion and deserialize it into `T`.
///
/// On malformed output the raw text is first run through
/// [`repair_json`]; if it still does not parse, the model is re-invoked
/// with exponential backoff, up to [`STRUCTURED_RETRIES`] additional
/// attempts. Exhausting the retries is a [`Error::Inference`].
#[instrument(skip(backend, system, prompt), fields(
    subsystem = "inference",
    component = "structured",
    op = "complete_structured",
    prompt_len = prompt.len(),
))]
pub async fn complete_structured<T: DeserializeOwned>(
    backend: &dyn GenerationBackend,
    system: &str,
    prompt: &str,
) -> Result<T> {
    let mut last_error = String::new();

    for attempt in 0..=STRUCTURED_RETRIES {
        if attempt > 0 {
            let backoff = STRUCTURED_BACKOFF_MS * 2u64.pow(attempt - 1);
            warn!(
                attempt,
                backoff_ms = backoff,
                error_msg = %last_error,
                "Structured output parse failed, retrying"
            );
            tokio::time::sleep(Duration::from_millis(backoff)).await;
        }

        let raw = backend.generate_json(system, prompt).await?;

        match serde_json::from_str::<T>(&raw) {
            Ok(value) => {
                debug!(attempt, retries_used = attempt, "Structured output parsed");
                return Ok(value);
            }
            Err(first_err) => {
                let repaired = repair_json(&raw);
                match serde_json::from_str::<T>(&repaired) {
                    Ok(value) => {
                        debug!(attempt, repaired = true, "Structured output parsed after repair");
                        return Ok(value);
                    }
                    Err(_) => {
                        last_error = first_err.to_string();
                    }
                }
            }
        }
    }

    Err(Error::Inference(format!(
        "structured output failed to parse after {} attempts: {}",
        STRUCTURED_RETRIES + 1,
        last_error
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde::Deserialize;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Deserialize, PartialEq)]
    struct Classification {
        intent: String,
        confidence: f64,
    }

    /// Backend that serves a fixed sequence of responses.
    struct ScriptedBackend {
        responses: Vec<String>,
        calls: AtomicUsize,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<&str>) -> Self {
            Self {
                responses: responses.into_iter().map(String::from).collect(),
                calls: AtomicUsize::new(0),
            }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl GenerationBackend for ScriptedBackend {
        async fn generate(&self, prompt: &str) -> Result<String> {
            self.generate_json("", prompt).await
        }

        async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
            self.generate_json("", prompt).await
        }

        async fn generate_json(&self, _system: &str, _prompt: &str) -> Result<String> {
            let idx = self.calls.fetch_add(1, Ordering::SeqCst);
            self.responses
                .get(idx.min(self.responses.len() - 1))
                .cloned()
                .ok_or_else(|| Error::Inference("no scripted response".to_string()))
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn test_clean_json_parses_first_try() {
        let backend =
            ScriptedBackend::new(vec![r#"{"intent": "analysis", "confidence": 0.9}"#]);
        let c: Classification = complete_structured(&backend, "", "classify").await.unwrap();
        assert_eq!(c.intent, "analysis");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test]
    async fn test_fenced_json_repaired_without_retry() {
        let backend = ScriptedBackend::new(vec![
            "```json\n{\"intent\": \"retrieval\", \"confidence\": 0.8}\n```",
        ]);
        let c: Classification = complete_structured(&backend, "", "classify").await.unwrap();
        assert_eq!(c.intent, "retrieval");
        assert_eq!(backend.call_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_garbage_then_valid_uses_one_retry() {
        let backend = ScriptedBackend::new(vec![
            "not json at all",
            r#"{"intent": "analysis", "confidence": 0.7}"#,
        ]);
        let c: Classification = complete_structured(&backend, "", "classify").await.unwrap();
        assert_eq!(c.intent, "analysis");
        assert_eq!(backend.call_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_are_bounded() {
        let backend = ScriptedBackend::new(vec!["still not json"]);
        let result: Result<Classification> = complete_structured(&backend, "", "classify").await;
        assert!(result.is_err());
        assert_eq!(backend.call_count(), (STRUCTURED_RETRIES + 1) as usize);
    }

    #[tokio::test]
    async fn test_backend_error_propagates_immediately() {
        struct FailingBackend;

        #[async_trait]
        impl GenerationBackend for FailingBackend {
            async fn generate(&self, _prompt: &str) -> Result<String> {
                Err(Error::Inference("down".to_string()))
            }
            async fn generate_with_system(&self, _s: &str, _p: &str) -> Result<String> {
                Err(Error::Inference("down".to_string()))
            }
            async fn generate_json(&self, _s: &str, _p: &str) -> Result<String> {
                Err(Error::Inference("down".to_string()))
            }
            fn model_name(&self) -> &str {
                "failing"
            }
        }

        let result: Result<Classification> =
            complete_structured(&FailingBackend, "", "classify").await;
        assert!(result.is_err());
    }
}
