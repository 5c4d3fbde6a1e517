//! Mock inference backend for deterministic testing.
//!
//! Generates deterministic embeddings seeded by the input text, so the
//! same text always embeds to the same vector, and serves canned
//! generation responses selected by prompt substring.

use async_trait::async_trait;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

use citewire_core::{
    EmbeddingBackend, Error, GenerationBackend, InferenceBackend, Result, Vector,
};

/// Mock inference backend for testing.
#[derive(Clone)]
pub struct MockInferenceBackend {
    config: Arc<MockConfig>,
    call_log: Arc<Mutex<Vec<MockCall>>>,
}

#[derive(Debug, Clone)]
struct MockConfig {
    dimension: usize,
    /// Responses keyed by prompt substring, checked in insertion order.
    response_mappings: Vec<(String, String)>,
    default_response: String,
    failure_rate: f64,
}

/// One logged backend invocation.
#[derive(Debug, Clone)]
pub struct MockCall {
    pub operation: String,
    pub input: String,
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            dimension: 768,
            response_mappings: Vec::new(),
            default_response: "Mock response".to_string(),
            failure_rate: 0.0,
        }
    }
}

impl MockInferenceBackend {
    /// Create a new mock backend with default configuration.
    pub fn new() -> Self {
        Self {
            config: Arc::new(MockConfig::default()),
            call_log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Set the embedding dimension.
    pub fn with_dimension(mut self, dimension: usize) -> Self {
        Arc::make_mut(&mut self.config).dimension = dimension;
        self
    }

    /// Set the fallback response for generation requests.
    pub fn with_fixed_response(mut self, response: impl Into<String>) -> Self {
        Arc::make_mut(&mut self.config).default_response = response.into();
        self
    }

    /// Serve `output` for any prompt containing `needle`. Mappings are
    /// checked in the order they were added.
    pub fn with_response_mapping(
        mut self,
        needle: impl Into<String>,
        output: impl Into<String>,
    ) -> Self {
        Arc::make_mut(&mut self.config)
            .response_mappings
            .push((needle.into(), output.into()));
        self
    }

    /// Set failure rate (0.0 - 1.0) for testing error handling.
    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        Arc::make_mut(&mut self.config).failure_rate = rate.clamp(0.0, 1.0);
        self
    }

    /// Get all logged calls for assertion.
    pub fn get_calls(&self) -> Vec<MockCall> {
        self.call_log.lock().unwrap().clone()
    }

    /// Get number of generation calls (all variants).
    pub fn generate_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation.starts_with("generate"))
            .count()
    }

    /// Get number of embed calls.
    pub fn embed_call_count(&self) -> usize {
        self.call_log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.operation == "embed")
            .count()
    }

    fn log_call(&self, operation: &str, input: &str) {
        self.call_log.lock().unwrap().push(MockCall {
            operation: operation.to_string(),
            input: input.to_string(),
        });
    }

    fn should_fail(&self) -> bool {
        use rand::Rng;
        self.config.failure_rate > 0.0
            && rand::thread_rng().gen::<f64>() < self.config.failure_rate
    }

    fn respond_to(&self, prompt: &str) -> String {
        for (needle, output) in &self.config.response_mappings {
            if prompt.contains(needle.as_str()) {
                return output.clone();
            }
        }
        self.config.default_response.clone()
    }
}

impl Default for MockInferenceBackend {
    fn default() -> Self {
        Self::new()
    }
}

/// Deterministic pseudo-embedding seeded by the text's hash. Equal texts
/// embed identically; different texts almost surely do not.
fn seeded_embedding(text: &str, dimension: usize) -> Vector {
    let mut hasher = DefaultHasher::new();
    text.hash(&mut hasher);
    let mut state = hasher.finish();

    let values: Vec<f32> = (0..dimension)
        .map(|_| {
            // xorshift step over the seed.
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            ((state % 2000) as f32 / 1000.0) - 1.0
        })
        .collect();
    Vector::from(values)
}

#[async_trait]
impl EmbeddingBackend for MockInferenceBackend {
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
        if self.should_fail() {
            return Err(Error::Embedding("mock embedding failure".to_string()));
        }
        for t in texts {
            self.log_call("embed", t);
        }
        Ok(texts
            .iter()
            .map(|t| seeded_embedding(t, self.config.dimension))
            .collect())
    }

    fn dimension(&self) -> usize {
        self.config.dimension
    }

    fn model_name(&self) -> &str {
        "mock-embed"
    }
}

#[async_trait]
impl GenerationBackend for MockInferenceBackend {
    async fn generate(&self, prompt: &str) -> Result<String> {
        if self.should_fail() {
            return Err(Error::Inference("mock generation failure".to_string()));
        }
        self.log_call("generate", prompt);
        Ok(self.respond_to(prompt))
    }

    async fn generate_with_system(&self, _system: &str, prompt: &str) -> Result<String> {
        if self.should_fail() {
            return Err(Error::Inference("mock generation failure".to_string()));
        }
        self.log_call("generate_with_system", prompt);
        Ok(self.respond_to(prompt))
    }

    async fn generate_json(&self, _system: &str, prompt: &str) -> Result<String> {
        if self.should_fail() {
            return Err(Error::Inference("mock generation failure".to_string()));
        }
        self.log_call("generate_json", prompt);
        Ok(self.respond_to(prompt))
    }

    fn model_name(&self) -> &str {
        "mock-gen"
    }
}

#[async_trait]
impl InferenceBackend for MockInferenceBackend {
    async fn health_check(&self) -> Result<bool> {
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_embeddings_are_deterministic() {
        let backend = MockInferenceBackend::new().with_dimension(16);
        let a = backend.embed_texts(&["same text".to_string()]).await.unwrap();
        let b = backend.embed_texts(&["same text".to_string()]).await.unwrap();
        assert_eq!(a[0].as_slice(), b[0].as_slice());
        assert_eq!(a[0].as_slice().len(), 16);
    }

    #[tokio::test]
    async fn test_different_texts_embed_differently() {
        let backend = MockInferenceBackend::new().with_dimension(16);
        let v = backend
            .embed_texts(&["alpha".to_string(), "beta".to_string()])
            .await
            .unwrap();
        assert_ne!(v[0].as_slice(), v[1].as_slice());
    }

    #[tokio::test]
    async fn test_response_mapping_by_substring() {
        let backend = MockInferenceBackend::new()
            .with_fixed_response("fallback")
            .with_response_mapping("classify", r#"{"intent": "analysis"}"#);

        let mapped = backend.generate("please classify this question").await.unwrap();
        assert_eq!(mapped, r#"{"intent": "analysis"}"#);

        let fallback = backend.generate("unrelated prompt").await.unwrap();
        assert_eq!(fallback, "fallback");
    }

    #[tokio::test]
    async fn test_call_log_counts_operations() {
        let backend = MockInferenceBackend::new();
        backend.embed_texts(&["x".to_string()]).await.unwrap();
        backend.generate("y").await.unwrap();
        backend.generate_json("", "z").await.unwrap();

        assert_eq!(backend.embed_call_count(), 1);
        assert_eq!(backend.generate_call_count(), 2);
        assert_eq!(backend.get_calls().len(), 3);
    }

    #[tokio::test]
    async fn test_full_failure_rate_always_errors() {
        let backend = MockInferenceBackend::new().with_failure_rate(1.0);
        assert!(backend.generate("x").await.is_err());
        assert!(backend.embed_texts(&["x".to_string()]).await.is_err());
    }
}
