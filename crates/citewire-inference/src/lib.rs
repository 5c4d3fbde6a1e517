//! # citewire-inference
//!
//! LLM inference backend abstraction for citewire.
//!
//! This crate provides:
//! - The Ollama implementation of the embedding and generation traits
//! - Structured (JSON) completions with repair and bounded retry
//! - A deterministic mock backend for tests (feature `mock`)
//!
//! # Example
//!
//! ```rust,no_run
//! use citewire_inference::OllamaBackend;
//! use citewire_core::EmbeddingBackend;
//!
//! #[tokio::main]
//! async fn main() {
//!     let backend = OllamaBackend::from_env();
//!     let texts = vec!["Hello".to_string()];
//!     let embeddings = backend.embed_texts(&texts).await.unwrap();
//! }
//! ```

pub mod json_repair;
pub mod ollama;
pub mod structured;

// Mock inference backend for testing
#[cfg(any(test, feature = "mock"))]
pub mod mock;

pub use json_repair::repair_json;
pub use ollama::OllamaBackend;
pub use structured::complete_structured;

#[cfg(any(test, feature = "mock"))]
pub use mock::MockInferenceBackend;
