//! Hybrid retrieval over the article corpus.
//!
//! Pipeline: vector + lexical search run concurrently, fused with
//! Reciprocal Rank Fusion ([`rrf`]), rescored and deduplicated by the
//! [`rerank`] pass, then classified by the [`confidence`] assessor
//! which gates downstream LLM use.

pub mod confidence;
pub mod hybrid;
pub mod rerank;
pub mod rrf;

pub use confidence::{assess, ConfidenceAssessment, ConfidenceLevel};
pub use hybrid::{HybridSearchConfig, HybridSearchEngine};
pub use rerank::{rerank, RerankWeights};
pub use rrf::rrf_fuse;
