//! Trait seams between the pipeline and its external collaborators.
//!
//! The embedding/LLM providers, the corpus indexes, and the persistent
//! stores are consumed through these narrow contracts; concrete adapters
//! live in `citewire-db` and `citewire-inference`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{Article, ArticleInsight, ConversationTurn};
use crate::search::ChunkHit;
use crate::Result;

/// Re-exported pgvector vector type used for embeddings.
pub type Vector = pgvector::Vector;

// =============================================================================
// INFERENCE BACKENDS
// =============================================================================

/// Backend for embedding generation.
#[async_trait]
pub trait EmbeddingBackend: Send + Sync {
    /// Generate embeddings for the given texts, one vector per input.
    async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>>;

    /// Get the expected dimension of embedding vectors.
    fn dimension(&self) -> usize;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Backend for text generation (LLM).
#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Generate text given a prompt.
    async fn generate(&self, prompt: &str) -> Result<String>;

    /// Generate text with system context.
    async fn generate_with_system(&self, system: &str, prompt: &str) -> Result<String>;

    /// Generate with JSON format enforcement for structured output.
    async fn generate_json(&self, system: &str, prompt: &str) -> Result<String>;

    /// Get the model name being used.
    fn model_name(&self) -> &str;
}

/// Combined inference backend supporting both embedding and generation.
#[async_trait]
pub trait InferenceBackend: EmbeddingBackend + GenerationBackend {
    /// Check if the backend is available and responding.
    async fn health_check(&self) -> Result<bool>;
}

// =============================================================================
// CORPUS INDEXES
// =============================================================================

/// Semantic search over chunk embeddings.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    /// Cosine-similarity search, threshold-filtered and optionally bounded
    /// to chunks published after `published_after`.
    async fn search(
        &self,
        embedding: &Vector,
        min_similarity: f32,
        published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>>;
}

/// Keyword search over chunk text.
#[async_trait]
pub trait LexicalIndex: Send + Sync {
    /// Rank chunks matching any of `terms` (OR semantics) by text-search
    /// relevance. Implementations degrade to an empty result set when the
    /// text-search index is unavailable.
    async fn search(
        &self,
        terms: &[String],
        published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>>;
}

// =============================================================================
// PERSISTENT STORES
// =============================================================================

/// Article and insight persistence.
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Fetch all articles published after `since`, oldest first, with any
    /// pre-computed insight fields populated.
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Article>>;

    /// Count articles published after `since`. Used as the analysis-cache
    /// staleness guard.
    async fn count_window(&self, since: DateTime<Utc>) -> Result<i64>;

    /// Idempotently persist insight fields for an article.
    async fn upsert_insight(&self, article_id: Uuid, insight: &ArticleInsight) -> Result<()>;
}

/// Conversation turn log, append-only per thread.
#[async_trait]
pub trait ConversationRepository: Send + Sync {
    /// Append a turn to a thread.
    async fn append_turn(&self, thread_id: Uuid, turn: &ConversationTurn) -> Result<()>;

    /// Fetch the most recent `limit` turns for a thread, oldest first.
    async fn last_turns(&self, thread_id: Uuid, limit: i64) -> Result<Vec<ConversationTurn>>;
}
