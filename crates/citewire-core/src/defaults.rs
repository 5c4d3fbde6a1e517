//! Centralized default constants for citewire.
//!
//! **This module is the single source of truth** for all shared default
//! values. All crates reference these constants instead of defining their own
//! magic numbers.
//!
//! Organized by domain area. When adding new constants, place them in the
//! appropriate section and document the rationale for the chosen value.

// =============================================================================
// EMBEDDING / GENERATION
// =============================================================================

/// Default Ollama endpoint.
pub const OLLAMA_URL: &str = "http://localhost:11434";

/// Default embedding model name (Ollama).
pub const EMBED_MODEL: &str = "nomic-embed-text";

/// Default embedding vector dimension for nomic-embed-text.
pub const EMBED_DIMENSION: usize = 768;

/// Default generation model.
pub const GEN_MODEL: &str = "llama3.1:8b";

/// Timeout for embedding requests (seconds).
pub const EMBED_TIMEOUT_SECS: u64 = 60;

/// Timeout for generation requests (seconds).
pub const GEN_TIMEOUT_SECS: u64 = 120;

/// Retries for structured-output generation after a failed parse+repair.
pub const STRUCTURED_RETRIES: u32 = 2;

/// Base backoff between structured-output retries (milliseconds, doubled per attempt).
pub const STRUCTURED_BACKOFF_MS: u64 = 500;

// =============================================================================
// SEARCH
// =============================================================================

/// RRF constant. K=60 is the Cormack et al. (2009) default; rank alone
/// decides fusion, so absolute score magnitudes of the two modalities never
/// dominate each other.
pub const RRF_K: f32 = 60.0;

/// Minimum cosine similarity for vector hits in the retrieval path.
pub const VECTOR_MIN_SIMILARITY: f32 = 0.3;

/// Lowered similarity floor used by the claim evidence finder to maximize
/// candidate recall before its own match threshold applies.
pub const EVIDENCE_MIN_SIMILARITY: f32 = 0.25;

/// Default number of candidates requested from each search modality.
pub const SEARCH_LIMIT: i64 = 20;

/// Top-K candidates kept after reranking.
pub const RERANK_TOP_K: usize = 8;

// =============================================================================
// CONFIDENCE GATING
// =============================================================================

/// Reranked top score above which a result set can be rated high.
pub const CONFIDENCE_HIGH_TOP: f32 = 0.35;

/// Reranked score a supporting candidate must exceed to count toward
/// high/medium confidence.
pub const CONFIDENCE_SUPPORT: f32 = 0.25;

/// Reranked top score above which a result set is at least medium.
pub const CONFIDENCE_MEDIUM_TOP: f32 = 0.2;

// =============================================================================
// CITATION VALIDATION & REPAIR
// =============================================================================

/// Minimum sentence length (chars) considered a checkable claim.
pub const CLAIM_MIN_SENTENCE_LEN: usize = 20;

/// Sentences longer than this are treated as factual even without numeric or
/// proper-noun markers.
pub const CLAIM_FACTUAL_LEN: usize = 50;

/// Uncited claims tolerated before the validator raises an issue.
pub const UNCITED_CLAIM_TOLERANCE: usize = 2;

/// Confidence penalty per validator issue (mechanical score = 100 - 15n).
pub const ISSUE_PENALTY: u8 = 15;

/// Validation confidence below which a retry/repair is triggered.
pub const VALIDATION_THRESHOLD: u8 = 70;

/// Minimum similarity for a claim match to yield any citation.
pub const CLAIM_MATCH_MIN: f32 = 0.45;

/// Minimum similarity for a claim match to mint a brand-new source.
pub const NEW_SOURCE_MIN: f32 = 0.5;

// =============================================================================
// TURN ORCHESTRATION
// =============================================================================

/// Default lookback window when the query names none.
pub const DEFAULT_LOOKBACK_DAYS: u32 = 7;

/// Maximum retrieval re-runs after a failed validation (1 initial + 1 retry).
pub const MAX_RETRIEVAL_RETRIES: u32 = 1;

/// Conversation turns loaded into the prompt budget.
pub const CONTEXT_MAX_TURNS: i64 = 10;

/// Follow-up classification confidence below which the safe NewQuery default
/// applies.
pub const FOLLOWUP_MIN_CONFIDENCE: f32 = 0.6;

/// Fixed response when confidence gating refuses to invoke generation.
pub const NOT_FOUND_ANSWER: &str =
    "I couldn't find recent articles that answer that. Try rephrasing the \
     question or widening the time window.";

// =============================================================================
// ANALYSIS
// =============================================================================

/// TTL for the query-level and reduce-level analysis caches (seconds).
pub const ANALYSIS_CACHE_TTL_SECS: u64 = 300;

/// Concurrent in-flight insight extractions during the map phase.
pub const INSIGHT_BATCH_CONCURRENCY: usize = 20;

/// Citable sources selected from scored insights.
pub const ANALYSIS_TOP_SOURCES: usize = 5;

/// Trend keywords reported per analysis.
pub const TREND_KEYWORD_COUNT: usize = 5;

/// Days over which insight recency decays linearly to zero.
pub const INSIGHT_RECENCY_DAYS: f32 = 7.0;

/// Word-chunk size for simulated incremental delivery of cached summaries.
pub const DELIVERY_CHUNK_WORDS: usize = 12;
