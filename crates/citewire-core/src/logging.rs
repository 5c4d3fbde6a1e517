//! Structured logging schema and field name constants for citewire.
//!
//! All crates use these constants for consistent structured logging fields,
//! so log aggregation tools can query by standardized names across every
//! subsystem.
//!
//! ## Log Level Contract
//!
//! | Level | Usage |
//! |-------|-------|
//! | ERROR | Degraded service, requires operator attention |
//! | WARN  | Recoverable issue, automatic fallback applied |
//! | INFO  | Lifecycle events, turn completions |
//! | DEBUG | Decision points, intermediate values, config choices |
//! | TRACE | Per-item iteration, high-volume data (candidates, claims) |

// ─── Identity fields ───────────────────────────────────────────────────────

/// Conversation thread UUID propagated across a turn.
pub const THREAD_ID: &str = "thread_id";

/// Subsystem originating the log event.
/// Values: "search", "db", "inference", "agents"
pub const SUBSYSTEM: &str = "subsystem";

/// Component within a subsystem.
/// Examples: "hybrid_search", "rrf_fusion", "supervisor", "analysis_agent"
pub const COMPONENT: &str = "component";

/// Logical operation name.
/// Examples: "search", "embed_texts", "generate", "run_turn"
pub const OPERATION: &str = "op";

// ─── Entity fields ─────────────────────────────────────────────────────────

/// Article UUID being operated on.
pub const ARTICLE_ID: &str = "article_id";

/// Search query text.
pub const QUERY: &str = "query";

/// Detected query intent ("retrieval", "analysis").
pub const INTENT: &str = "intent";

/// Lookback window in days.
pub const LOOKBACK_DAYS: &str = "lookback_days";

// ─── Measurement fields ────────────────────────────────────────────────────

/// Wall-clock duration in milliseconds.
pub const DURATION_MS: &str = "duration_ms";

/// Number of results returned by a search or query.
pub const RESULT_COUNT: &str = "result_count";

/// Byte length of a prompt or response.
pub const PROMPT_LEN: &str = "prompt_len";

/// Byte length of a model response.
pub const RESPONSE_LEN: &str = "response_len";

// ─── Search-specific fields ────────────────────────────────────────────────

/// Number of vector hits before fusion.
pub const VECTOR_HITS: &str = "vector_hits";

/// Number of lexical hits before fusion.
pub const LEXICAL_HITS: &str = "lexical_hits";

/// RRF k parameter.
pub const RRF_K: &str = "rrf_k";

/// Confidence level assigned to a result set ("none".."high").
pub const CONFIDENCE: &str = "confidence";

// ─── Pipeline fields ───────────────────────────────────────────────────────

/// Retrieval retries used within a turn.
pub const RETRIES_USED: &str = "retries_used";

/// Citations added by the claim evidence finder.
pub const CITATIONS_ADDED: &str = "citations_added";

/// Number of uncited claims found.
pub const CLAIM_COUNT: &str = "claim_count";

/// Whether a cache lookup hit.
pub const CACHE_HIT: &str = "cache_hit";

// ─── Inference fields ──────────────────────────────────────────────────────

/// Model name used for inference.
pub const MODEL: &str = "model";

// ─── Outcome fields ────────────────────────────────────────────────────────

/// Boolean success/failure indicator.
pub const SUCCESS: &str = "success";

/// Error message when an operation fails.
pub const ERROR_MSG: &str = "error";
