//! Domain types shared across the citewire pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// =============================================================================
// QUERY
// =============================================================================

/// Detected intent of an incoming question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryIntent {
    /// Specific facts answerable from a handful of passages.
    #[default]
    Retrieval,
    /// Trend/sentiment/synthesis across many articles.
    Analysis,
}

impl std::fmt::Display for QueryIntent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retrieval => write!(f, "retrieval"),
            Self::Analysis => write!(f, "analysis"),
        }
    }
}

/// A classified question, immutable once built for the turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    /// Raw text as received.
    pub raw: String,
    /// Sanitized text used for search.
    pub sanitized: String,
    /// Detected intent.
    pub intent: QueryIntent,
    /// Resolved lookback window in days.
    pub lookback_days: u32,
    /// Rewritten text when the message was a follow-up refinement.
    pub refined: Option<String>,
}

impl Query {
    /// The text search and prompts should operate on: the refinement when one
    /// exists, otherwise the sanitized original.
    pub fn effective_text(&self) -> &str {
        self.refined.as_deref().unwrap_or(&self.sanitized)
    }
}

// =============================================================================
// ARTICLES
// =============================================================================

/// Per-article sentiment label.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SentimentLabel {
    Bullish,
    Bearish,
    #[default]
    Neutral,
}

impl std::fmt::Display for SentimentLabel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bullish => write!(f, "bullish"),
            Self::Bearish => write!(f, "bearish"),
            Self::Neutral => write!(f, "neutral"),
        }
    }
}

impl std::str::FromStr for SentimentLabel {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "bullish" => Ok(Self::Bullish),
            "bearish" => Ok(Self::Bearish),
            "neutral" => Ok(Self::Neutral),
            _ => Err(format!("Invalid sentiment label: {}", s)),
        }
    }
}

/// Extracted insight for one article. Article text is immutable, so an
/// insight, once persisted, never changes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArticleInsight {
    pub sentiment: SentimentLabel,
    pub key_points: Vec<String>,
    pub entities: Vec<String>,
    /// True when served from the persistent insight store rather than a
    /// fresh LLM extraction.
    #[serde(default)]
    pub from_cache: bool,
}

/// An ingested news article, with its insight when one has been computed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: Uuid,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub content: String,
    pub insight: Option<ArticleInsight>,
}

// =============================================================================
// SOURCES & OUTPUTS
// =============================================================================

/// A citable source. Referenced from prose by ordinal position
/// (`[Source N]`), so a source list is append-only once citations exist.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Source {
    pub title: String,
    pub url: String,
    pub published_at: DateTime<Utc>,
    /// Representative quote backing the citation.
    pub quote: String,
    /// Relevance in 0.0-1.0.
    pub relevance: f32,
}

/// Observability counters for one retrieval attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RetrievalMetrics {
    pub vector_hits: usize,
    pub lexical_hits: usize,
    pub candidates_reranked: usize,
    pub top_score: f32,
}

/// Output of one retrieval attempt. Replaced, never mutated, on retry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalOutput {
    /// Answer text with `[Source N]` markers.
    pub summary: String,
    /// Ordered source list the markers index into.
    pub sources: Vec<Source>,
    pub citation_count: usize,
    pub metrics: Option<RetrievalMetrics>,
}

/// Mechanical citation-integrity verdict, derived from a RetrievalOutput or
/// AnalysisOutput and never persisted independently of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationOutput {
    /// 0-100 integer confidence.
    pub confidence: u8,
    /// `confidence >= 70`.
    pub is_valid: bool,
    pub issues: Vec<String>,
    pub citations_valid: usize,
    pub citations_total: usize,
}

/// Sentiment distribution across analyzed articles.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SentimentBreakdown {
    pub bullish_pct: f32,
    pub bearish_pct: f32,
    pub neutral_pct: f32,
    pub overall: SentimentLabel,
}

/// Output of the map-reduce analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisOutput {
    pub summary: String,
    pub sentiment: SentimentBreakdown,
    pub trends: Vec<String>,
    pub articles_analyzed: usize,
    /// Articles whose insight came from the persistent store.
    pub articles_cached: usize,
    /// Articles that needed a fresh LLM extraction.
    pub articles_new: usize,
    /// Heuristic 0-100 confidence, independent of citation validation.
    pub confidence: u8,
    pub sources: Vec<Source>,
    pub citation_count: usize,
}

// =============================================================================
// CLAIM REPAIR
// =============================================================================

/// How a repaired claim was bound to the source list (1-based ordinals).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClaimSourceRef {
    /// Cited against an existing source's ordinal.
    Existing(usize),
    /// Cited against a newly appended source.
    New(usize),
    /// No sufficiently similar evidence was found.
    None,
}

/// Best evidence found for one uncited claim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClaimMatch {
    pub claim: String,
    pub article_id: Option<Uuid>,
    pub title: Option<String>,
    pub url: Option<String>,
    pub quote: Option<String>,
    pub similarity: f32,
    pub source_ref: ClaimSourceRef,
}

// =============================================================================
// CONVERSATION
// =============================================================================

/// Role of a conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnRole {
    User,
    Assistant,
}

/// One logged turn in a conversation thread.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: TurnRole,
    pub content: String,
    /// Sources cited by an assistant turn, kept so a clarification can be
    /// answered without a new search.
    pub sources: Option<Vec<Source>>,
    pub created_at: DateTime<Utc>,
}

/// Bounded conversation context read at turn start.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConversationContext {
    pub thread_id: Option<Uuid>,
    /// Oldest-first, bounded to the most recent N turns.
    pub turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    /// Sources stored with the most recent assistant turn, if any.
    pub fn last_assistant_sources(&self) -> Option<&[Source]> {
        self.turns
            .iter()
            .rev()
            .find(|t| t.role == TurnRole::Assistant)
            .and_then(|t| t.sources.as_deref())
    }

    /// Content of the first user turn; used to recover the topic of an
    /// implicit refinement.
    pub fn first_user_content(&self) -> Option<&str> {
        self.turns
            .iter()
            .find(|t| t.role == TurnRole::User)
            .map(|t| t.content.as_str())
    }
}

// =============================================================================
// EXTERNAL RESPONSE
// =============================================================================

/// Metadata attached to a finished turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseMetadata {
    pub retries_used: u32,
    pub timestamp: DateTime<Utc>,
}

/// The externally visible answer for one turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FinalResponse {
    pub answer: String,
    pub sources: Vec<Source>,
    pub confidence: u8,
    pub validated: bool,
    pub metadata: ResponseMetadata,
}

/// Progress event streamed to the transport layer while a turn runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AnswerEvent {
    /// Human-readable stage marker ("searching", "validating", ...).
    Status { message: String },
    /// Source list, emitted once it is stable for the turn.
    Sources { sources: Vec<Source> },
    /// Incremental answer text.
    Delta { text: String },
    /// Terminal event.
    Final { response: FinalResponse },
}
