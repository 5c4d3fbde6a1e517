//! Search candidate types flowing through the hybrid retrieval pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Position of a chunk within its article. Summary chunks condense the whole
/// article and carry the strongest prior; body chunks the weakest.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkKind {
    Summary,
    Intro,
    #[default]
    Body,
}

impl ChunkKind {
    /// Prior used by the reranker.
    pub fn prior(&self) -> f32 {
        match self {
            Self::Summary => 1.0,
            Self::Intro => 0.7,
            Self::Body => 0.5,
        }
    }
}

impl std::str::FromStr for ChunkKind {
    type Err = String;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(Self::Summary),
            "intro" => Ok(Self::Intro),
            "body" => Ok(Self::Body),
            _ => Err(format!("Invalid chunk kind: {}", s)),
        }
    }
}

/// One ranked row returned by a vector or lexical index adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkHit {
    pub chunk_id: Uuid,
    pub article_id: Uuid,
    pub content: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub kind: ChunkKind,
    /// Cosine similarity (vector) or ts_rank (lexical). Only comparable
    /// within one modality; fusion goes by rank, not magnitude.
    pub score: f32,
}

/// Per-signal components of a reranked score.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub rrf: f32,
    pub title_overlap: f32,
    pub content_overlap: f32,
    pub recency: f32,
    pub chunk_kind: f32,
}

/// A fused search candidate. Produced by hybrid search, rescored by the
/// reranker, deduplicated to one candidate per article downstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchCandidate {
    pub chunk_id: Uuid,
    pub article_id: Uuid,
    pub content: String,
    pub title: String,
    pub url: String,
    pub source_name: String,
    pub published_at: DateTime<Utc>,
    pub kind: ChunkKind,
    /// Cosine similarity when the chunk appeared in the vector list.
    pub vector_similarity: Option<f32>,
    /// 0-based rank when the chunk appeared in the lexical list.
    pub lexical_rank: Option<usize>,
    /// Reciprocal Rank Fusion score.
    pub rrf_score: f32,
    /// Weighted final score; zero until the reranker runs.
    pub final_score: f32,
    /// Signal components behind `final_score`.
    pub breakdown: Option<ScoreBreakdown>,
}

impl SearchCandidate {
    /// Build a candidate from an adapter hit with no fusion data yet.
    pub fn from_hit(hit: ChunkHit) -> Self {
        Self {
            chunk_id: hit.chunk_id,
            article_id: hit.article_id,
            content: hit.content,
            title: hit.title,
            url: hit.url,
            source_name: hit.source_name,
            published_at: hit.published_at,
            kind: hit.kind,
            vector_similarity: None,
            lexical_rank: None,
            rrf_score: 0.0,
            final_score: 0.0,
            breakdown: None,
        }
    }
}
