//! Retrieval confidence assessment.
//!
//! Classifies a reranked result set into a discrete level that gates
//! whether the generation model is invoked at all. Thresholds are
//! calibrated to the reranker's realistic output range (roughly
//! 0.15 to 0.45), not to raw cosine similarity.

use tracing::debug;

use citewire_core::defaults::{CONFIDENCE_HIGH_TOP, CONFIDENCE_MEDIUM_TOP, CONFIDENCE_SUPPORT};
use citewire_core::SearchCandidate;

/// Discrete confidence level for a retrieval result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfidenceLevel {
    None,
    Low,
    Medium,
    High,
}

impl ConfidenceLevel {
    /// True when the generation model may be asked to answer. Low and
    /// None return a fixed not-found response instead, so weak evidence
    /// never reaches the LLM.
    pub fn allows_generation(&self) -> bool {
        matches!(self, Self::Medium | Self::High)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// Confidence level with a banded 0-100 score and an optional caveat
/// for the caller to surface alongside the answer.
#[derive(Debug, Clone)]
pub struct ConfidenceAssessment {
    pub level: ConfidenceLevel,
    pub score: u8,
    pub caveat: Option<String>,
}

/// Assess a reranked, deduplicated candidate list.
pub fn assess(candidates: &[SearchCandidate]) -> ConfidenceAssessment {
    let top = candidates.first().map(|c| c.final_score).unwrap_or(0.0);
    let support = candidates
        .iter()
        .filter(|c| c.final_score > CONFIDENCE_SUPPORT)
        .count();

    let assessment = if candidates.is_empty() {
        ConfidenceAssessment {
            level: ConfidenceLevel::None,
            score: 0,
            caveat: Some("No matching articles were found in the selected window.".to_string()),
        }
    } else if top > CONFIDENCE_HIGH_TOP && support >= 2 {
        ConfidenceAssessment {
            level: ConfidenceLevel::High,
            score: band_score(top, CONFIDENCE_HIGH_TOP, 0.5, 76, 100),
            caveat: None,
        }
    } else if top > CONFIDENCE_MEDIUM_TOP || support >= 1 {
        ConfidenceAssessment {
            level: ConfidenceLevel::Medium,
            score: band_score(top, CONFIDENCE_MEDIUM_TOP, CONFIDENCE_HIGH_TOP, 46, 75),
            caveat: Some("Based on a limited number of closely matching articles.".to_string()),
        }
    } else {
        ConfidenceAssessment {
            level: ConfidenceLevel::Low,
            score: band_score(top, 0.0, CONFIDENCE_MEDIUM_TOP, 1, 45),
            caveat: Some("Evidence is too weak to answer reliably.".to_string()),
        }
    };

    debug!(
        level = assessment.level.as_str(),
        score = assessment.score,
        top_score = top,
        support_count = support,
        "Confidence assessed"
    );
    assessment
}

/// Map a top score into a fixed band with linear interpolation, clamped
/// to the band edges.
fn band_score(top: f32, lo: f32, hi: f32, band_lo: u8, band_hi: u8) -> u8 {
    let span = (hi - lo).max(f32::EPSILON);
    let frac = ((top - lo) / span).clamp(0.0, 1.0);
    let width = (band_hi - band_lo) as f32;
    band_lo + (frac * width).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use citewire_core::ChunkKind;
    use uuid::Uuid;

    fn candidate(final_score: f32) -> SearchCandidate {
        SearchCandidate {
            chunk_id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            content: "content".to_string(),
            title: "title".to_string(),
            url: "https://example.com".to_string(),
            source_name: "wire".to_string(),
            published_at: Utc::now(),
            kind: ChunkKind::Body,
            vector_similarity: None,
            lexical_rank: None,
            rrf_score: 0.0,
            final_score,
            breakdown: None,
        }
    }

    #[test]
    fn test_empty_results_are_none() {
        let a = assess(&[]);
        assert_eq!(a.level, ConfidenceLevel::None);
        assert_eq!(a.score, 0);
        assert!(a.caveat.is_some());
        assert!(!a.level.allows_generation());
    }

    #[test]
    fn test_strong_top_with_support_is_high() {
        let a = assess(&[candidate(0.4), candidate(0.3), candidate(0.26)]);
        assert_eq!(a.level, ConfidenceLevel::High);
        assert!(a.score >= 76);
        assert!(a.level.allows_generation());
    }

    #[test]
    fn test_strong_top_without_support_is_medium() {
        // Top exceeds the high threshold but only one candidate clears
        // the support bar.
        let a = assess(&[candidate(0.4), candidate(0.1)]);
        assert_eq!(a.level, ConfidenceLevel::Medium);
        assert!((46..=75).contains(&a.score));
    }

    #[test]
    fn test_moderate_top_is_medium() {
        let a = assess(&[candidate(0.22), candidate(0.1)]);
        assert_eq!(a.level, ConfidenceLevel::Medium);
        assert!(a.level.allows_generation());
    }

    #[test]
    fn test_single_supporting_candidate_is_medium() {
        // Top below the medium threshold is still medium when one
        // candidate exceeds the support bar. Not reachable with a
        // sorted list, but the rule is an OR.
        let a = assess(&[candidate(0.26)]);
        assert_eq!(a.level, ConfidenceLevel::Medium);
    }

    #[test]
    fn test_weak_results_are_low() {
        let a = assess(&[candidate(0.15), candidate(0.1)]);
        assert_eq!(a.level, ConfidenceLevel::Low);
        assert!((1..=45).contains(&a.score));
        assert!(!a.level.allows_generation());
    }

    #[test]
    fn test_band_score_clamps() {
        assert_eq!(band_score(0.9, 0.35, 0.5, 76, 100), 100);
        assert_eq!(band_score(0.0, 0.35, 0.5, 76, 100), 76);
    }
}
