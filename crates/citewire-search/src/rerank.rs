//! Candidate rescoring over fused search results.
//!
//! The fused RRF score only encodes rank agreement between the two
//! retrieval modalities. Reranking folds in query term overlap, publish
//! recency, and the chunk-type prior, then deduplicates to one chunk per
//! article so callers get a single representative quote per source.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tracing::{debug, instrument};
use uuid::Uuid;

use citewire_core::defaults::RERANK_TOP_K;
use citewire_core::text::search_terms;
use citewire_core::{ScoreBreakdown, SearchCandidate};

/// Weights for the five rerank signals. Must be tuned together; the
/// confidence thresholds assume the defaults' output range.
#[derive(Debug, Clone, Copy)]
pub struct RerankWeights {
    pub rrf: f32,
    pub title_overlap: f32,
    pub content_overlap: f32,
    pub recency: f32,
    pub chunk_kind: f32,
}

impl Default for RerankWeights {
    fn default() -> Self {
        Self {
            rrf: 0.35,
            title_overlap: 0.25,
            content_overlap: 0.15,
            recency: 0.15,
            chunk_kind: 0.10,
        }
    }
}

/// Rescore fused candidates against the query, deduplicate by article,
/// and return the top-K ordered by final score descending.
#[instrument(skip(candidates, weights), fields(
    subsystem = "search",
    component = "reranker",
    op = "rerank",
    candidate_count = candidates.len(),
))]
pub fn rerank(
    query: &str,
    candidates: Vec<SearchCandidate>,
    weights: &RerankWeights,
) -> Vec<SearchCandidate> {
    let terms = search_terms(query);
    let now = Utc::now();

    let mut scored: Vec<SearchCandidate> = candidates
        .into_iter()
        .map(|mut c| {
            let breakdown = ScoreBreakdown {
                rrf: c.rrf_score,
                title_overlap: term_overlap(&terms, &c.title),
                content_overlap: term_overlap(&terms, &c.content),
                recency: recency_score(c.published_at, now),
                chunk_kind: c.kind.prior(),
            };
            c.final_score = weights.rrf * breakdown.rrf
                + weights.title_overlap * breakdown.title_overlap
                + weights.content_overlap * breakdown.content_overlap
                + weights.recency * breakdown.recency
                + weights.chunk_kind * breakdown.chunk_kind;
            c.breakdown = Some(breakdown);
            c
        })
        .collect();

    // One chunk per article, keep the best.
    let mut best: HashMap<Uuid, SearchCandidate> = HashMap::new();
    for c in scored.drain(..) {
        match best.get(&c.article_id) {
            Some(existing) if existing.final_score >= c.final_score => {}
            _ => {
                best.insert(c.article_id, c);
            }
        }
    }

    let mut results: Vec<SearchCandidate> = best.into_values().collect();
    results.sort_by(|a, b| {
        b.final_score
            .partial_cmp(&a.final_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    results.truncate(RERANK_TOP_K);

    debug!(result_count = results.len(), "Reranking completed");
    results
}

/// Fraction of query terms that appear in the text, case-insensitive.
fn term_overlap(terms: &[String], text: &str) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    let haystack = text.to_lowercase();
    let matched = terms.iter().filter(|t| haystack.contains(t.as_str())).count();
    matched as f32 / terms.len() as f32
}

/// Step-function recency decay over article age.
fn recency_score(published_at: DateTime<Utc>, now: DateTime<Utc>) -> f32 {
    let age_hours = (now - published_at).num_hours();
    if age_hours < 24 {
        1.0
    } else if age_hours < 72 {
        0.7
    } else if age_hours < 168 {
        0.4
    } else {
        0.2
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use citewire_core::ChunkKind;

    fn candidate(
        article_id: Uuid,
        title: &str,
        content: &str,
        kind: ChunkKind,
        age_hours: i64,
        rrf_score: f32,
    ) -> SearchCandidate {
        SearchCandidate {
            chunk_id: Uuid::new_v4(),
            article_id,
            content: content.to_string(),
            title: title.to_string(),
            url: format!("https://example.com/{}", article_id),
            source_name: "wire".to_string(),
            published_at: Utc::now() - Duration::hours(age_hours),
            kind,
            vector_similarity: Some(0.5),
            lexical_rank: None,
            rrf_score,
            final_score: 0.0,
            breakdown: None,
        }
    }

    #[test]
    fn test_recency_steps() {
        let now = Utc::now();
        assert_eq!(recency_score(now - Duration::hours(1), now), 1.0);
        assert_eq!(recency_score(now - Duration::hours(48), now), 0.7);
        assert_eq!(recency_score(now - Duration::hours(100), now), 0.4);
        assert_eq!(recency_score(now - Duration::hours(500), now), 0.2);
    }

    #[test]
    fn test_term_overlap_ratio() {
        let terms = vec!["bitcoin".to_string(), "etf".to_string()];
        assert_eq!(term_overlap(&terms, "Bitcoin ETF approved"), 1.0);
        assert_eq!(term_overlap(&terms, "Bitcoin rally continues"), 0.5);
        assert_eq!(term_overlap(&terms, "Ethereum upgrade"), 0.0);
        assert_eq!(term_overlap(&[], "anything"), 0.0);
    }

    #[test]
    fn test_title_match_outranks_stale_body() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let candidates = vec![
            candidate(a, "Bitcoin ETF inflows surge", "inflow details", ChunkKind::Summary, 2, 0.02),
            candidate(b, "Market roundup", "various assets moved", ChunkKind::Body, 400, 0.02),
        ];
        let results = rerank("bitcoin etf inflows", candidates, &RerankWeights::default());
        assert_eq!(results[0].article_id, a);
        let top = results[0].breakdown.as_ref().unwrap();
        assert!(top.title_overlap > 0.9);
    }

    #[test]
    fn test_dedup_keeps_best_chunk_per_article() {
        let a = Uuid::new_v4();
        let candidates = vec![
            candidate(a, "Bitcoin ETF", "bitcoin etf inflows detail", ChunkKind::Summary, 2, 0.03),
            candidate(a, "Bitcoin ETF", "unrelated closing remarks", ChunkKind::Body, 2, 0.01),
        ];
        let results = rerank("bitcoin etf", candidates, &RerankWeights::default());
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].kind, ChunkKind::Summary);
    }

    #[test]
    fn test_no_duplicate_article_ids_in_output() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let candidates = vec![
            candidate(a, "t", "c", ChunkKind::Body, 2, 0.02),
            candidate(a, "t", "c", ChunkKind::Intro, 2, 0.02),
            candidate(b, "t", "c", ChunkKind::Body, 2, 0.02),
        ];
        let results = rerank("query terms", candidates, &RerankWeights::default());
        let mut ids: Vec<Uuid> = results.iter().map(|c| c.article_id).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), results.len());
    }

    #[test]
    fn test_breakdown_sums_to_final_score() {
        let candidates = vec![candidate(
            Uuid::new_v4(),
            "Bitcoin ETF",
            "bitcoin etf content",
            ChunkKind::Intro,
            30,
            0.025,
        )];
        let w = RerankWeights::default();
        let results = rerank("bitcoin etf", candidates, &w);
        let c = &results[0];
        let bd = c.breakdown.as_ref().unwrap();
        let expected = w.rrf * bd.rrf
            + w.title_overlap * bd.title_overlap
            + w.content_overlap * bd.content_overlap
            + w.recency * bd.recency
            + w.chunk_kind * bd.chunk_kind;
        assert!((c.final_score - expected).abs() < 1e-6);
    }
}
