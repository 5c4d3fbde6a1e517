//! Reciprocal Rank Fusion (RRF) for combining vector and lexical results.

use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use citewire_core::defaults::RRF_K;
use citewire_core::{ChunkHit, SearchCandidate};

/// Fuse a vector-ranked list and a lexical-ranked list into one candidate
/// set using Reciprocal Rank Fusion.
///
/// Each input is ranked best-first. Every appearance contributes
/// `1 / (K + rank + 1)` to the chunk's fused score, so a chunk found by both
/// modalities always outranks the same chunk found by one. Rank is all that
/// matters, never the incomparable raw score magnitudes.
///
/// Scores are kept raw (not normalized to 0-1): downstream confidence
/// thresholds are calibrated against the reranker's realistic output range,
/// and single-list normalization would inflate weak result sets.
pub fn rrf_fuse(vector_hits: Vec<ChunkHit>, lexical_hits: Vec<ChunkHit>) -> Vec<SearchCandidate> {
    let mut fused: HashMap<Uuid, SearchCandidate> = HashMap::new();

    for (rank, hit) in vector_hits.into_iter().enumerate() {
        let similarity = hit.score;
        let candidate = fused
            .entry(hit.chunk_id)
            .or_insert_with(|| SearchCandidate::from_hit(hit));
        candidate.vector_similarity = Some(similarity);
        candidate.rrf_score += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    for (rank, hit) in lexical_hits.into_iter().enumerate() {
        let candidate = fused
            .entry(hit.chunk_id)
            .or_insert_with(|| SearchCandidate::from_hit(hit));
        candidate.lexical_rank = Some(rank);
        candidate.rrf_score += 1.0 / (RRF_K + rank as f32 + 1.0);
    }

    let mut results: Vec<SearchCandidate> = fused.into_values().collect();
    results.sort_by(|a, b| {
        b.rrf_score
            .partial_cmp(&a.rrf_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    debug!(
        rrf_k = RRF_K,
        result_count = results.len(),
        "RRF fusion complete"
    );

    results
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use citewire_core::ChunkKind;

    fn hit(chunk_id: Uuid, score: f32) -> ChunkHit {
        ChunkHit {
            chunk_id,
            article_id: Uuid::new_v4(),
            content: "content".to_string(),
            title: "title".to_string(),
            url: "https://example.com".to_string(),
            source_name: "wire".to_string(),
            published_at: Utc::now(),
            kind: ChunkKind::Body,
            score,
        }
    }

    #[test]
    fn test_fuse_empty_lists() {
        let results = rrf_fuse(Vec::new(), Vec::new());
        assert!(results.is_empty());
    }

    #[test]
    fn test_fuse_single_list_preserves_order() {
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();
        let results = rrf_fuse(vec![hit(a, 0.9), hit(b, 0.7)], Vec::new());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].chunk_id, a);
        assert!(results[0].rrf_score > results[1].rrf_score);
        assert_eq!(results[0].vector_similarity, Some(0.9));
        assert_eq!(results[0].lexical_rank, None);
    }

    #[test]
    fn test_fuse_both_lists_marks_modalities() {
        let a = Uuid::new_v4();
        let results = rrf_fuse(vec![hit(a, 0.8)], vec![hit(a, 3.2)]);
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].vector_similarity, Some(0.8));
        assert_eq!(results[0].lexical_rank, Some(0));
    }

    #[test]
    fn test_rrf_monotonicity_dual_appearance_beats_single() {
        // `both` sits at rank 1 in each list; `single` sits at rank 1 in one
        // list. Appearing in both lists must never rank lower.
        let both = Uuid::new_v4();
        let single = Uuid::new_v4();
        let top_v = Uuid::new_v4();
        let top_l = Uuid::new_v4();

        let results = rrf_fuse(
            vec![hit(top_v, 0.9), hit(both, 0.8)],
            vec![hit(top_l, 5.0), hit(both, 4.0), hit(single, 3.0)],
        );

        let score_of = |id: Uuid| results.iter().find(|c| c.chunk_id == id).unwrap().rrf_score;
        assert!(score_of(both) >= score_of(single));
        // Same-rank single appearances can't beat a dual appearance either.
        assert!(score_of(both) > score_of(top_v));
        assert!(score_of(both) > score_of(top_l));
    }

    #[test]
    fn test_fuse_score_values() {
        let a = Uuid::new_v4();
        let results = rrf_fuse(vec![hit(a, 0.9)], vec![hit(a, 1.0)]);
        // Rank 0 in both lists: 2 / (K + 1).
        let expected = 2.0 / (RRF_K + 1.0);
        assert!((results[0].rrf_score - expected).abs() < 1e-6);
    }

    #[test]
    fn test_fuse_sorted_descending() {
        let hits: Vec<ChunkHit> = (0..10).map(|i| hit(Uuid::new_v4(), 1.0 - i as f32 * 0.05)).collect();
        let results = rrf_fuse(hits, Vec::new());
        for pair in results.windows(2) {
            assert!(pair[0].rrf_score >= pair[1].rrf_score);
        }
    }
}
