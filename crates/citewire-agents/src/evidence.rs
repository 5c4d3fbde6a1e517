//! Claim evidence finder: backfill citations for uncited factual claims.

use std::sync::Arc;

use futures::future::join_all;
use regex::Regex;
use tracing::{debug, info, instrument, warn};

use citewire_core::defaults::{
    CLAIM_FACTUAL_LEN, CLAIM_MATCH_MIN, CLAIM_MIN_SENTENCE_LEN, EVIDENCE_MIN_SIMILARITY,
    NEW_SOURCE_MIN,
};
use citewire_core::text::{
    has_citation_marker, looks_factual, split_sentences, starts_with_transition,
};
use citewire_core::{ClaimMatch, ClaimSourceRef, SearchCandidate, Source};
use citewire_search::hybrid::{HybridSearchConfig, HybridSearchEngine};
use citewire_search::rerank::{rerank, RerankWeights};

/// Result of one repair pass over an answer.
#[derive(Debug, Clone)]
pub struct RepairResult {
    /// Answer text with any injected markers.
    pub answer: String,
    pub citations_added: usize,
    /// Sources appended after the existing list, in ordinal order.
    pub new_sources: Vec<Source>,
    /// Per-claim evidence decisions, for observability.
    pub matches: Vec<ClaimMatch>,
}

/// Fan-out searcher that repairs uncited claims against the corpus.
pub struct ClaimEvidenceFinder {
    search: Arc<HybridSearchEngine>,
}

impl ClaimEvidenceFinder {
    pub fn new(search: Arc<HybridSearchEngine>) -> Self {
        Self { search }
    }

    /// Attempt to backfill citations for every uncited factual claim.
    ///
    /// All claims are searched concurrently; one claim's search failure
    /// yields "no match" for that claim only. Citation injection is a
    /// best-effort textual patch: a paraphrased claim that no longer
    /// occurs literally in the answer is silently left uncited.
    #[instrument(skip(self, answer, sources), fields(
        subsystem = "agents",
        component = "evidence",
        op = "repair",
        source_count = sources.len(),
    ))]
    pub async fn repair(&self, answer: &str, sources: &[Source]) -> RepairResult {
        let claims = extract_uncited_claims(answer);
        if claims.is_empty() {
            return RepairResult {
                answer: answer.to_string(),
                citations_added: 0,
                new_sources: Vec::new(),
                matches: Vec::new(),
            };
        }
        debug!(claim_count = claims.len(), "Searching evidence for uncited claims");

        let searches = claims.iter().map(|claim| self.best_evidence(claim));
        let evidence: Vec<Option<SearchCandidate>> = join_all(searches).await;

        let mut patched = answer.to_string();
        let mut new_sources: Vec<Source> = Vec::new();
        let mut matches = Vec::new();
        let mut citations_added = 0;

        for (claim, best) in claims.iter().zip(evidence) {
            let m = self.bind_claim(claim, best, sources, &mut new_sources);
            let ordinal = match m.source_ref {
                ClaimSourceRef::Existing(n) | ClaimSourceRef::New(n) => Some(n),
                ClaimSourceRef::None => None,
            };
            if let Some(n) = ordinal {
                if inject_citation(&mut patched, claim, n) {
                    citations_added += 1;
                } else {
                    debug!(ordinal = n, "Claim text not found literally, citation not injected");
                }
            }
            matches.push(m);
        }

        info!(
            claim_count = claims.len(),
            citations_added,
            new_source_count = new_sources.len(),
            "Citation repair pass finished"
        );

        RepairResult {
            answer: patched,
            citations_added,
            new_sources,
            matches,
        }
    }

    /// Best deduplicated corpus match for one claim. Errors are isolated
    /// into `None`.
    async fn best_evidence(&self, claim: &str) -> Option<SearchCandidate> {
        let config = HybridSearchConfig::default().with_min_similarity(EVIDENCE_MIN_SIMILARITY);
        match self.search.search(claim, &config).await {
            Ok(candidates) => rerank(claim, candidates, &RerankWeights::default())
                .into_iter()
                .next(),
            Err(e) => {
                warn!(error_msg = %e, "Evidence search failed for claim, treating as no match");
                None
            }
        }
    }

    /// Decide how a claim's best evidence binds to the source list.
    fn bind_claim(
        &self,
        claim: &str,
        best: Option<SearchCandidate>,
        sources: &[Source],
        new_sources: &mut Vec<Source>,
    ) -> ClaimMatch {
        let no_match = |claim: &str, similarity: f32| ClaimMatch {
            claim: claim.to_string(),
            article_id: None,
            title: None,
            url: None,
            quote: None,
            similarity,
            source_ref: ClaimSourceRef::None,
        };

        let Some(candidate) = best else {
            return no_match(claim, 0.0);
        };
        let similarity = candidate.vector_similarity.unwrap_or(0.0);
        if similarity < CLAIM_MATCH_MIN {
            return no_match(claim, similarity);
        }

        let source_ref = if let Some(idx) = sources.iter().position(|s| s.url == candidate.url) {
            ClaimSourceRef::Existing(idx + 1)
        } else if let Some(idx) = new_sources.iter().position(|s| s.url == candidate.url) {
            // Another claim already minted this source.
            ClaimSourceRef::New(sources.len() + idx + 1)
        } else if similarity >= NEW_SOURCE_MIN {
            new_sources.push(Source {
                title: candidate.title.clone(),
                url: candidate.url.clone(),
                published_at: candidate.published_at,
                quote: candidate.content.clone(),
                relevance: similarity,
            });
            ClaimSourceRef::New(sources.len() + new_sources.len())
        } else {
            ClaimSourceRef::None
        };

        ClaimMatch {
            claim: claim.to_string(),
            article_id: Some(candidate.article_id),
            title: Some(candidate.title),
            url: Some(candidate.url),
            quote: Some(candidate.content),
            similarity,
            source_ref,
        }
    }
}

/// Sentences needing evidence: substantive, uncited, not transitions, and
/// factual-looking.
pub fn extract_uncited_claims(answer: &str) -> Vec<String> {
    split_sentences(answer, CLAIM_MIN_SENTENCE_LEN)
        .into_iter()
        .filter(|s| {
            !has_citation_marker(s)
                && !starts_with_transition(s)
                && looks_factual(s, CLAIM_FACTUAL_LEN)
        })
        .collect()
}

/// Inject `[Source n]` into the first literal occurrence of `claim` that
/// does not already carry a citation marker. Returns false when no such
/// occurrence exists.
///
/// The marker lands before the claim's terminal punctuation so it stays
/// inside the claim's own sentence; a marker placed after the period would
/// be attributed to the following sentence on re-validation.
fn inject_citation(answer: &mut String, claim: &str, ordinal: usize) -> bool {
    let Ok(re) = Regex::new(&regex::escape(claim)) else {
        return false;
    };

    let position = re
        .find_iter(answer)
        .map(|m| {
            let trailing = m
                .as_str()
                .chars()
                .rev()
                .take_while(|c| matches!(c, '.' | '!' | '?'))
                .count();
            m.end() - trailing
        })
        .find(|&at| {
            let after = answer[at..]
                .trim_start_matches(['.', '!', '?'])
                .trim_start();
            !after.starts_with("[Source")
        });

    match position {
        Some(at) => {
            answer.insert_str(at, &format!(" [Source {}]", ordinal));
            true
        }
        None => false,
    }
}
