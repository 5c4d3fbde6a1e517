//! Retrieval agent: hybrid search, rerank, confidence gate, cited answer.

use std::sync::Arc;
use std::time::Duration;

use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use citewire_core::defaults::{ANALYSIS_CACHE_TTL_SECS, NOT_FOUND_ANSWER};
use citewire_core::text::citation_ordinals;
use citewire_core::{
    ArticleRepository, GenerationBackend, Query, Result, RetrievalMetrics, RetrievalOutput,
    SearchCandidate, Source,
};
use citewire_search::confidence::{assess, ConfidenceAssessment};
use citewire_search::hybrid::{HybridSearchConfig, HybridSearchEngine};
use citewire_search::rerank::{rerank, RerankWeights};

use crate::cache::TtlCache;

const ANSWER_SYSTEM: &str = "You answer questions about crypto news using only the numbered \
    sources provided. Cite every factual statement with its marker, e.g. [Source 2]. If the \
    sources do not cover the question, say so. Never invent information.";

/// Representative quote length carried into a Source.
const QUOTE_MAX_CHARS: usize = 280;

/// One finished retrieval attempt.
#[derive(Debug, Clone)]
pub struct RetrievalOutcome {
    pub output: RetrievalOutput,
    pub confidence: ConfidenceAssessment,
    pub from_cache: bool,
}

#[derive(Clone)]
struct CachedRetrieval {
    output: RetrievalOutput,
    confidence: ConfidenceAssessment,
    /// Article count for the window at cache time; mismatch is a miss.
    article_count: i64,
}

/// Retrieval agent with a query-level TTL result cache.
pub struct RetrievalAgent {
    search: Arc<HybridSearchEngine>,
    generator: Arc<dyn GenerationBackend>,
    articles: Arc<dyn ArticleRepository>,
    cache: TtlCache<String, CachedRetrieval>,
}

impl RetrievalAgent {
    pub fn new(
        search: Arc<HybridSearchEngine>,
        generator: Arc<dyn GenerationBackend>,
        articles: Arc<dyn ArticleRepository>,
    ) -> Self {
        Self {
            search,
            generator,
            articles,
            cache: TtlCache::new(Duration::from_secs(ANALYSIS_CACHE_TTL_SECS)),
        }
    }

    /// Drop all cached results. Called by the ingestion pipeline.
    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    /// First attempt for a turn; may serve from cache.
    #[instrument(skip(self, query), fields(
        subsystem = "agents",
        component = "retrieval",
        op = "run",
        query = %query.effective_text(),
        lookback_days = query.lookback_days,
    ))]
    pub async fn run(&self, query: &Query) -> Result<RetrievalOutcome> {
        let key = cache_key(query.effective_text(), query.lookback_days);
        let window_start = chrono::Utc::now() - chrono::Duration::days(query.lookback_days as i64);
        let current_count = self.articles.count_window(window_start).await?;

        if let Some(cached) = self.cache.get(&key) {
            if cached.article_count == current_count {
                info!(cache_hit = true, "Retrieval served from cache");
                return Ok(RetrievalOutcome {
                    output: cached.output,
                    confidence: cached.confidence,
                    from_cache: true,
                });
            }
            debug!(
                cached_count = cached.article_count,
                current_count, "Retrieval cache stale, article count changed"
            );
        }

        let outcome = self.run_uncached(query, None).await?;
        self.cache.insert(
            key,
            CachedRetrieval {
                output: outcome.output.clone(),
                confidence: outcome.confidence.clone(),
                article_count: current_count,
            },
        );
        Ok(outcome)
    }

    /// Validation-failure retry. Bypasses the cache and folds the
    /// validator's issues into the prompt.
    pub async fn retry(&self, query: &Query, issues: &[String]) -> Result<RetrievalOutcome> {
        self.run_uncached(query, Some(issues)).await
    }

    async fn run_uncached(
        &self,
        query: &Query,
        retry_issues: Option<&[String]>,
    ) -> Result<RetrievalOutcome> {
        let config = HybridSearchConfig::default().with_lookback_days(query.lookback_days);
        let candidates = self.search.search(query.effective_text(), &config).await?;

        let vector_hits = candidates
            .iter()
            .filter(|c| c.vector_similarity.is_some())
            .count();
        let lexical_hits = candidates.iter().filter(|c| c.lexical_rank.is_some()).count();

        let ranked = rerank(query.effective_text(), candidates, &RerankWeights::default());
        let confidence = assess(&ranked);

        let metrics = RetrievalMetrics {
            vector_hits,
            lexical_hits,
            candidates_reranked: ranked.len(),
            top_score: ranked.first().map(|c| c.final_score).unwrap_or(0.0),
        };

        // Weak evidence never reaches the generation model.
        if !confidence.level.allows_generation() {
            info!(
                confidence = confidence.level.as_str(),
                "Evidence below generation gate, returning not-found answer"
            );
            return Ok(RetrievalOutcome {
                output: RetrievalOutput {
                    summary: NOT_FOUND_ANSWER.to_string(),
                    sources: Vec::new(),
                    citation_count: 0,
                    metrics: Some(metrics),
                },
                confidence,
                from_cache: false,
            });
        }

        let sources: Vec<Source> = ranked.iter().map(source_from_candidate).collect();
        let prompt = build_prompt(query.effective_text(), &sources, retry_issues);

        let summary = self
            .generator
            .generate_with_system(ANSWER_SYSTEM, &prompt)
            .await?;
        let citation_count = citation_ordinals(&summary).len();

        if citation_count == 0 {
            warn!("Generated answer contains no citation markers");
        }

        Ok(RetrievalOutcome {
            output: RetrievalOutput {
                summary,
                sources,
                citation_count,
                metrics: Some(metrics),
            },
            confidence,
            from_cache: false,
        })
    }
}

fn cache_key(text: &str, lookback_days: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(lookback_days.to_le_bytes());
    hex::encode(hasher.finalize())
}

fn source_from_candidate(c: &SearchCandidate) -> Source {
    let quote = if c.content.chars().count() > QUOTE_MAX_CHARS {
        let truncated: String = c.content.chars().take(QUOTE_MAX_CHARS).collect();
        format!("{}...", truncated.trim_end())
    } else {
        c.content.clone()
    };
    Source {
        title: c.title.clone(),
        url: c.url.clone(),
        published_at: c.published_at,
        quote,
        relevance: c.final_score.clamp(0.0, 1.0),
    }
}

fn build_prompt(question: &str, sources: &[Source], retry_issues: Option<&[String]>) -> String {
    let mut prompt = String::from("Sources:\n");
    for (i, s) in sources.iter().enumerate() {
        prompt.push_str(&format!(
            "[Source {}] {} ({}): {}\n",
            i + 1,
            s.title,
            s.published_at.format("%Y-%m-%d"),
            s.quote
        ));
    }
    prompt.push_str(&format!("\nQuestion: {}\n", question));
    if let Some(issues) = retry_issues {
        prompt.push_str(
            "\nA previous answer failed citation validation with these issues; \
             fix them this time:\n",
        );
        for issue in issues {
            prompt.push_str(&format!("- {}\n", issue));
        }
    }
    prompt
}
