//! Hybrid search combining semantic vector search and lexical keyword
//! search over the article chunk index.

use std::sync::Arc;
use std::time::Instant;

use chrono::{Duration, Utc};
use tracing::{debug, info, instrument, warn};

use citewire_core::defaults::{SEARCH_LIMIT, VECTOR_MIN_SIMILARITY};
use citewire_core::text::search_terms;
use citewire_core::{
    ChunkHit, EmbeddingBackend, Error, LexicalIndex, Result, SearchCandidate, VectorIndex,
};

use crate::rrf::rrf_fuse;

/// Configuration for hybrid search.
#[derive(Debug, Clone)]
pub struct HybridSearchConfig {
    /// Minimum cosine similarity for vector hits.
    pub min_similarity: f32,
    /// Candidates requested from each modality.
    pub limit: i64,
    /// Lookback window in days; `None` searches the whole corpus.
    pub lookback_days: Option<u32>,
}

impl Default for HybridSearchConfig {
    fn default() -> Self {
        Self {
            min_similarity: VECTOR_MIN_SIMILARITY,
            limit: SEARCH_LIMIT,
            lookback_days: None,
        }
    }
}

impl HybridSearchConfig {
    /// Set the minimum vector similarity threshold.
    pub fn with_min_similarity(mut self, min: f32) -> Self {
        self.min_similarity = min;
        self
    }

    /// Set the per-modality candidate limit.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    /// Set the lookback window.
    pub fn with_lookback_days(mut self, days: u32) -> Self {
        self.lookback_days = Some(days);
        self
    }
}

/// Hybrid search engine fusing both retrieval modalities with RRF.
pub struct HybridSearchEngine {
    vector: Arc<dyn VectorIndex>,
    lexical: Arc<dyn LexicalIndex>,
    embedder: Arc<dyn EmbeddingBackend>,
}

impl HybridSearchEngine {
    /// Create a new hybrid search engine over the given index adapters.
    pub fn new(
        vector: Arc<dyn VectorIndex>,
        lexical: Arc<dyn LexicalIndex>,
        embedder: Arc<dyn EmbeddingBackend>,
    ) -> Self {
        Self {
            vector,
            lexical,
            embedder,
        }
    }

    /// Run vector and lexical search concurrently and fuse the ranked lists.
    ///
    /// Vector search failure is fatal and propagates; lexical failure
    /// degrades to an empty list. A query that sanitizes down to no terms
    /// skips lexical search entirely.
    #[instrument(skip(self, config), fields(
        subsystem = "search",
        component = "hybrid_search",
        op = "search",
        query = %query,
    ))]
    pub async fn search(
        &self,
        query: &str,
        config: &HybridSearchConfig,
    ) -> Result<Vec<SearchCandidate>> {
        let start = Instant::now();

        let embeddings = self.embedder.embed_texts(&[query.to_string()]).await?;
        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| Error::Embedding("empty embedding response for query".to_string()))?;

        let published_after = config
            .lookback_days
            .map(|days| Utc::now() - Duration::days(days as i64));

        let terms = search_terms(query);
        debug!(term_count = terms.len(), "Query terms extracted");

        let (vector_result, lexical_result) = tokio::join!(
            self.vector
                .search(&embedding, config.min_similarity, published_after, config.limit),
            self.lexical_branch(&terms, published_after, config.limit),
        );

        let vector_hits = vector_result?;
        let lexical_hits = lexical_result;

        let vector_count = vector_hits.len();
        let lexical_count = lexical_hits.len();
        let results = rrf_fuse(vector_hits, lexical_hits);

        info!(
            vector_hits = vector_count,
            lexical_hits = lexical_count,
            result_count = results.len(),
            duration_ms = start.elapsed().as_millis() as u64,
            "Hybrid search completed"
        );

        Ok(results)
    }

    /// Lexical half of the hybrid search. Never fails: no terms means no
    /// search, and an index error degrades to empty results.
    async fn lexical_branch(
        &self,
        terms: &[String],
        published_after: Option<chrono::DateTime<Utc>>,
        limit: i64,
    ) -> Vec<ChunkHit> {
        if terms.is_empty() {
            debug!("No lexical terms after sanitization, skipping lexical search");
            return Vec::new();
        }
        match self.lexical.search(terms, published_after, limit).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!(error = %e, "Lexical search failed, degrading to empty results");
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::DateTime;
    use citewire_core::{ChunkKind, Vector};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use uuid::Uuid;

    struct StubEmbedder;

    #[async_trait]
    impl EmbeddingBackend for StubEmbedder {
        async fn embed_texts(&self, texts: &[String]) -> Result<Vec<Vector>> {
            Ok(texts.iter().map(|_| Vector::from(vec![0.1f32; 4])).collect())
        }
        fn dimension(&self) -> usize {
            4
        }
        fn model_name(&self) -> &str {
            "stub"
        }
    }

    struct StubVector {
        hits: Vec<ChunkHit>,
        fail: bool,
    }

    #[async_trait]
    impl VectorIndex for StubVector {
        async fn search(
            &self,
            _embedding: &Vector,
            _min_similarity: f32,
            _published_after: Option<DateTime<Utc>>,
            _limit: i64,
        ) -> Result<Vec<ChunkHit>> {
            if self.fail {
                return Err(Error::Search("vector index down".to_string()));
            }
            Ok(self.hits.clone())
        }
    }

    struct StubLexical {
        hits: Vec<ChunkHit>,
        fail: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LexicalIndex for StubLexical {
        async fn search(
            &self,
            _terms: &[String],
            _published_after: Option<DateTime<Utc>>,
            _limit: i64,
        ) -> Result<Vec<ChunkHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(Error::Search("no tsv column".to_string()));
            }
            Ok(self.hits.clone())
        }
    }

    fn hit() -> ChunkHit {
        ChunkHit {
            chunk_id: Uuid::new_v4(),
            article_id: Uuid::new_v4(),
            content: "bitcoin etf inflows".to_string(),
            title: "Bitcoin ETF".to_string(),
            url: "https://example.com/btc".to_string(),
            source_name: "wire".to_string(),
            published_at: Utc::now(),
            kind: ChunkKind::Body,
            score: 0.5,
        }
    }

    fn engine(vector: StubVector, lexical: StubLexical) -> (HybridSearchEngine, Arc<StubLexical>) {
        let lexical = Arc::new(lexical);
        (
            HybridSearchEngine::new(
                Arc::new(vector),
                lexical.clone(),
                Arc::new(StubEmbedder),
            ),
            lexical,
        )
    }

    #[tokio::test]
    async fn test_search_fuses_both_modalities() {
        let shared = hit();
        let (engine, _) = engine(
            StubVector {
                hits: vec![shared.clone()],
                fail: false,
            },
            StubLexical {
                hits: vec![shared],
                fail: false,
                calls: AtomicUsize::new(0),
            },
        );

        let results = engine
            .search("bitcoin etf inflows", &HybridSearchConfig::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert!(results[0].vector_similarity.is_some());
        assert_eq!(results[0].lexical_rank, Some(0));
    }

    #[tokio::test]
    async fn test_vector_failure_is_fatal() {
        let (engine, _) = engine(
            StubVector {
                hits: Vec::new(),
                fail: true,
            },
            StubLexical {
                hits: vec![hit()],
                fail: false,
                calls: AtomicUsize::new(0),
            },
        );

        let result = engine
            .search("bitcoin", &HybridSearchConfig::default())
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_lexical_failure_degrades_to_vector_only() {
        let (engine, _) = engine(
            StubVector {
                hits: vec![hit()],
                fail: false,
            },
            StubLexical {
                hits: Vec::new(),
                fail: true,
                calls: AtomicUsize::new(0),
            },
        );

        let results = engine
            .search("bitcoin etf", &HybridSearchConfig::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].lexical_rank, None);
    }

    #[tokio::test]
    async fn test_stop_word_query_skips_lexical_search() {
        let (engine, lexical) = engine(
            StubVector {
                hits: vec![hit()],
                fail: false,
            },
            StubLexical {
                hits: vec![hit()],
                fail: false,
                calls: AtomicUsize::new(0),
            },
        );

        // Every word is a stop word, so no terms survive sanitization.
        let results = engine
            .search("what is the", &HybridSearchConfig::default())
            .await
            .unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(lexical.calls.load(Ordering::SeqCst), 0);
    }
}
