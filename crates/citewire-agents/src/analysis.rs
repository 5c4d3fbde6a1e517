//! Analysis agent: map-reduce over a lookback window with caching.
//!
//! Map extracts a per-article insight (reused from the persistent store
//! when present, the article text being immutable). Reduce synthesizes a
//! cited narrative across the selected top sources. Two caches sit in
//! front of the expensive calls: a query-level result cache guarded by
//! the window's article count, and a reduce-level cache keyed by the
//! shape of the map output.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument, warn};

use citewire_core::defaults::{
    ANALYSIS_CACHE_TTL_SECS, ANALYSIS_TOP_SOURCES, DELIVERY_CHUNK_WORDS,
    INSIGHT_BATCH_CONCURRENCY, INSIGHT_RECENCY_DAYS, NOT_FOUND_ANSWER, TREND_KEYWORD_COUNT,
};
use citewire_core::text::{citation_ordinals, is_stop_word, search_terms};
use citewire_core::{
    AnalysisOutput, Article, ArticleInsight, ArticleRepository, GenerationBackend, Query, Result,
    SentimentBreakdown, SentimentLabel, Source,
};
use citewire_inference::complete_structured;

use crate::cache::TtlCache;
use crate::events::EventSink;

const INSIGHT_SYSTEM: &str = "You extract structured insight from one crypto news article. \
    Respond with JSON only: {\"sentiment\": \"bullish\" | \"bearish\" | \"neutral\", \
    \"key_points\": [string], \"entities\": [string]}. At most 5 key points and 8 entities.";

const REDUCE_SYSTEM: &str = "You synthesize crypto news analysis from per-article insights. \
    Write a concise narrative answering the question. Cite the numbered sources for factual \
    statements using their markers, e.g. [Source 2]. Do not invent sources.";

/// Content prefix used when insight extraction fails outright.
const PLACEHOLDER_POINT_CHARS: usize = 160;

#[derive(Debug, Deserialize)]
struct InsightJson {
    sentiment: SentimentLabel,
    #[serde(default)]
    key_points: Vec<String>,
    #[serde(default)]
    entities: Vec<String>,
}

#[derive(Clone)]
struct CachedAnalysis {
    output: AnalysisOutput,
    /// Article count for the window at cache time; mismatch is a miss.
    article_count: i64,
}

/// Map-reduce analysis agent with query- and reduce-level caches.
pub struct AnalysisAgent {
    generator: Arc<dyn GenerationBackend>,
    articles: Arc<dyn ArticleRepository>,
    query_cache: TtlCache<String, CachedAnalysis>,
    reduce_cache: TtlCache<String, String>,
}

impl AnalysisAgent {
    pub fn new(generator: Arc<dyn GenerationBackend>, articles: Arc<dyn ArticleRepository>) -> Self {
        let ttl = Duration::from_secs(ANALYSIS_CACHE_TTL_SECS);
        Self {
            generator,
            articles,
            query_cache: TtlCache::new(ttl),
            reduce_cache: TtlCache::new(ttl),
        }
    }

    /// Drop both caches. Called by the ingestion pipeline after new
    /// articles land.
    pub fn clear_caches(&self) {
        self.query_cache.clear();
        self.reduce_cache.clear();
    }

    /// Answer an analytical question over the query's lookback window.
    #[instrument(skip(self, query, sink), fields(
        subsystem = "agents",
        component = "analysis",
        op = "run",
        query = %query.effective_text(),
        lookback_days = query.lookback_days,
    ))]
    pub async fn run(&self, query: &Query, sink: &EventSink) -> Result<AnalysisOutput> {
        let key = query_key(query.effective_text(), query.lookback_days);
        let window_start = Utc::now() - chrono::Duration::days(query.lookback_days as i64);
        let current_count = self.articles.count_window(window_start).await?;

        if let Some(cached) = self.query_cache.get(&key) {
            if cached.article_count == current_count {
                info!(cache_hit = true, "Analysis served from query cache");
                deliver_chunked(sink, &cached.output.summary);
                return Ok(cached.output);
            }
            debug!(
                cached_count = cached.article_count,
                current_count, "Analysis cache stale, article count changed"
            );
        }

        let articles = self.articles.fetch_window(window_start).await?;
        if articles.is_empty() {
            info!("No articles in window, skipping analysis");
            let summary = NOT_FOUND_ANSWER.to_string();
            deliver_chunked(sink, &summary);
            return Ok(AnalysisOutput {
                summary,
                sentiment: SentimentBreakdown::default(),
                trends: Vec::new(),
                articles_analyzed: 0,
                articles_cached: 0,
                articles_new: 0,
                confidence: 0,
                sources: Vec::new(),
                citation_count: 0,
            });
        }

        let insights = self.map_phase(articles).await;
        let articles_analyzed = insights.len();
        let articles_cached = insights.iter().filter(|(_, i)| i.from_cache).count();
        let articles_new = articles_analyzed - articles_cached;

        let sentiment = sentiment_breakdown(&insights);
        let trends = trend_keywords(&insights);
        let sources = select_sources(query.effective_text(), &insights);
        let confidence = heuristic_confidence(&insights, &sentiment);

        let summary = self
            .reduce_phase(query.effective_text(), &sentiment, &trends, &sources, sink)
            .await?;
        let citation_count = citation_ordinals(&summary).len();

        let output = AnalysisOutput {
            summary,
            sentiment,
            trends,
            articles_analyzed,
            articles_cached,
            articles_new,
            confidence,
            sources,
            citation_count,
        };

        self.query_cache.insert(
            key,
            CachedAnalysis {
                output: output.clone(),
                article_count: current_count,
            },
        );

        info!(
            articles_analyzed,
            articles_cached,
            articles_new,
            confidence,
            "Analysis completed"
        );
        Ok(output)
    }

    /// Map phase: reuse persisted insights, extract the rest in bounded
    /// concurrent batches, and persist fresh extractions best-effort.
    async fn map_phase(&self, articles: Vec<Article>) -> Vec<(Article, ArticleInsight)> {
        stream::iter(articles.into_iter().map(|article| async move {
            if let Some(insight) = article.insight.clone() {
                return (article, insight);
            }
            let insight = self.extract_insight(&article).await;
            self.persist_insight(&article, &insight);
            (article, insight)
        }))
        .buffer_unordered(INSIGHT_BATCH_CONCURRENCY)
        .collect()
        .await
    }

    /// One LLM insight extraction with a placeholder fallback. Parse
    /// repair and bounded retries happen inside the structured call.
    async fn extract_insight(&self, article: &Article) -> ArticleInsight {
        let prompt = format!("Title: {}\n\n{}", article.title, article.content);
        match complete_structured::<InsightJson>(self.generator.as_ref(), INSIGHT_SYSTEM, &prompt)
            .await
        {
            Ok(json) => ArticleInsight {
                sentiment: json.sentiment,
                key_points: json.key_points,
                entities: json.entities,
                from_cache: false,
            },
            Err(e) => {
                warn!(
                    article_id = %article.id,
                    error_msg = %e,
                    "Insight extraction failed, using placeholder"
                );
                let placeholder: String =
                    article.content.chars().take(PLACEHOLDER_POINT_CHARS).collect();
                ArticleInsight {
                    sentiment: SentimentLabel::Neutral,
                    key_points: vec![placeholder],
                    entities: Vec::new(),
                    from_cache: false,
                }
            }
        }
    }

    /// Best-effort background persist; failure is logged, never surfaced.
    fn persist_insight(&self, article: &Article, insight: &ArticleInsight) {
        let articles = Arc::clone(&self.articles);
        let article_id = article.id;
        let insight = insight.clone();
        tokio::spawn(async move {
            if let Err(e) = articles.upsert_insight(article_id, &insight).await {
                warn!(article_id = %article_id, error_msg = %e, "Failed to persist insight");
            }
        });
    }

    /// Reduce phase: synthesize the narrative, serving near-identical map
    /// outputs from the reduce cache. Either way the text reaches the
    /// caller through the same incremental delivery.
    async fn reduce_phase(
        &self,
        question: &str,
        sentiment: &SentimentBreakdown,
        trends: &[String],
        sources: &[Source],
        sink: &EventSink,
    ) -> Result<String> {
        let key = reduce_key(question, sentiment, sources);

        if let Some(cached) = self.reduce_cache.get(&key) {
            info!(cache_hit = true, "Reduce served from cache");
            deliver_chunked(sink, &cached);
            return Ok(cached);
        }

        let mut prompt = format!(
            "Question: {}\n\nSentiment across {} sources: {:.0}% bullish, {:.0}% bearish, \
             {:.0}% neutral. Trending topics: {}.\n\nSources:\n",
            question,
            sources.len(),
            sentiment.bullish_pct,
            sentiment.bearish_pct,
            sentiment.neutral_pct,
            trends.join(", "),
        );
        for (i, s) in sources.iter().enumerate() {
            prompt.push_str(&format!(
                "[Source {}] {} ({}): {}\n",
                i + 1,
                s.title,
                s.published_at.format("%Y-%m-%d"),
                s.quote
            ));
        }

        let summary = self
            .generator
            .generate_with_system(REDUCE_SYSTEM, &prompt)
            .await?;
        deliver_chunked(sink, &summary);
        self.reduce_cache.insert(key, summary.clone());
        Ok(summary)
    }
}

/// Simulated incremental delivery: the full text pushed out in fixed
/// word-count chunks, so cached and live generations look the same to
/// the client.
fn deliver_chunked(sink: &EventSink, text: &str) {
    let words: Vec<&str> = text.split_whitespace().collect();
    for chunk in words.chunks(DELIVERY_CHUNK_WORDS) {
        if sink.is_closed() {
            return;
        }
        sink.delta(format!("{} ", chunk.join(" ")));
    }
}

fn query_key(text: &str, lookback_days: u32) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hasher.update(lookback_days.to_le_bytes());
    hex::encode(hasher.finalize())
}

/// Reduce cache key: rounded sentiment percentages + digested source
/// quotes + hashed question. Near-identical map outputs collide on
/// purpose.
fn reduce_key(question: &str, sentiment: &SentimentBreakdown, sources: &[Source]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    hasher.update([
        sentiment.bullish_pct.round() as u8,
        sentiment.bearish_pct.round() as u8,
        sentiment.neutral_pct.round() as u8,
    ]);
    for s in sources {
        hasher.update(s.url.as_bytes());
        hasher.update(s.quote.as_bytes());
    }
    hex::encode(hasher.finalize())
}

fn sentiment_breakdown(insights: &[(Article, ArticleInsight)]) -> SentimentBreakdown {
    let total = insights.len() as f32;
    let count = |label: SentimentLabel| {
        insights.iter().filter(|(_, i)| i.sentiment == label).count() as f32
    };
    let bullish = count(SentimentLabel::Bullish);
    let bearish = count(SentimentLabel::Bearish);
    let neutral = count(SentimentLabel::Neutral);

    let overall = if bullish > bearish && bullish > neutral {
        SentimentLabel::Bullish
    } else if bearish > bullish && bearish > neutral {
        SentimentLabel::Bearish
    } else {
        SentimentLabel::Neutral
    };

    SentimentBreakdown {
        bullish_pct: bullish / total * 100.0,
        bearish_pct: bearish / total * 100.0,
        neutral_pct: neutral / total * 100.0,
        overall,
    }
}

/// Stop-word-filtered frequency count over all key points, top-N.
fn trend_keywords(insights: &[(Article, ArticleInsight)]) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for (_, insight) in insights {
        for point in &insight.key_points {
            for term in search_terms(&point.to_lowercase()) {
                if term.len() > 2 && !is_stop_word(&term) {
                    *counts.entry(term).or_default() += 1;
                }
            }
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
        .into_iter()
        .take(TREND_KEYWORD_COUNT)
        .map(|(term, _)| term)
        .collect()
}

/// Score every insight as a citation candidate and take the top N,
/// numbered before the reduce prompt is built.
fn select_sources(question: &str, insights: &[(Article, ArticleInsight)]) -> Vec<Source> {
    let query_terms = search_terms(&question.to_lowercase());
    let now = Utc::now();

    let mut scored: Vec<(f32, &Article, &ArticleInsight)> = insights
        .iter()
        .map(|(article, insight)| {
            let score = source_score(&query_terms, article, insight, now);
            (score, article, insight)
        })
        .collect();
    scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

    scored
        .into_iter()
        .take(ANALYSIS_TOP_SOURCES)
        .map(|(score, article, insight)| Source {
            title: article.title.clone(),
            url: article.url.clone(),
            published_at: article.published_at,
            quote: insight
                .key_points
                .first()
                .cloned()
                .unwrap_or_else(|| article.title.clone()),
            relevance: score.clamp(0.0, 1.0),
        })
        .collect()
}

/// Weighted blend: key-point richness 0.35, entity overlap 0.25, linear
/// recency 0.25, non-neutral sentiment 0.15.
fn source_score(
    query_terms: &[String],
    article: &Article,
    insight: &ArticleInsight,
    now: DateTime<Utc>,
) -> f32 {
    let richness = (insight.key_points.len() as f32 / 5.0).min(1.0);

    let entity_overlap = if query_terms.is_empty() || insight.entities.is_empty() {
        0.0
    } else {
        let matched = insight
            .entities
            .iter()
            .filter(|e| {
                let lower = e.to_lowercase();
                query_terms.iter().any(|t| lower.contains(t.as_str()))
            })
            .count();
        matched as f32 / insight.entities.len() as f32
    };

    let age_days = (now - article.published_at).num_hours() as f32 / 24.0;
    let recency = (1.0 - age_days / INSIGHT_RECENCY_DAYS).max(0.0);

    let opinionated = if insight.sentiment == SentimentLabel::Neutral {
        0.0
    } else {
        1.0
    };

    0.35 * richness + 0.25 * entity_overlap + 0.25 * recency + 0.15 * opinionated
}

/// Heuristic 0-100 confidence: base 50, up to +25 for volume, +15 for
/// freshness, +10 for sentiment consistency.
fn heuristic_confidence(
    insights: &[(Article, ArticleInsight)],
    sentiment: &SentimentBreakdown,
) -> u8 {
    let now = Utc::now();

    let volume = (insights.len() as f32 * 2.5).min(25.0);

    let fresh = insights
        .iter()
        .filter(|(a, _)| (now - a.published_at).num_hours() < 48)
        .count() as f32;
    let freshness = (fresh / insights.len() as f32) * 15.0;

    let max_pct = sentiment
        .bullish_pct
        .max(sentiment.bearish_pct)
        .max(sentiment.neutral_pct);
    // 33% is an even three-way split, 100% is unanimous.
    let consistency = ((max_pct - 33.3) / 66.7).clamp(0.0, 1.0) * 10.0;

    (50.0 + volume + freshness + consistency).round() as u8
}
