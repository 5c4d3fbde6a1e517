//! Shared in-memory fakes and builders for supervisor integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use uuid::Uuid;

use citewire_agents::{
    AnalysisAgent, ClaimEvidenceFinder, FollowupRouter, IngestGate, IntentClassifier,
    RetrievalAgent, Supervisor,
};
use citewire_core::{
    Article, ArticleInsight, ArticleRepository, ChunkHit, ChunkKind, ConversationRepository,
    ConversationTurn, GenerationBackend, LexicalIndex, Result, Source, TurnRole, Vector,
    VectorIndex,
};
use citewire_inference::MockInferenceBackend;
use citewire_search::HybridSearchEngine;

/// Vector index serving a canned ranked list, threshold-filtered like the
/// real adapter.
pub struct FakeVectorIndex {
    hits: Vec<ChunkHit>,
}

impl FakeVectorIndex {
    pub fn new(hits: Vec<ChunkHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl VectorIndex for FakeVectorIndex {
    async fn search(
        &self,
        _embedding: &Vector,
        min_similarity: f32,
        _published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        Ok(self
            .hits
            .iter()
            .filter(|h| h.score >= min_similarity)
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

/// Lexical index serving a canned ranked list.
pub struct FakeLexicalIndex {
    hits: Vec<ChunkHit>,
}

impl FakeLexicalIndex {
    pub fn new(hits: Vec<ChunkHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl LexicalIndex for FakeLexicalIndex {
    async fn search(
        &self,
        _terms: &[String],
        _published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        Ok(self.hits.iter().take(limit as usize).cloned().collect())
    }
}

/// In-memory article store. Upserted insights land back on the stored
/// articles so the map phase can observe reuse.
#[derive(Default)]
pub struct FakeArticleRepository {
    articles: Mutex<Vec<Article>>,
    upserts: Mutex<Vec<Uuid>>,
}

impl FakeArticleRepository {
    pub fn push(&self, article: Article) {
        self.articles.lock().unwrap().push(article);
    }

    pub fn upsert_count(&self) -> usize {
        self.upserts.lock().unwrap().len()
    }
}

#[async_trait]
impl ArticleRepository for FakeArticleRepository {
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Article>> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.published_at > since)
            .cloned()
            .collect())
    }

    async fn count_window(&self, since: DateTime<Utc>) -> Result<i64> {
        Ok(self
            .articles
            .lock()
            .unwrap()
            .iter()
            .filter(|a| a.published_at > since)
            .count() as i64)
    }

    async fn upsert_insight(&self, article_id: Uuid, insight: &ArticleInsight) -> Result<()> {
        let mut articles = self.articles.lock().unwrap();
        if let Some(article) = articles.iter_mut().find(|a| a.id == article_id) {
            article.insight = Some(ArticleInsight {
                from_cache: true,
                ..insight.clone()
            });
        }
        self.upserts.lock().unwrap().push(article_id);
        Ok(())
    }
}

/// In-memory conversation log keyed by thread.
#[derive(Default)]
pub struct FakeConversationRepository {
    threads: Mutex<HashMap<Uuid, Vec<ConversationTurn>>>,
}

impl FakeConversationRepository {
    pub fn seed(&self, thread_id: Uuid, turns: Vec<ConversationTurn>) {
        self.threads.lock().unwrap().insert(thread_id, turns);
    }

    pub fn turn_count(&self, thread_id: Uuid) -> usize {
        self.threads
            .lock()
            .unwrap()
            .get(&thread_id)
            .map(Vec::len)
            .unwrap_or(0)
    }
}

#[async_trait]
impl ConversationRepository for FakeConversationRepository {
    async fn append_turn(&self, thread_id: Uuid, turn: &ConversationTurn) -> Result<()> {
        self.threads
            .lock()
            .unwrap()
            .entry(thread_id)
            .or_default()
            .push(turn.clone());
        Ok(())
    }

    async fn last_turns(&self, thread_id: Uuid, limit: i64) -> Result<Vec<ConversationTurn>> {
        let threads = self.threads.lock().unwrap();
        let turns = threads.get(&thread_id).cloned().unwrap_or_default();
        let skip = turns.len().saturating_sub(limit as usize);
        Ok(turns.into_iter().skip(skip).collect())
    }
}

/// A fresh summary chunk whose title and content carry the given text.
pub fn chunk_hit(title: &str, content: &str, score: f32, age_hours: i64) -> ChunkHit {
    ChunkHit {
        chunk_id: Uuid::new_v4(),
        article_id: Uuid::new_v4(),
        content: content.to_string(),
        title: title.to_string(),
        url: format!("https://example.com/{}", Uuid::new_v4()),
        source_name: "Example Wire".to_string(),
        published_at: Utc::now() - Duration::hours(age_hours),
        kind: ChunkKind::Summary,
        score,
    }
}

pub fn article(title: &str, content: &str, age_hours: i64) -> Article {
    Article {
        id: Uuid::new_v4(),
        title: title.to_string(),
        url: format!("https://example.com/{}", Uuid::new_v4()),
        source_name: "Example Wire".to_string(),
        published_at: Utc::now() - Duration::hours(age_hours),
        content: content.to_string(),
        insight: None,
    }
}

pub fn source(title: &str) -> Source {
    Source {
        title: title.to_string(),
        url: format!("https://example.com/{}", Uuid::new_v4()),
        published_at: Utc::now() - Duration::hours(2),
        quote: "The approval was confirmed in an official filing.".to_string(),
        relevance: 0.8,
    }
}

pub fn user_turn(content: &str) -> ConversationTurn {
    ConversationTurn {
        role: TurnRole::User,
        content: content.to_string(),
        sources: None,
        created_at: Utc::now() - Duration::minutes(5),
    }
}

pub fn assistant_turn(content: &str, sources: Vec<Source>) -> ConversationTurn {
    ConversationTurn {
        role: TurnRole::Assistant,
        content: content.to_string(),
        sources: Some(sources),
        created_at: Utc::now() - Duration::minutes(4),
    }
}

/// Fully wired supervisor over in-memory fakes and the mock backend.
pub struct Harness {
    pub backend: MockInferenceBackend,
    pub articles: Arc<FakeArticleRepository>,
    pub conversations: Arc<FakeConversationRepository>,
    pub supervisor: Supervisor,
}

pub fn harness(backend: MockInferenceBackend, vector_hits: Vec<ChunkHit>) -> Harness {
    let articles = Arc::new(FakeArticleRepository::default());
    let conversations = Arc::new(FakeConversationRepository::default());

    let engine = Arc::new(HybridSearchEngine::new(
        Arc::new(FakeVectorIndex::new(vector_hits)),
        Arc::new(FakeLexicalIndex::new(Vec::new())),
        Arc::new(backend.clone()),
    ));
    let generator: Arc<dyn GenerationBackend> = Arc::new(backend.clone());

    let supervisor = Supervisor::new(
        FollowupRouter::heuristic(),
        IntentClassifier::heuristic(),
        RetrievalAgent::new(Arc::clone(&engine), Arc::clone(&generator), articles.clone()),
        AnalysisAgent::new(Arc::clone(&generator), articles.clone()),
        ClaimEvidenceFinder::new(engine),
        Arc::clone(&generator),
        conversations.clone(),
        IngestGate::default(),
    );

    Harness {
        backend,
        articles,
        conversations,
        supervisor,
    }
}
