//! Article and insight persistence.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use citewire_core::{Article, ArticleInsight, ArticleRepository, Error, Result, SentimentLabel};

/// PostgreSQL implementation of ArticleRepository.
pub struct PgArticleStore {
    pool: Pool<Postgres>,
}

impl PgArticleStore {
    /// Create a new PgArticleStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ArticleRepository for PgArticleStore {
    async fn fetch_window(&self, since: DateTime<Utc>) -> Result<Vec<Article>> {
        let rows = sqlx::query(
            r#"
            SELECT id, title, url, source_name, published_at, content,
                   insight_sentiment, insight_key_points, insight_entities
            FROM article
            WHERE published_at >= $1
            ORDER BY published_at ASC
            "#,
        )
        .bind(since)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let articles = rows
            .into_iter()
            .map(|row| {
                // Sentiment column present means the whole insight was
                // persisted; the three columns are written together.
                let insight = row
                    .get::<Option<String>, _>("insight_sentiment")
                    .map(|sentiment| ArticleInsight {
                        sentiment: sentiment.parse().unwrap_or(SentimentLabel::Neutral),
                        key_points: row
                            .get::<Option<Vec<String>>, _>("insight_key_points")
                            .unwrap_or_default(),
                        entities: row
                            .get::<Option<Vec<String>>, _>("insight_entities")
                            .unwrap_or_default(),
                        from_cache: true,
                    });

                Article {
                    id: row.get("id"),
                    title: row.get("title"),
                    url: row.get("url"),
                    source_name: row.get("source_name"),
                    published_at: row.get("published_at"),
                    content: row.get("content"),
                    insight,
                }
            })
            .collect();

        Ok(articles)
    }

    async fn count_window(&self, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM article WHERE published_at >= $1")
            .bind(since)
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;
        Ok(count)
    }

    async fn upsert_insight(&self, article_id: Uuid, insight: &ArticleInsight) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE article
            SET insight_sentiment = $2,
                insight_key_points = $3,
                insight_entities = $4,
                insight_extracted_at = NOW()
            WHERE id = $1
            "#,
        )
        .bind(article_id)
        .bind(insight.sentiment.to_string())
        .bind(&insight.key_points)
        .bind(&insight.entities)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "article_store",
            op = "upsert_insight",
            article_id = %article_id,
            "Insight persisted"
        );
        Ok(())
    }
}
