//! Chunk index adapters: pgvector semantic search and tsvector keyword
//! search over `article_chunk`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, Row};
use tracing::{debug, warn};

use citewire_core::{ChunkHit, ChunkKind, Error, LexicalIndex, Result, Vector, VectorIndex};

/// PostgreSQL chunk index implementing both search modalities.
pub struct PgChunkIndex {
    pool: Pool<Postgres>,
}

impl PgChunkIndex {
    /// Create a new PgChunkIndex with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }

    fn hit_from_row(row: sqlx::postgres::PgRow) -> ChunkHit {
        let kind: String = row.get("kind");
        ChunkHit {
            chunk_id: row.get("chunk_id"),
            article_id: row.get("article_id"),
            content: row.get("content"),
            title: row.get("title"),
            url: row.get("url"),
            source_name: row.get("source_name"),
            published_at: row.get("published_at"),
            kind: kind.parse().unwrap_or(ChunkKind::Body),
            score: row.get::<f64, _>("score") as f32,
        }
    }
}

#[async_trait]
impl VectorIndex for PgChunkIndex {
    async fn search(
        &self,
        embedding: &Vector,
        min_similarity: f32,
        published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        let time_clause = if published_after.is_some() {
            "AND a.published_at >= $4"
        } else {
            ""
        };

        let sql = format!(
            r#"
            SELECT c.id AS chunk_id,
                   c.article_id,
                   c.content,
                   c.kind,
                   a.title,
                   a.url,
                   a.source_name,
                   a.published_at,
                   1.0 - (c.embedding <=> $1::vector) AS score
            FROM article_chunk c
            JOIN article a ON a.id = c.article_id
            WHERE 1.0 - (c.embedding <=> $1::vector) >= $2
              {}
            ORDER BY c.embedding <=> $1::vector
            LIMIT $3
            "#,
            time_clause
        );

        let mut q = sqlx::query(&sql)
            .bind(embedding)
            .bind(min_similarity as f64)
            .bind(limit);
        if let Some(after) = published_after {
            q = q.bind(after);
        }

        // Vector search failure is fatal to the caller: a missing embedding
        // index means the corpus is unusable, not quietly empty.
        let rows = q.fetch_all(&self.pool).await.map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "chunk_index",
            op = "vector_search",
            result_count = rows.len(),
            "Vector search complete"
        );

        Ok(rows.into_iter().map(Self::hit_from_row).collect())
    }
}

#[async_trait]
impl LexicalIndex for PgChunkIndex {
    async fn search(
        &self,
        terms: &[String],
        published_after: Option<DateTime<Utc>>,
        limit: i64,
    ) -> Result<Vec<ChunkHit>> {
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        // OR the sanitized terms so any keyword overlap ranks.
        let tsquery = terms
            .iter()
            .map(|t| t.replace(['\'', '\\', ':', '&', '|', '!', '(', ')'], ""))
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join(" | ");
        if tsquery.is_empty() {
            return Ok(Vec::new());
        }

        let time_clause = if published_after.is_some() {
            "AND a.published_at >= $3"
        } else {
            ""
        };

        let sql = format!(
            r#"
            SELECT c.id AS chunk_id,
                   c.article_id,
                   c.content,
                   c.kind,
                   a.title,
                   a.url,
                   a.source_name,
                   a.published_at,
                   ts_rank(c.tsv, to_tsquery('english', $1))::float8 AS score
            FROM article_chunk c
            JOIN article a ON a.id = c.article_id
            WHERE c.tsv @@ to_tsquery('english', $1)
              {}
            ORDER BY score DESC
            LIMIT $2
            "#,
            time_clause
        );

        let mut q = sqlx::query(&sql).bind(&tsquery).bind(limit);
        if let Some(after) = published_after {
            q = q.bind(after);
        }

        // Lexical search is the optional half of hybrid retrieval: a missing
        // tsv column or malformed tsquery degrades to empty rather than
        // failing the turn.
        match q.fetch_all(&self.pool).await {
            Ok(rows) => {
                debug!(
                    subsystem = "db",
                    component = "chunk_index",
                    op = "lexical_search",
                    result_count = rows.len(),
                    "Lexical search complete"
                );
                Ok(rows.into_iter().map(Self::hit_from_row).collect())
            }
            Err(e) => {
                warn!(error = %e, "Lexical search unavailable, degrading to empty results");
                Ok(Vec::new())
            }
        }
    }
}
