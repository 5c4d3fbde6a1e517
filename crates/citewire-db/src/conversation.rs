//! Conversation turn log persistence.

use async_trait::async_trait;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use citewire_core::{ConversationRepository, ConversationTurn, Error, Result, Source, TurnRole};

/// PostgreSQL implementation of ConversationRepository.
pub struct PgConversationStore {
    pool: Pool<Postgres>,
}

impl PgConversationStore {
    /// Create a new PgConversationStore with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ConversationRepository for PgConversationStore {
    async fn append_turn(&self, thread_id: Uuid, turn: &ConversationTurn) -> Result<()> {
        let role = match turn.role {
            TurnRole::User => "user",
            TurnRole::Assistant => "assistant",
        };
        let sources = turn
            .sources
            .as_ref()
            .map(serde_json::to_value)
            .transpose()?;

        sqlx::query(
            r#"
            INSERT INTO conversation_turn (thread_id, role, content, sources, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(thread_id)
        .bind(role)
        .bind(&turn.content)
        .bind(sources)
        .bind(turn.created_at)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        Ok(())
    }

    async fn last_turns(&self, thread_id: Uuid, limit: i64) -> Result<Vec<ConversationTurn>> {
        // Inner query takes the newest N; outer re-orders oldest first for
        // prompt assembly.
        let rows = sqlx::query(
            r#"
            SELECT role, content, sources, created_at FROM (
                SELECT role, content, sources, created_at
                FROM conversation_turn
                WHERE thread_id = $1
                ORDER BY created_at DESC
                LIMIT $2
            ) recent
            ORDER BY created_at ASC
            "#,
        )
        .bind(thread_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let turns = rows
            .into_iter()
            .map(|row| {
                let role: String = row.get("role");
                let sources: Option<serde_json::Value> = row.get("sources");
                let sources = sources
                    .map(serde_json::from_value::<Vec<Source>>)
                    .transpose()?;
                Ok(ConversationTurn {
                    role: if role == "assistant" {
                        TurnRole::Assistant
                    } else {
                        TurnRole::User
                    },
                    content: row.get("content"),
                    sources,
                    created_at: row.get("created_at"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(turns)
    }
}
