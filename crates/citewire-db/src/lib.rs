//! # citewire-db
//!
//! PostgreSQL + pgvector adapters for the citewire corpus.
//!
//! This crate provides:
//! - Connection pool management
//! - The chunk vector index (pgvector cosine search)
//! - The chunk lexical index (tsvector keyword search)
//! - Article/insight and conversation-turn repositories
//!
//! Schema and migrations are managed by the ingestion service; this crate
//! only queries and upserts through the `citewire-core` trait contracts.

pub mod articles;
pub mod chunks;
pub mod conversation;
pub mod pool;

use std::sync::Arc;

use sqlx::postgres::PgPool;

use citewire_core::Result;

pub use articles::PgArticleStore;
pub use chunks::PgChunkIndex;
pub use conversation::PgConversationStore;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

/// Database facade bundling all repositories over one shared pool.
#[derive(Clone)]
pub struct Database {
    pool: PgPool,
    pub chunks: Arc<PgChunkIndex>,
    pub articles: Arc<PgArticleStore>,
    pub conversations: Arc<PgConversationStore>,
}

impl Database {
    /// Connect with default pool configuration.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = create_pool(database_url).await?;
        Ok(Self::from_pool(pool))
    }

    /// Build the facade from an existing pool.
    pub fn from_pool(pool: PgPool) -> Self {
        Self {
            chunks: Arc::new(PgChunkIndex::new(pool.clone())),
            articles: Arc::new(PgArticleStore::new(pool.clone())),
            conversations: Arc::new(PgConversationStore::new(pool.clone())),
            pool,
        }
    }

    /// Access the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}
