//! # chatvault-db
//!
//! PostgreSQL persistence and object storage for chatvault.
//!
//! This crate provides:
//! - Connection pool management
//! - Repository implementations for conversations, participants and messages
//! - A filesystem object store with signed read URLs
//! - In-memory repositories for tests and dry runs
//!
//! ## Example
//!
//! ```rust,ignore
//! use chatvault_db::Database;
//!
//! let db = Database::connect("postgres://localhost/chatvault").await?;
//! db.migrate().await?;
//! let page = db.conversations.list(PageRequest::default()).await?;
//! ```

pub mod conversations;
pub mod memory;
pub mod messages;
pub mod object_storage;
pub mod participants;
pub mod pool;
pub mod test_fixtures;

pub use conversations::PgConversationRepository;
pub use memory::{
    MemoryConversationRepository, MemoryMessageRepository, MemoryObjectStore,
    MemoryParticipantRepository, StoredObject,
};
pub use messages::PgMessageRepository;
pub use object_storage::{verify_signature, FilesystemObjectStore, StorageConfig};
pub use participants::PgParticipantRepository;
pub use pool::{create_pool, create_pool_with_config, PoolConfig};

// Re-export core types
pub use chatvault_core::*;

/// Combined database access for the archive.
pub struct Database {
    /// The underlying connection pool.
    pub pool: sqlx::Pool<sqlx::Postgres>,
    /// Conversation repository.
    pub conversations: PgConversationRepository,
    /// Participant repository.
    pub participants: PgParticipantRepository,
    /// Message repository.
    pub messages: PgMessageRepository,
}

impl Clone for Database {
    fn clone(&self) -> Self {
        Self::new(self.pool.clone())
    }
}

impl Database {
    /// Create a new database instance from a connection pool.
    pub fn new(pool: sqlx::Pool<sqlx::Postgres>) -> Self {
        Self {
            conversations: PgConversationRepository::new(pool.clone()),
            participants: PgParticipantRepository::new(pool.clone()),
            messages: PgMessageRepository::new(pool.clone()),
            pool,
        }
    }

    /// Connect to database with default configuration.
    pub async fn connect(url: &str) -> Result<Self> {
        let pool = create_pool(url).await?;
        Ok(Self::new(pool))
    }

    /// Create with custom pool configuration.
    pub async fn connect_with_config(url: &str, config: PoolConfig) -> Result<Self> {
        let pool = create_pool_with_config(url, config).await?;
        Ok(Self::new(pool))
    }

    /// Run pending migrations.
    #[cfg(feature = "migrations")]
    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("../../migrations")
            .run(&self.pool)
            .await
            .map_err(|e| Error::Database(sqlx::Error::Migrate(Box::new(e))))?;
        Ok(())
    }

    /// Get the underlying connection pool.
    pub fn pool(&self) -> &sqlx::Pool<sqlx::Postgres> {
        &self.pool
    }
}
