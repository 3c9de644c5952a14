//! Conversation repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use chatvault_core::{
    Conversation, ConversationRef, ConversationRepository, Error, Page, PageRequest, Result,
    UpsertOutcome, Upserted,
};

const COLUMNS: &str = "id, peer_kind, remote_id, title, created_at, updated_at";

/// PostgreSQL implementation of ConversationRepository.
pub struct PgConversationRepository {
    pool: Pool<Postgres>,
}

impl PgConversationRepository {
    /// Create a new PgConversationRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_conversation(row: &PgRow) -> Result<Conversation> {
    let kind: String = row.try_get("peer_kind")?;
    Ok(Conversation {
        id: row.try_get("id")?,
        remote: ConversationRef::new(kind.parse()?, row.try_get("remote_id")?),
        title: row.try_get("title")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ConversationRepository for PgConversationRepository {
    async fn upsert(&self, remote: ConversationRef, title: &str) -> Result<Upserted<Conversation>> {
        let now = Utc::now();

        // The conflict branch only writes when the title actually changed; an
        // unchanged row yields no RETURNING row and is read back below.
        let row = sqlx::query(&format!(
            "INSERT INTO conversation (id, peer_kind, remote_id, title, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $5)
             ON CONFLICT (peer_kind, remote_id) DO UPDATE
                SET title = EXCLUDED.title, updated_at = EXCLUDED.updated_at
                WHERE conversation.title IS DISTINCT FROM EXCLUDED.title
             RETURNING {COLUMNS}, (xmax = 0) AS inserted"
        ))
        .bind(Uuid::now_v7())
        .bind(remote.kind.as_str())
        .bind(remote.remote_id)
        .bind(title)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            let inserted: bool = row.try_get("inserted")?;
            let outcome = if inserted {
                UpsertOutcome::Inserted
            } else {
                UpsertOutcome::Updated
            };
            return Ok(Upserted::new(row_to_conversation(&row)?, outcome));
        }

        let existing = self.find_by_remote(remote).await?.ok_or_else(|| {
            Error::Internal(format!(
                "conversation {}:{} vanished during upsert",
                remote.kind.as_str(),
                remote.remote_id
            ))
        })?;
        Ok(Upserted::new(existing, UpsertOutcome::Unchanged))
    }

    async fn find_by_remote(&self, remote: ConversationRef) -> Result<Option<Conversation>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM conversation WHERE peer_kind = $1 AND remote_id = $2"
        ))
        .bind(remote.kind.as_str())
        .bind(remote.remote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_conversation).transpose()
    }

    async fn get(&self, id: Uuid) -> Result<Conversation> {
        let row = sqlx::query(&format!("SELECT {COLUMNS} FROM conversation WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?
            .ok_or_else(|| Error::NotFound(format!("conversation {}", id)))?;

        row_to_conversation(&row)
    }

    async fn list(&self, page: PageRequest) -> Result<Page<Conversation>> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversation")
            .fetch_one(&self.pool)
            .await
            .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM conversation ORDER BY created_at DESC, id DESC LIMIT $1 OFFSET $2"
        ))
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(row_to_conversation)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, total })
    }
}
