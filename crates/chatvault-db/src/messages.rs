//! Message repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use tracing::debug;
use uuid::Uuid;

use chatvault_core::{
    Error, ListMessagesRequest, Message, MessageRepository, NewMessage, Page, Result,
    UpsertOutcome, Upserted,
};

const COLUMNS: &str = "id, remote_message_id, conversation_id, author_id, content, kind, \
                       media_locator, sent_at, created_at, updated_at";

/// PostgreSQL implementation of MessageRepository.
pub struct PgMessageRepository {
    pool: Pool<Postgres>,
}

impl PgMessageRepository {
    /// Create a new PgMessageRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_message(row: &PgRow) -> Result<Message> {
    let kind: String = row.try_get("kind")?;
    Ok(Message {
        id: row.try_get("id")?,
        remote_message_id: row.try_get("remote_message_id")?,
        conversation_id: row.try_get("conversation_id")?,
        author_id: row.try_get("author_id")?,
        content: row.try_get("content")?,
        kind: kind.parse()?,
        media_locator: row.try_get("media_locator")?,
        sent_at: row.try_get("sent_at")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl MessageRepository for PgMessageRepository {
    async fn upsert(&self, message: NewMessage) -> Result<Upserted<Message>> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO message (id, remote_message_id, conversation_id, author_id, content, kind,
                                  sent_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $8)
             ON CONFLICT (remote_message_id, conversation_id) DO NOTHING
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(message.remote_message_id)
        .bind(message.conversation_id)
        .bind(message.author_id)
        .bind(&message.content)
        .bind(message.kind.as_str())
        .bind(message.sent_at)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok(Upserted::new(row_to_message(&row)?, UpsertOutcome::Inserted));
        }

        let existing = self
            .find(message.remote_message_id, message.conversation_id)
            .await?
            .ok_or_else(|| {
                Error::Internal(format!(
                    "message {} in {} vanished during upsert",
                    message.remote_message_id, message.conversation_id
                ))
            })?;
        Ok(Upserted::new(existing, UpsertOutcome::Unchanged))
    }

    async fn find(&self, remote_message_id: i64, conversation_id: Uuid) -> Result<Option<Message>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM message WHERE remote_message_id = $1 AND conversation_id = $2"
        ))
        .bind(remote_message_id)
        .bind(conversation_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_message).transpose()
    }

    async fn set_media_locator(
        &self,
        remote_message_id: i64,
        conversation_id: Uuid,
        locator: &str,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE message SET media_locator = $1, updated_at = $2
             WHERE remote_message_id = $3 AND conversation_id = $4",
        )
        .bind(locator)
        .bind(Utc::now())
        .bind(remote_message_id)
        .bind(conversation_id)
        .execute(&self.pool)
        .await
        .map_err(Error::Database)?;

        debug!(
            subsystem = "db",
            component = "messages",
            op = "set_media_locator",
            remote_message_id,
            %conversation_id,
            rows_affected = result.rows_affected(),
            "Media locator updated"
        );
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self, req: ListMessagesRequest) -> Result<Page<Message>> {
        let kind = req.kind.map(|k| k.as_str());

        let total: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM message
             WHERE conversation_id = $1 AND ($2::text IS NULL OR kind = $2)",
        )
        .bind(req.conversation_id)
        .bind(kind)
        .fetch_one(&self.pool)
        .await
        .map_err(Error::Database)?;

        let rows = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM message
             WHERE conversation_id = $1 AND ($2::text IS NULL OR kind = $2)
             ORDER BY remote_message_id DESC
             LIMIT $3 OFFSET $4"
        ))
        .bind(req.conversation_id)
        .bind(kind)
        .bind(req.page.limit)
        .bind(req.page.offset)
        .fetch_all(&self.pool)
        .await
        .map_err(Error::Database)?;

        let items = rows
            .iter()
            .map(row_to_message)
            .collect::<Result<Vec<_>>>()?;

        Ok(Page { items, total })
    }
}
