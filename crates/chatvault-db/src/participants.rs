//! Participant repository implementation.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::PgRow;
use sqlx::{Pool, Postgres, Row};
use uuid::Uuid;

use chatvault_core::{
    Error, Participant, ParticipantRepository, Result, UpsertOutcome, Upserted,
};

const COLUMNS: &str = "id, remote_id, display_name, created_at, updated_at";

/// PostgreSQL implementation of ParticipantRepository.
pub struct PgParticipantRepository {
    pool: Pool<Postgres>,
}

impl PgParticipantRepository {
    /// Create a new PgParticipantRepository with the given connection pool.
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

fn row_to_participant(row: &PgRow) -> Result<Participant> {
    Ok(Participant {
        id: row.try_get("id")?,
        remote_id: row.try_get("remote_id")?,
        display_name: row.try_get("display_name")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

#[async_trait]
impl ParticipantRepository for PgParticipantRepository {
    async fn find_by_remote(&self, remote_id: i64) -> Result<Option<Participant>> {
        let row = sqlx::query(&format!(
            "SELECT {COLUMNS} FROM participant WHERE remote_id = $1"
        ))
        .bind(remote_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        row.as_ref().map(row_to_participant).transpose()
    }

    async fn ensure(&self, remote_id: i64, display_name: &str) -> Result<Upserted<Participant>> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO participant (id, remote_id, display_name, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $4)
             ON CONFLICT (remote_id) DO NOTHING
             RETURNING {COLUMNS}"
        ))
        .bind(Uuid::now_v7())
        .bind(remote_id)
        .bind(display_name)
        .bind(now)
        .fetch_optional(&self.pool)
        .await
        .map_err(Error::Database)?;

        if let Some(row) = row {
            return Ok(Upserted::new(
                row_to_participant(&row)?,
                UpsertOutcome::Inserted,
            ));
        }

        let existing = self
            .find_by_remote(remote_id)
            .await?
            .ok_or_else(|| Error::Internal(format!("participant {} vanished", remote_id)))?;
        Ok(Upserted::new(existing, UpsertOutcome::Unchanged))
    }
}
