//! Short-retention message persistence.
//!
//! Messages are fan-out delivered live; the table only backs the retention
//! window and is swept by housekeeping.

use {chrono::Duration, sqlx::PgPool};

use crate::error::Result;

/// Messages older than this are purged by the housekeeping sweep.
pub const RETENTION_HOURS: i64 = 24;

#[derive(Clone)]
pub struct MessageStore {
    pool: PgPool,
}

impl MessageStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert(
        &self,
        id: &str,
        room_id: &str,
        sender_id: Option<&str>,
        body: &str,
    ) -> Result<()> {
        sqlx::query(
            "INSERT INTO chat_messages (id, room_id, sender_id, body) VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(room_id)
        .bind(sender_id)
        .bind(body)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Drop everything outside the retention window. Returns rows purged.
    pub async fn purge_expired(&self) -> Result<u64> {
        let cutoff = chrono::Utc::now() - Duration::hours(RETENTION_HOURS);
        let result = sqlx::query("DELETE FROM chat_messages WHERE created_at < $1")
            .bind(cutoff)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
