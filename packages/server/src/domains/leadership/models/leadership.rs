use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::PgPool;

/// Coordination role the scheduler elects a leader for.
pub const SCHEDULER_ROLE: &str = "scheduler";

/// Singleton row per role naming the current holder.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct LeadershipRecord {
    pub role: String,
    pub holder_id: String,
    pub heartbeat_at: DateTime<Utc>,
    pub acquired_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl LeadershipRecord {
    /// Whether the holder's heartbeat is older than `timeout`.
    pub fn is_stale_at(&self, now: DateTime<Utc>, timeout: chrono::Duration) -> bool {
        now - self.heartbeat_at > timeout
    }

    pub async fn find(role: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            "SELECT role, holder_id, heartbeat_at, acquired_at, metadata FROM leadership WHERE role = $1",
        )
        .bind(role)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    /// Single-statement conditional claim.
    ///
    /// Inserts the row if absent, or takes it over when the current heartbeat
    /// is older than `stale_before` (or the row is already ours). Returns
    /// whether a row was written; callers re-read to confirm.
    pub async fn try_claim(
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        metadata: &serde_json::Value,
        pool: &PgPool,
    ) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO leadership (role, holder_id, heartbeat_at, acquired_at, metadata)
            VALUES ($1, $2, $3, $3, $4)
            ON CONFLICT (role) DO UPDATE SET
                holder_id = EXCLUDED.holder_id,
                heartbeat_at = EXCLUDED.heartbeat_at,
                acquired_at = EXCLUDED.acquired_at,
                metadata = EXCLUDED.metadata
            WHERE leadership.heartbeat_at < $5
               OR leadership.holder_id = EXCLUDED.holder_id
            "#,
        )
        .bind(role)
        .bind(holder_id)
        .bind(now)
        .bind(metadata)
        .bind(stale_before)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Refresh the heartbeat. `false` means someone else holds the row.
    pub async fn heartbeat(
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        pool: &PgPool,
    ) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE leadership SET heartbeat_at = $3 WHERE role = $1 AND holder_id = $2",
        )
        .bind(role)
        .bind(holder_id)
        .bind(now)
        .execute(pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete the row only if `holder_id` still holds it.
    pub async fn release(role: &str, holder_id: &str, pool: &PgPool) -> Result<bool> {
        let result = sqlx::query("DELETE FROM leadership WHERE role = $1 AND holder_id = $2")
            .bind(role)
            .bind(holder_id)
            .execute(pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
