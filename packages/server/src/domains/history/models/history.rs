use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use crate::domains::automation::models::{ActionKey, ActionKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "automation_outcome", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum HistoryOutcome {
    Success,
    Failure,
    /// Denied by the subscription guard.
    Blocked,
    Skipped,
}

/// Append-only record of one automation outcome.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AutomationHistoryEntry {
    pub id: Uuid,
    pub tenant_id: String,
    pub location_id: String,
    pub action: ActionKind,
    pub outcome: HistoryOutcome,
    pub detail: Option<String>,
    /// Post name or review id on the provider side.
    pub external_id: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

impl AutomationHistoryEntry {
    pub fn new(key: &ActionKey, outcome: HistoryOutcome, recorded_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::now_v7(),
            tenant_id: key.tenant_id.clone(),
            location_id: key.location_id.clone(),
            action: key.kind,
            outcome,
            detail: None,
            external_id: None,
            recorded_at,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }

    pub fn with_external_id(mut self, external_id: impl Into<String>) -> Self {
        self.external_id = Some(external_id.into());
        self
    }

    pub async fn insert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO automation_history
                (id, tenant_id, location_id, action, outcome, detail, external_id, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(self.id)
        .bind(&self.tenant_id)
        .bind(&self.location_id)
        .bind(self.action)
        .bind(self.outcome)
        .bind(&self.detail)
        .bind(&self.external_id)
        .bind(self.recorded_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn find_for_location(
        tenant_id: &str,
        location_id: &str,
        limit: i64,
        pool: &PgPool,
    ) -> Result<Vec<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT * FROM automation_history
            WHERE tenant_id = $1 AND location_id = $2
            ORDER BY recorded_at DESC
            LIMIT $3
            "#,
        )
        .bind(tenant_id)
        .bind(location_id)
        .bind(limit)
        .fetch_all(pool)
        .await
        .map_err(Into::into)
    }
}
