use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type, Default)]
#[sqlx(type_name = "subscription_status", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    #[default]
    Trial,
    Active,
    Expired,
    Cancelled,
    /// Internal accounts; never time-limited.
    Admin,
}

impl SubscriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SubscriptionStatus::Trial => "trial",
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Expired => "expired",
            SubscriptionStatus::Cancelled => "cancelled",
            SubscriptionStatus::Admin => "admin",
        }
    }
}

/// A tenant's subscription. `trial_ends_at` is authoritative while on trial,
/// `subscription_ends_at` while active.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct SubscriptionRecord {
    pub tenant_id: String,
    pub status: SubscriptionStatus,
    pub trial_ends_at: Option<DateTime<Utc>>,
    pub subscription_ends_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl SubscriptionRecord {
    pub fn trial(tenant_id: impl Into<String>, trial_ends_at: DateTime<Utc>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            status: SubscriptionStatus::Trial,
            trial_ends_at: Some(trial_ends_at),
            subscription_ends_at: None,
            updated_at: Utc::now(),
        }
    }

    pub fn active(tenant_id: impl Into<String>, subscription_ends_at: Option<DateTime<Utc>>) -> Self {
        Self {
            tenant_id: tenant_id.into(),
            status: SubscriptionStatus::Active,
            trial_ends_at: None,
            subscription_ends_at,
            updated_at: Utc::now(),
        }
    }

    pub async fn find_by_tenant(tenant_id: &str, pool: &PgPool) -> Result<Option<Self>> {
        sqlx::query_as::<_, Self>(
            r#"
            SELECT tenant_id, status, trial_ends_at, subscription_ends_at, updated_at
            FROM subscriptions
            WHERE tenant_id = $1
            "#,
        )
        .bind(tenant_id)
        .fetch_optional(pool)
        .await
        .map_err(Into::into)
    }

    pub async fn upsert(&self, pool: &PgPool) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (tenant_id, status, trial_ends_at, subscription_ends_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (tenant_id) DO UPDATE SET
                status = EXCLUDED.status,
                trial_ends_at = EXCLUDED.trial_ends_at,
                subscription_ends_at = EXCLUDED.subscription_ends_at,
                updated_at = NOW()
            "#,
        )
        .bind(&self.tenant_id)
        .bind(self.status)
        .bind(self.trial_ends_at)
        .bind(self.subscription_ends_at)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn update_status(
        tenant_id: &str,
        status: SubscriptionStatus,
        pool: &PgPool,
    ) -> Result<()> {
        sqlx::query("UPDATE subscriptions SET status = $2, updated_at = NOW() WHERE tenant_id = $1")
            .bind(tenant_id)
            .bind(status)
            .execute(pool)
            .await?;
        Ok(())
    }
}
