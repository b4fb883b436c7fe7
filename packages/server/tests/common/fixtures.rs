//! Test fixtures for creating scheduler data.
//!
//! These fixtures use the model methods directly.

use anyhow::Result;
use automation_core::domains::automation::models::UpsertAutomationSettings;
use automation_core::domains::credentials::models::Credential;
use automation_core::domains::subscriptions::models::SubscriptionRecord;
use chrono::{DateTime, Duration, NaiveTime, Utc};
use sqlx::PgPool;
use uuid::Uuid;

/// Tenant id unique to one test, so tests can share the database.
pub fn unique_tenant(prefix: &str) -> String {
    format!("{}-{}", prefix, Uuid::new_v4())
}

pub async fn create_trial(pool: &PgPool, tenant_id: &str, ends_at: DateTime<Utc>) -> Result<()> {
    SubscriptionRecord::trial(tenant_id, ends_at).upsert(pool).await
}

pub async fn create_daily_settings(
    pool: &PgPool,
    tenant_id: &str,
    location_id: &str,
    post_time: NaiveTime,
) -> Result<()> {
    UpsertAutomationSettings::builder()
        .tenant_id(tenant_id)
        .location_id(location_id)
        .cadence(Some("daily"))
        .post_time(Some(post_time))
        .business_name(Some("Test Bakery"))
        .build()
        .execute(pool)
        .await?;
    Ok(())
}

/// Credential that stays valid for an hour.
pub async fn create_valid_credential(pool: &PgPool, tenant_id: &str) -> Result<()> {
    Credential::new(
        tenant_id,
        "access-token",
        "refresh-token",
        Utc::now() + Duration::hours(1),
    )
    .upsert(pool)
    .await
}
