//! PostgreSQL implementation of the store traits.
//!
//! Thin delegation to the model associated functions; all SQL lives with the
//! models.

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;
use tracing::warn;

use crate::domains::automation::models::{AutomationSettingsRow, TenantAutomationConfig};
use crate::domains::credentials::models::Credential;
use crate::domains::history::models::AutomationHistoryEntry;
use crate::domains::leadership::models::LeadershipRecord;
use crate::domains::reviews::models::RepliedReview;
use crate::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};
use crate::kernel::traits::{
    BaseAutomationStore, BaseCredentialStore, BaseHistoryStore, BaseLeadershipStore,
    BaseReplyStore, BaseSubscriptionStore, RefreshedCredential,
};

#[derive(Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[async_trait]
impl BaseSubscriptionStore for PostgresStore {
    async fn find_subscription(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>> {
        SubscriptionRecord::find_by_tenant(tenant_id, &self.pool).await
    }

    async fn set_subscription_status(
        &self,
        tenant_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        SubscriptionRecord::update_status(tenant_id, status, &self.pool).await
    }
}

#[async_trait]
impl BaseCredentialStore for PostgresStore {
    async fn find_credential(&self, tenant_id: &str) -> Result<Option<Credential>> {
        Credential::find_by_tenant(tenant_id, &self.pool).await
    }

    async fn save_refreshed_credential(
        &self,
        tenant_id: &str,
        refreshed: &RefreshedCredential,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        Credential::save_refreshed(
            tenant_id,
            &refreshed.access_token,
            refreshed.expires_at,
            refreshed.refresh_token.as_deref(),
            refreshed_at,
            &self.pool,
        )
        .await
    }

    async fn mark_credential_invalid(&self, tenant_id: &str, error: &str) -> Result<()> {
        Credential::mark_invalid(tenant_id, error, &self.pool).await
    }
}

#[async_trait]
impl BaseAutomationStore for PostgresStore {
    async fn list_automation_settings(&self) -> Result<Vec<TenantAutomationConfig>> {
        let rows = AutomationSettingsRow::find_all(&self.pool).await?;
        let mut configs = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match TenantAutomationConfig::try_from(row) {
                Ok(config) => configs.push(config),
                Err(e) => warn!(settings_id = %id, error = %e, "Skipping unusable automation settings row"),
            }
        }
        Ok(configs)
    }

    async fn record_run_success(
        &self,
        tenant_id: &str,
        location_id: &str,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        AutomationSettingsRow::record_success(tenant_id, location_id, ran_at, &self.pool).await
    }

    async fn record_run_error(
        &self,
        tenant_id: &str,
        location_id: &str,
        error: &str,
    ) -> Result<()> {
        AutomationSettingsRow::record_error(tenant_id, location_id, error, &self.pool).await
    }

    async fn save_account_id(
        &self,
        tenant_id: &str,
        location_id: &str,
        account_id: &str,
    ) -> Result<()> {
        AutomationSettingsRow::save_account_id(tenant_id, location_id, account_id, &self.pool).await
    }

    async fn set_next_run_at(
        &self,
        tenant_id: &str,
        location_id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        AutomationSettingsRow::set_next_run_at(tenant_id, location_id, next_run_at, &self.pool)
            .await
    }
}

#[async_trait]
impl BaseLeadershipStore for PostgresStore {
    async fn find_leader(&self, role: &str) -> Result<Option<LeadershipRecord>> {
        LeadershipRecord::find(role, &self.pool).await
    }

    async fn try_claim_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        LeadershipRecord::try_claim(role, holder_id, now, stale_before, metadata, &self.pool).await
    }

    async fn heartbeat_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        LeadershipRecord::heartbeat(role, holder_id, now, &self.pool).await
    }

    async fn release_leadership(&self, role: &str, holder_id: &str) -> Result<bool> {
        LeadershipRecord::release(role, holder_id, &self.pool).await
    }
}

#[async_trait]
impl BaseHistoryStore for PostgresStore {
    async fn record_history(&self, entry: &AutomationHistoryEntry) -> Result<()> {
        entry.insert(&self.pool).await
    }
}

#[async_trait]
impl BaseReplyStore for PostgresStore {
    async fn replied_review_ids(
        &self,
        tenant_id: &str,
        location_id: &str,
    ) -> Result<HashSet<String>> {
        RepliedReview::ids_for_location(tenant_id, location_id, &self.pool).await
    }

    async fn mark_review_replied(
        &self,
        tenant_id: &str,
        location_id: &str,
        review_id: &str,
        replied_at: DateTime<Utc>,
    ) -> Result<()> {
        RepliedReview {
            tenant_id: tenant_id.to_string(),
            location_id: location_id.to_string(),
            review_id: review_id.to_string(),
            replied_at,
        }
        .insert(&self.pool)
        .await
    }
}
