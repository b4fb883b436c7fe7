// BoundedStore - wraps any BaseStore so every persistence call has a deadline
//
// A stalled database turns into a TimedOut error at the call site instead of
// hanging a reconcile pass, a review poll or a leadership heartbeat.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::timeout::with_timeout;
use super::traits::{
    BaseAutomationStore, BaseCredentialStore, BaseHistoryStore, BaseLeadershipStore,
    BaseReplyStore, BaseStore, BaseSubscriptionStore, RefreshedCredential,
};
use crate::domains::automation::models::TenantAutomationConfig;
use crate::domains::credentials::models::Credential;
use crate::domains::history::models::AutomationHistoryEntry;
use crate::domains::leadership::models::LeadershipRecord;
use crate::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};

pub struct BoundedStore<S> {
    inner: Arc<S>,
    limit: Duration,
}

impl<S: BaseStore> BoundedStore<S> {
    pub fn new(inner: Arc<S>, limit: Duration) -> Self {
        Self { inner, limit }
    }

    pub fn inner(&self) -> &Arc<S> {
        &self.inner
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseSubscriptionStore for BoundedStore<S> {
    async fn find_subscription(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>> {
        with_timeout(self.limit, "find subscription", self.inner.find_subscription(tenant_id)).await
    }

    async fn set_subscription_status(
        &self,
        tenant_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "set subscription status",
            self.inner.set_subscription_status(tenant_id, status),
        )
        .await
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseCredentialStore for BoundedStore<S> {
    async fn find_credential(&self, tenant_id: &str) -> Result<Option<Credential>> {
        with_timeout(self.limit, "find credential", self.inner.find_credential(tenant_id)).await
    }

    async fn save_refreshed_credential(
        &self,
        tenant_id: &str,
        refreshed: &RefreshedCredential,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "save refreshed credential",
            self.inner
                .save_refreshed_credential(tenant_id, refreshed, refreshed_at),
        )
        .await
    }

    async fn mark_credential_invalid(&self, tenant_id: &str, error: &str) -> Result<()> {
        with_timeout(
            self.limit,
            "mark credential invalid",
            self.inner.mark_credential_invalid(tenant_id, error),
        )
        .await
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseAutomationStore for BoundedStore<S> {
    async fn list_automation_settings(&self) -> Result<Vec<TenantAutomationConfig>> {
        with_timeout(
            self.limit,
            "list automation settings",
            self.inner.list_automation_settings(),
        )
        .await
    }

    async fn record_run_success(
        &self,
        tenant_id: &str,
        location_id: &str,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "record run success",
            self.inner.record_run_success(tenant_id, location_id, ran_at),
        )
        .await
    }

    async fn record_run_error(&self, tenant_id: &str, location_id: &str, error: &str) -> Result<()> {
        with_timeout(
            self.limit,
            "record run error",
            self.inner.record_run_error(tenant_id, location_id, error),
        )
        .await
    }

    async fn save_account_id(
        &self,
        tenant_id: &str,
        location_id: &str,
        account_id: &str,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "save account id",
            self.inner.save_account_id(tenant_id, location_id, account_id),
        )
        .await
    }

    async fn set_next_run_at(
        &self,
        tenant_id: &str,
        location_id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "set next run",
            self.inner.set_next_run_at(tenant_id, location_id, next_run_at),
        )
        .await
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseLeadershipStore for BoundedStore<S> {
    async fn find_leader(&self, role: &str) -> Result<Option<LeadershipRecord>> {
        with_timeout(self.limit, "find leader", self.inner.find_leader(role)).await
    }

    async fn try_claim_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        with_timeout(
            self.limit,
            "claim leadership",
            self.inner
                .try_claim_leadership(role, holder_id, now, stale_before, metadata),
        )
        .await
    }

    async fn heartbeat_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        with_timeout(
            self.limit,
            "leadership heartbeat",
            self.inner.heartbeat_leadership(role, holder_id, now),
        )
        .await
    }

    async fn release_leadership(&self, role: &str, holder_id: &str) -> Result<bool> {
        with_timeout(
            self.limit,
            "release leadership",
            self.inner.release_leadership(role, holder_id),
        )
        .await
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseHistoryStore for BoundedStore<S> {
    async fn record_history(&self, entry: &AutomationHistoryEntry) -> Result<()> {
        with_timeout(self.limit, "record history", self.inner.record_history(entry)).await
    }
}

#[async_trait]
impl<S: BaseStore + 'static> BaseReplyStore for BoundedStore<S> {
    async fn replied_review_ids(&self, tenant_id: &str, location_id: &str) -> Result<HashSet<String>> {
        with_timeout(
            self.limit,
            "list replied reviews",
            self.inner.replied_review_ids(tenant_id, location_id),
        )
        .await
    }

    async fn mark_review_replied(
        &self,
        tenant_id: &str,
        location_id: &str,
        review_id: &str,
        replied_at: DateTime<Utc>,
    ) -> Result<()> {
        with_timeout(
            self.limit,
            "mark review replied",
            self.inner
                .mark_review_replied(tenant_id, location_id, review_id, replied_at),
        )
        .await
    }
}
