// Trait definitions for dependency injection
//
// These are INFRASTRUCTURE traits only - no business logic.
// Scheduling, gating and execution are domain components that take these
// traits through their constructors.
//
// Naming convention: Base* for trait names (e.g., BasePublisher, BaseLeadershipStore)

use std::collections::HashSet;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domains::automation::models::TenantAutomationConfig;
use crate::domains::credentials::models::Credential;
use crate::domains::history::models::AutomationHistoryEntry;
use crate::domains::leadership::models::LeadershipRecord;
use crate::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};

// =============================================================================
// Content Generator Trait (Infrastructure - LLM text)
// =============================================================================

#[async_trait]
pub trait BaseContentGenerator: Send + Sync {
    /// Generate text for a prompt (returns raw text)
    async fn generate(&self, prompt: &str) -> Result<String>;
}

// =============================================================================
// Publisher Trait (Infrastructure - Business Profile API)
// =============================================================================

/// Classified provider failure. Adapters wrap this in `anyhow::Error` so
/// callers can `downcast_ref` it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PublishError {
    /// Will fail again if retried (bad request, auth, missing resource)
    #[error("provider rejected request ({status:?}): {message}")]
    Permanent { status: Option<u16>, message: String },

    /// May succeed later (rate limit, 5xx, network)
    #[error("provider unavailable: {0}")]
    Transient(String),
}

impl PublishError {
    pub fn is_auth_failure(&self) -> bool {
        matches!(
            self,
            PublishError::Permanent {
                status: Some(401) | Some(403),
                ..
            }
        )
    }
}

#[derive(Debug, Clone)]
pub struct PublishedPost {
    /// Provider resource name of the created post
    pub post_id: String,
}

#[derive(Debug, Clone)]
pub struct ReviewSummary {
    pub review_id: String,
    pub reviewer_name: Option<String>,
    /// 1..=5, 0 when unknown
    pub star_rating: u8,
    pub comment: Option<String>,
    /// The provider already shows an owner reply
    pub has_reply: bool,
}

#[async_trait]
pub trait BasePublisher: Send + Sync {
    async fn create_post(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        summary: &str,
    ) -> Result<PublishedPost>;

    async fn list_reviews(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
    ) -> Result<Vec<ReviewSummary>>;

    async fn reply_to_review(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        review_id: &str,
        comment: &str,
    ) -> Result<()>;

    /// Account ids the token can manage (bare ids, no `accounts/` prefix)
    async fn list_accounts(&self, access_token: &str) -> Result<Vec<String>>;
}

// =============================================================================
// OAuth Token Endpoint Trait (Infrastructure)
// =============================================================================

#[derive(Clone)]
pub struct RefreshedCredential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
    /// Present only when the provider rotated the refresh token
    pub refresh_token: Option<String>,
}

impl std::fmt::Debug for RefreshedCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RefreshedCredential")
            .field("expires_at", &self.expires_at)
            .field("rotated", &self.refresh_token.is_some())
            .finish_non_exhaustive()
    }
}

#[async_trait]
pub trait BaseTokenEndpoint: Send + Sync {
    /// Refresh-token grant
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedCredential>;
}

// =============================================================================
// Store Traits (Infrastructure - persistence)
// =============================================================================

#[async_trait]
pub trait BaseSubscriptionStore: Send + Sync {
    async fn find_subscription(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>>;

    async fn set_subscription_status(
        &self,
        tenant_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()>;
}

#[async_trait]
pub trait BaseCredentialStore: Send + Sync {
    async fn find_credential(&self, tenant_id: &str) -> Result<Option<Credential>>;

    async fn save_refreshed_credential(
        &self,
        tenant_id: &str,
        refreshed: &RefreshedCredential,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn mark_credential_invalid(&self, tenant_id: &str, error: &str) -> Result<()>;
}

#[async_trait]
pub trait BaseAutomationStore: Send + Sync {
    /// All configs with posting or replies enabled, aliases resolved
    async fn list_automation_settings(&self) -> Result<Vec<TenantAutomationConfig>>;

    async fn record_run_success(
        &self,
        tenant_id: &str,
        location_id: &str,
        ran_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn record_run_error(&self, tenant_id: &str, location_id: &str, error: &str)
        -> Result<()>;

    async fn save_account_id(
        &self,
        tenant_id: &str,
        location_id: &str,
        account_id: &str,
    ) -> Result<()>;

    async fn set_next_run_at(
        &self,
        tenant_id: &str,
        location_id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()>;
}

#[async_trait]
pub trait BaseLeadershipStore: Send + Sync {
    async fn find_leader(&self, role: &str) -> Result<Option<LeadershipRecord>>;

    /// Atomic conditional upsert: succeeds when the row is absent, its
    /// heartbeat is older than `stale_before`, or it is already ours.
    async fn try_claim_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<bool>;

    /// Returns false when `holder_id` no longer holds the role
    async fn heartbeat_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool>;

    /// Delete the row if `holder_id` still holds it
    async fn release_leadership(&self, role: &str, holder_id: &str) -> Result<bool>;
}

#[async_trait]
pub trait BaseHistoryStore: Send + Sync {
    async fn record_history(&self, entry: &AutomationHistoryEntry) -> Result<()>;
}

#[async_trait]
pub trait BaseReplyStore: Send + Sync {
    async fn replied_review_ids(&self, tenant_id: &str, location_id: &str)
        -> Result<HashSet<String>>;

    async fn mark_review_replied(
        &self,
        tenant_id: &str,
        location_id: &str,
        review_id: &str,
        replied_at: DateTime<Utc>,
    ) -> Result<()>;
}

/// Every store concern in one bound, for adapters that implement them all.
pub trait BaseStore:
    BaseSubscriptionStore
    + BaseCredentialStore
    + BaseAutomationStore
    + BaseLeadershipStore
    + BaseHistoryStore
    + BaseReplyStore
{
}

impl<T> BaseStore for T where
    T: BaseSubscriptionStore
        + BaseCredentialStore
        + BaseAutomationStore
        + BaseLeadershipStore
        + BaseHistoryStore
        + BaseReplyStore
{
}
