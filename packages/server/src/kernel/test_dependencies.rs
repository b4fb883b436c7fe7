// TestDependencies - mock implementations for testing
//
// Provides an in-memory store and mock providers that can be injected into
// ServerKernel for tests.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::bounded_store::BoundedStore;
use super::deps::ServerDeps;
use super::server_kernel::ServerKernel;
use super::traits::{
    BaseAutomationStore, BaseContentGenerator, BaseCredentialStore, BaseHistoryStore,
    BaseLeadershipStore, BasePublisher, BaseReplyStore, BaseSubscriptionStore, BaseTokenEndpoint,
    PublishError, PublishedPost, RefreshedCredential, ReviewSummary,
};
use crate::config::SchedulerSettings;
use crate::domains::automation::models::TenantAutomationConfig;
use crate::domains::credentials::models::Credential;
use crate::domains::history::models::AutomationHistoryEntry;
use crate::domains::leadership::models::LeadershipRecord;
use crate::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};

// =============================================================================
// Memory Store
// =============================================================================

type LocationKey = (String, String);

/// In-memory implementation of every store trait.
#[derive(Default)]
pub struct MemoryStore {
    subscriptions: Mutex<HashMap<String, SubscriptionRecord>>,
    credentials: Mutex<HashMap<String, Credential>>,
    automation: Mutex<Vec<TenantAutomationConfig>>,
    leadership: Mutex<HashMap<String, LeadershipRecord>>,
    history: Mutex<Vec<AutomationHistoryEntry>>,
    replied: Mutex<HashMap<LocationKey, HashSet<String>>>,
    fail_subscription_reads: AtomicBool,
    fail_subscription_writes: AtomicBool,
    fail_settings_reads: AtomicBool,
    fail_heartbeats: AtomicBool,
    stall: Mutex<Option<Duration>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_failing_subscription_reads(self) -> Self {
        self.fail_subscription_reads.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_failing_subscription_writes(self) -> Self {
        self.fail_subscription_writes.store(true, Ordering::SeqCst);
        self
    }

    pub fn set_fail_settings_reads(&self, fail: bool) {
        self.fail_settings_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_heartbeats(&self, fail: bool) {
        self.fail_heartbeats.store(fail, Ordering::SeqCst);
    }

    /// Delay subscription, settings, leadership and history calls, for
    /// timeout tests. `None` restores immediate answers.
    pub fn set_stall(&self, delay: Option<Duration>) {
        *self.stall.lock().unwrap() = delay;
    }

    async fn stall_if_set(&self) {
        let delay = *self.stall.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    pub fn put_subscription(&self, record: SubscriptionRecord) {
        self.subscriptions
            .lock()
            .unwrap()
            .insert(record.tenant_id.clone(), record);
    }

    pub fn put_credential(&self, credential: Credential) {
        self.credentials
            .lock()
            .unwrap()
            .insert(credential.tenant_id.clone(), credential);
    }

    /// Insert or replace the config for its (tenant, location).
    pub fn put_automation(&self, config: TenantAutomationConfig) {
        let mut configs = self.automation.lock().unwrap();
        configs.retain(|c| !(c.tenant_id == config.tenant_id && c.location_id == config.location_id));
        configs.push(config);
    }

    pub fn put_replied(&self, tenant_id: &str, location_id: &str, review_id: &str) {
        self.replied
            .lock()
            .unwrap()
            .entry((tenant_id.to_string(), location_id.to_string()))
            .or_default()
            .insert(review_id.to_string());
    }

    pub fn subscription(&self, tenant_id: &str) -> Option<SubscriptionRecord> {
        self.subscriptions.lock().unwrap().get(tenant_id).cloned()
    }

    pub fn credential(&self, tenant_id: &str) -> Option<Credential> {
        self.credentials.lock().unwrap().get(tenant_id).cloned()
    }

    pub fn automation(&self, tenant_id: &str, location_id: &str) -> Option<TenantAutomationConfig> {
        self.automation
            .lock()
            .unwrap()
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.location_id == location_id)
            .cloned()
    }

    pub fn history(&self) -> Vec<AutomationHistoryEntry> {
        self.history.lock().unwrap().clone()
    }

    pub fn leader(&self, role: &str) -> Option<LeadershipRecord> {
        self.leadership.lock().unwrap().get(role).cloned()
    }

    pub fn replied_ids(&self, tenant_id: &str, location_id: &str) -> HashSet<String> {
        self.replied
            .lock()
            .unwrap()
            .get(&(tenant_id.to_string(), location_id.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn update_automation(
        &self,
        tenant_id: &str,
        location_id: &str,
        apply: impl FnOnce(&mut TenantAutomationConfig),
    ) {
        let mut configs = self.automation.lock().unwrap();
        if let Some(config) = configs
            .iter_mut()
            .find(|c| c.tenant_id == tenant_id && c.location_id == location_id)
        {
            apply(config);
        }
    }
}

#[async_trait]
impl BaseSubscriptionStore for MemoryStore {
    async fn find_subscription(&self, tenant_id: &str) -> Result<Option<SubscriptionRecord>> {
        self.stall_if_set().await;
        if self.fail_subscription_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("subscription store unavailable"));
        }
        Ok(self.subscription(tenant_id))
    }

    async fn set_subscription_status(
        &self,
        tenant_id: &str,
        status: SubscriptionStatus,
    ) -> Result<()> {
        if self.fail_subscription_writes.load(Ordering::SeqCst) {
            return Err(anyhow!("subscription store rejected write"));
        }
        if let Some(record) = self.subscriptions.lock().unwrap().get_mut(tenant_id) {
            record.status = status;
            record.updated_at = Utc::now();
        }
        Ok(())
    }
}

#[async_trait]
impl BaseCredentialStore for MemoryStore {
    async fn find_credential(&self, tenant_id: &str) -> Result<Option<Credential>> {
        Ok(self.credential(tenant_id))
    }

    async fn save_refreshed_credential(
        &self,
        tenant_id: &str,
        refreshed: &RefreshedCredential,
        refreshed_at: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(cred) = self.credentials.lock().unwrap().get_mut(tenant_id) {
            cred.access_token = refreshed.access_token.clone();
            cred.expires_at = refreshed.expires_at;
            if let Some(rotated) = &refreshed.refresh_token {
                cred.refresh_token = Some(rotated.clone());
            }
            cred.invalid = false;
            cred.last_error = None;
            cred.refreshed_at = Some(refreshed_at);
        }
        Ok(())
    }

    async fn mark_credential_invalid(&self, tenant_id: &str, error: &str) -> Result<()> {
        if let Some(cred) = self.credentials.lock().unwrap().get_mut(tenant_id) {
            cred.invalid = true;
            cred.last_error = Some(error.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl BaseAutomationStore for MemoryStore {
    async fn list_automation_settings(&self) -> Result<Vec<TenantAutomationConfig>> {
        self.stall_if_set().await;
        if self.fail_settings_reads.load(Ordering::SeqCst) {
            return Err(anyhow!("settings store unavailable"));
        }
        Ok(self.automation.lock().unwrap().clone())
    }

    async fn record_run_success(
        &self,
        tenant_id: &str,
        location_id: &str,
        ran_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update_automation(tenant_id, location_id, |c| {
            c.last_run_at = Some(ran_at);
            c.last_error = None;
        });
        Ok(())
    }

    async fn record_run_error(&self, tenant_id: &str, location_id: &str, error: &str) -> Result<()> {
        self.update_automation(tenant_id, location_id, |c| {
            c.last_error = Some(error.to_string());
        });
        Ok(())
    }

    async fn save_account_id(
        &self,
        tenant_id: &str,
        location_id: &str,
        account_id: &str,
    ) -> Result<()> {
        self.update_automation(tenant_id, location_id, |c| {
            c.account_id = Some(account_id.to_string());
        });
        Ok(())
    }

    async fn set_next_run_at(
        &self,
        tenant_id: &str,
        location_id: &str,
        next_run_at: Option<DateTime<Utc>>,
    ) -> Result<()> {
        self.update_automation(tenant_id, location_id, |c| {
            c.next_run_at = next_run_at;
        });
        Ok(())
    }
}

#[async_trait]
impl BaseLeadershipStore for MemoryStore {
    async fn find_leader(&self, role: &str) -> Result<Option<LeadershipRecord>> {
        self.stall_if_set().await;
        Ok(self.leader(role))
    }

    async fn try_claim_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
        stale_before: DateTime<Utc>,
        metadata: &serde_json::Value,
    ) -> Result<bool> {
        self.stall_if_set().await;
        let mut records = self.leadership.lock().unwrap();
        let claimable = match records.get(role) {
            None => true,
            Some(current) => current.heartbeat_at < stale_before || current.holder_id == holder_id,
        };
        if claimable {
            records.insert(
                role.to_string(),
                LeadershipRecord {
                    role: role.to_string(),
                    holder_id: holder_id.to_string(),
                    heartbeat_at: now,
                    acquired_at: now,
                    metadata: metadata.clone(),
                },
            );
        }
        Ok(claimable)
    }

    async fn heartbeat_leadership(
        &self,
        role: &str,
        holder_id: &str,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        self.stall_if_set().await;
        if self.fail_heartbeats.load(Ordering::SeqCst) {
            return Err(anyhow!("leadership store unavailable"));
        }
        let mut records = self.leadership.lock().unwrap();
        match records.get_mut(role) {
            Some(record) if record.holder_id == holder_id => {
                record.heartbeat_at = now;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release_leadership(&self, role: &str, holder_id: &str) -> Result<bool> {
        let mut records = self.leadership.lock().unwrap();
        if records.get(role).is_some_and(|r| r.holder_id == holder_id) {
            records.remove(role);
            return Ok(true);
        }
        Ok(false)
    }
}

#[async_trait]
impl BaseHistoryStore for MemoryStore {
    async fn record_history(&self, entry: &AutomationHistoryEntry) -> Result<()> {
        self.stall_if_set().await;
        self.history.lock().unwrap().push(entry.clone());
        Ok(())
    }
}

#[async_trait]
impl BaseReplyStore for MemoryStore {
    async fn replied_review_ids(&self, tenant_id: &str, location_id: &str) -> Result<HashSet<String>> {
        Ok(self.replied_ids(tenant_id, location_id))
    }

    async fn mark_review_replied(
        &self,
        tenant_id: &str,
        location_id: &str,
        review_id: &str,
        _replied_at: DateTime<Utc>,
    ) -> Result<()> {
        self.put_replied(tenant_id, location_id, review_id);
        Ok(())
    }
}

// =============================================================================
// Mock Content Generator
// =============================================================================

#[derive(Clone, Default)]
pub struct MockContentGenerator {
    responses: Arc<Mutex<Vec<String>>>,
    failure: Arc<Mutex<Option<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockContentGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text response to the queue
    pub fn with_response(self, response: impl Into<String>) -> Self {
        self.responses.lock().unwrap().push(response.into());
        self
    }

    /// Fail every call with `message`
    pub fn with_failure(self, message: impl Into<String>) -> Self {
        *self.failure.lock().unwrap() = Some(message.into());
        self
    }

    /// Sleep after recording the prompt, before answering
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Get all prompts that were sent
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseContentGenerator for MockContentGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.calls.lock().unwrap().push(prompt.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = self.failure.lock().unwrap().clone() {
            return Err(anyhow!(message));
        }

        let mut responses = self.responses.lock().unwrap();
        if !responses.is_empty() {
            Ok(responses.remove(0))
        } else {
            Ok("Mock generated text".to_string())
        }
    }
}

// =============================================================================
// Mock Publisher
// =============================================================================

/// Arguments captured from a create_post call
#[derive(Debug, Clone)]
pub struct CreatePostCall {
    pub account_id: String,
    pub location_id: String,
    pub summary: String,
}

/// Arguments captured from a reply_to_review call
#[derive(Debug, Clone)]
pub struct ReplyCall {
    pub location_id: String,
    pub review_id: String,
    pub comment: String,
}

#[derive(Clone, Default)]
pub struct MockPublisher {
    reviews: Arc<Mutex<Vec<ReviewSummary>>>,
    accounts: Arc<Mutex<Vec<String>>>,
    post_error: Arc<Mutex<Option<PublishError>>>,
    reply_error: Arc<Mutex<Option<PublishError>>>,
    posts: Arc<Mutex<Vec<CreatePostCall>>>,
    replies: Arc<Mutex<Vec<ReplyCall>>>,
    account_lookups: Arc<Mutex<usize>>,
    review_listings: Arc<Mutex<usize>>,
}

impl MockPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reviews(self, reviews: Vec<ReviewSummary>) -> Self {
        *self.reviews.lock().unwrap() = reviews;
        self
    }

    pub fn with_accounts(self, accounts: Vec<&str>) -> Self {
        *self.accounts.lock().unwrap() = accounts.into_iter().map(str::to_string).collect();
        self
    }

    pub fn with_post_error(self, error: PublishError) -> Self {
        *self.post_error.lock().unwrap() = Some(error);
        self
    }

    pub fn with_reply_error(self, error: PublishError) -> Self {
        *self.reply_error.lock().unwrap() = Some(error);
        self
    }

    pub fn created_posts(&self) -> Vec<CreatePostCall> {
        self.posts.lock().unwrap().clone()
    }

    pub fn replies(&self) -> Vec<ReplyCall> {
        self.replies.lock().unwrap().clone()
    }

    pub fn account_lookups(&self) -> usize {
        *self.account_lookups.lock().unwrap()
    }

    pub fn review_listings(&self) -> usize {
        *self.review_listings.lock().unwrap()
    }
}

#[async_trait]
impl BasePublisher for MockPublisher {
    async fn create_post(
        &self,
        _access_token: &str,
        account_id: &str,
        location_id: &str,
        summary: &str,
    ) -> Result<PublishedPost> {
        if let Some(error) = self.post_error.lock().unwrap().clone() {
            return Err(anyhow::Error::new(error));
        }

        let mut posts = self.posts.lock().unwrap();
        posts.push(CreatePostCall {
            account_id: account_id.to_string(),
            location_id: location_id.to_string(),
            summary: summary.to_string(),
        });
        Ok(PublishedPost {
            post_id: format!("accounts/{account_id}/locations/{location_id}/localPosts/{}", posts.len()),
        })
    }

    async fn list_reviews(
        &self,
        _access_token: &str,
        _account_id: &str,
        _location_id: &str,
    ) -> Result<Vec<ReviewSummary>> {
        *self.review_listings.lock().unwrap() += 1;
        Ok(self.reviews.lock().unwrap().clone())
    }

    async fn reply_to_review(
        &self,
        _access_token: &str,
        _account_id: &str,
        location_id: &str,
        review_id: &str,
        comment: &str,
    ) -> Result<()> {
        if let Some(error) = self.reply_error.lock().unwrap().clone() {
            return Err(anyhow::Error::new(error));
        }

        self.replies.lock().unwrap().push(ReplyCall {
            location_id: location_id.to_string(),
            review_id: review_id.to_string(),
            comment: comment.to_string(),
        });
        Ok(())
    }

    async fn list_accounts(&self, _access_token: &str) -> Result<Vec<String>> {
        *self.account_lookups.lock().unwrap() += 1;
        Ok(self.accounts.lock().unwrap().clone())
    }
}

// =============================================================================
// Mock Token Endpoint
// =============================================================================

#[derive(Clone)]
enum TokenResponse {
    Token {
        access_token: String,
        expires_in_secs: i64,
        refresh_token: Option<String>,
    },
    Failure(String),
}

#[derive(Clone, Default)]
pub struct MockTokenEndpoint {
    response: Arc<Mutex<Option<TokenResponse>>>,
    delay: Arc<Mutex<Option<Duration>>>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl MockTokenEndpoint {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_token(self, access_token: &str, expires_in_secs: i64) -> Self {
        *self.response.lock().unwrap() = Some(TokenResponse::Token {
            access_token: access_token.to_string(),
            expires_in_secs,
            refresh_token: None,
        });
        self
    }

    pub fn with_rotated_token(self, access_token: &str, refresh_token: &str) -> Self {
        *self.response.lock().unwrap() = Some(TokenResponse::Token {
            access_token: access_token.to_string(),
            expires_in_secs: 3600,
            refresh_token: Some(refresh_token.to_string()),
        });
        self
    }

    pub fn with_failure(self, message: &str) -> Self {
        *self.response.lock().unwrap() = Some(TokenResponse::Failure(message.to_string()));
        self
    }

    /// Sleep before answering, for timeout tests
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Refresh tokens received, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl BaseTokenEndpoint for MockTokenEndpoint {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedCredential> {
        self.calls.lock().unwrap().push(refresh_token.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let response = self.response.lock().unwrap().clone();
        match response {
            Some(TokenResponse::Token {
                access_token,
                expires_in_secs,
                refresh_token,
            }) => Ok(RefreshedCredential {
                access_token,
                expires_at: Utc::now() + ChronoDuration::seconds(expires_in_secs),
                refresh_token,
            }),
            Some(TokenResponse::Failure(message)) => Err(anyhow!(message)),
            None => Err(anyhow!("no mock token configured")),
        }
    }
}

// =============================================================================
// TestDependencies - Builder for test dependencies
// =============================================================================

#[derive(Clone)]
pub struct TestDependencies {
    pub store: Arc<MemoryStore>,
    pub generator: MockContentGenerator,
    pub publisher: MockPublisher,
    pub token_endpoint: MockTokenEndpoint,
}

impl TestDependencies {
    pub fn new() -> Self {
        Self {
            store: Arc::new(MemoryStore::new()),
            generator: MockContentGenerator::new(),
            publisher: MockPublisher::new(),
            token_endpoint: MockTokenEndpoint::new(),
        }
    }

    /// Share an existing store
    pub fn store(mut self, store: Arc<MemoryStore>) -> Self {
        self.store = store;
        self
    }

    pub fn mock_generator(mut self, generator: MockContentGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn mock_publisher(mut self, publisher: MockPublisher) -> Self {
        self.publisher = publisher;
        self
    }

    pub fn mock_token_endpoint(mut self, endpoint: MockTokenEndpoint) -> Self {
        self.token_endpoint = endpoint;
        self
    }

    /// Store calls are bounded by `settings.store_timeout`, as in production.
    pub fn into_deps(self, settings: &SchedulerSettings) -> ServerDeps {
        ServerDeps::from_store(
            Arc::new(BoundedStore::new(self.store, settings.store_timeout)),
            Arc::new(self.generator),
            Arc::new(self.publisher),
            Arc::new(self.token_endpoint),
        )
    }

    /// Convert into a ServerKernel for testing
    pub fn into_kernel(self, settings: &SchedulerSettings) -> Arc<ServerKernel> {
        ServerKernel::build(self.into_deps(settings), settings.clone())
    }
}

impl Default for TestDependencies {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveTime;

    #[tokio::test]
    async fn next_run_can_be_set_and_cleared() {
        let store = MemoryStore::new();
        store.put_automation(TenantAutomationConfig::daily("t1", "l1", NaiveTime::MIN));
        let next = Utc::now() + ChronoDuration::hours(3);

        store.set_next_run_at("t1", "l1", Some(next)).await.unwrap();
        assert_eq!(store.automation("t1", "l1").unwrap().next_run_at, Some(next));

        store.set_next_run_at("t1", "l1", None).await.unwrap();
        assert_eq!(store.automation("t1", "l1").unwrap().next_run_at, None);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reads_answer_after_the_delay() {
        let store = MemoryStore::new();
        store.set_stall(Some(Duration::from_secs(30)));
        let started = tokio::time::Instant::now();

        assert!(store.find_subscription("t1").await.unwrap().is_none());
        assert!(started.elapsed() >= Duration::from_secs(30));
    }
}
