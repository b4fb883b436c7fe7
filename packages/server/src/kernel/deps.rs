//! Server dependencies for the automation domains (using traits for testability)
//!
//! Adapters wrap the REST clients in the `Base*` traits; `ServerDeps` is the
//! container the kernel is built from.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{Duration, Utc};
use gbp_client::{GbpClient, GbpError, OAuthClient};
use genai_client::{AzureOpenAiClient, GeminiClient};
use std::sync::Arc;
use tracing::warn;

use crate::kernel::traits::{
    BaseAutomationStore, BaseContentGenerator, BaseCredentialStore, BaseHistoryStore,
    BaseLeadershipStore, BasePublisher, BaseReplyStore, BaseStore, BaseSubscriptionStore,
    BaseTokenEndpoint, PublishError, PublishedPost, RefreshedCredential, ReviewSummary,
};

// =============================================================================
// Business Profile Adapter (implements BasePublisher trait)
// =============================================================================

fn classify(err: GbpError) -> anyhow::Error {
    let publish = if err.is_transient() {
        PublishError::Transient(err.to_string())
    } else {
        PublishError::Permanent {
            status: err.status(),
            message: err.to_string(),
        }
    };
    anyhow::Error::new(publish)
}

/// Wrapper around GbpClient that implements BasePublisher trait
pub struct GbpPublisherAdapter(pub Arc<GbpClient>);

impl GbpPublisherAdapter {
    pub fn new(client: Arc<GbpClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BasePublisher for GbpPublisherAdapter {
    async fn create_post(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        summary: &str,
    ) -> Result<PublishedPost> {
        let post = self
            .0
            .create_local_post(access_token, account_id, location_id, summary)
            .await
            .map_err(classify)?;
        Ok(PublishedPost { post_id: post.name })
    }

    async fn list_reviews(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
    ) -> Result<Vec<ReviewSummary>> {
        let reviews = self
            .0
            .list_reviews(access_token, account_id, location_id)
            .await
            .map_err(classify)?;

        Ok(reviews
            .into_iter()
            .map(|review| ReviewSummary {
                star_rating: review.stars(),
                has_reply: review.review_reply.is_some(),
                reviewer_name: review.reviewer.display_name,
                comment: review.comment,
                review_id: review.review_id,
            })
            .collect())
    }

    async fn reply_to_review(
        &self,
        access_token: &str,
        account_id: &str,
        location_id: &str,
        review_id: &str,
        comment: &str,
    ) -> Result<()> {
        self.0
            .reply_to_review(access_token, account_id, location_id, review_id, comment)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    async fn list_accounts(&self, access_token: &str) -> Result<Vec<String>> {
        let accounts = self.0.list_accounts(access_token).await.map_err(classify)?;
        Ok(accounts.iter().map(|a| a.id().to_string()).collect())
    }
}

// =============================================================================
// OAuth Adapter (implements BaseTokenEndpoint trait)
// =============================================================================

pub struct OAuthTokenAdapter(pub Arc<OAuthClient>);

impl OAuthTokenAdapter {
    pub fn new(client: Arc<OAuthClient>) -> Self {
        Self(client)
    }
}

#[async_trait]
impl BaseTokenEndpoint for OAuthTokenAdapter {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedCredential> {
        let token = self
            .0
            .refresh(refresh_token)
            .await
            .map_err(|e| anyhow!("{}", e))?;

        Ok(RefreshedCredential {
            access_token: token.access_token,
            expires_at: Utc::now() + Duration::seconds(token.expires_in_secs),
            refresh_token: token.refresh_token,
        })
    }
}

// =============================================================================
// Content Generator Adapters (implement BaseContentGenerator trait)
// =============================================================================

pub struct GeminiGenerator(pub Arc<GeminiClient>);

#[async_trait]
impl BaseContentGenerator for GeminiGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.0.generate(prompt).await.map_err(|e| anyhow!("{}", e))
    }
}

pub struct AzureGenerator(pub Arc<AzureOpenAiClient>);

#[async_trait]
impl BaseContentGenerator for AzureGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        self.0.generate(prompt).await.map_err(|e| anyhow!("{}", e))
    }
}

/// Tries `primary`, then `fallback` when one is configured.
pub struct FallbackContentGenerator {
    primary: Arc<dyn BaseContentGenerator>,
    fallback: Option<Arc<dyn BaseContentGenerator>>,
}

impl FallbackContentGenerator {
    pub fn new(
        primary: Arc<dyn BaseContentGenerator>,
        fallback: Option<Arc<dyn BaseContentGenerator>>,
    ) -> Self {
        Self { primary, fallback }
    }
}

#[async_trait]
impl BaseContentGenerator for FallbackContentGenerator {
    async fn generate(&self, prompt: &str) -> Result<String> {
        match self.primary.generate(prompt).await {
            Ok(text) => Ok(text),
            Err(primary_err) => {
                let Some(fallback) = &self.fallback else {
                    return Err(primary_err);
                };
                warn!(error = %primary_err, "Primary content generator failed, using fallback");
                fallback
                    .generate(prompt)
                    .await
                    .map_err(|e| anyhow!("primary: {primary_err}; fallback: {e}"))
            }
        }
    }
}

// =============================================================================
// ServerDeps
// =============================================================================

/// Everything the automation kernel needs, behind traits.
#[derive(Clone)]
pub struct ServerDeps {
    pub subscriptions: Arc<dyn BaseSubscriptionStore>,
    pub credentials: Arc<dyn BaseCredentialStore>,
    pub automation: Arc<dyn BaseAutomationStore>,
    pub leadership: Arc<dyn BaseLeadershipStore>,
    pub history: Arc<dyn BaseHistoryStore>,
    pub replies: Arc<dyn BaseReplyStore>,
    pub generator: Arc<dyn BaseContentGenerator>,
    pub publisher: Arc<dyn BasePublisher>,
    pub token_endpoint: Arc<dyn BaseTokenEndpoint>,
}

impl ServerDeps {
    /// Use one store for every persistence concern.
    pub fn from_store<S: BaseStore + 'static>(
        store: Arc<S>,
        generator: Arc<dyn BaseContentGenerator>,
        publisher: Arc<dyn BasePublisher>,
        token_endpoint: Arc<dyn BaseTokenEndpoint>,
    ) -> Self {
        Self {
            subscriptions: store.clone(),
            credentials: store.clone(),
            automation: store.clone(),
            leadership: store.clone(),
            history: store.clone(),
            replies: store,
            generator,
            publisher,
            token_endpoint,
        }
    }
}
