//! Performs one automated action (create a post, answer reviews) and records
//! the result.
//!
//! ```text
//! execute(config, kind)
//!     ├─► TokenProvider.get_valid_token   (Unavailable → Authentication)
//!     ├─► resolve account id              (cached → credential → one lookup,
//!     │                                    persisted and patched into the cache)
//!     ├─► Post:  ContentGenerator → Publisher.create_post
//!     │   Reply: Publisher.list_reviews → filter replied → per review:
//!     │          ContentGenerator → Publisher.reply_to_review → replied set
//!     └─► last-run / last-error + history
//! ```

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::config::SchedulerSettings;
use crate::domains::automation::error::ActionError;
use crate::domains::automation::models::{ActionKey, ActionKind, TenantAutomationConfig};
use crate::domains::automation::prompts;
use crate::domains::automation::SettingsCache;
use crate::domains::credentials::{AccessToken, TokenOutcome, TokenProvider};
use crate::domains::history::models::{AutomationHistoryEntry, HistoryOutcome};
use crate::kernel::timeout::with_timeout;
use crate::kernel::traits::{
    BaseAutomationStore, BaseContentGenerator, BaseHistoryStore, BasePublisher, BaseReplyStore,
    ReviewSummary,
};

#[derive(Debug, Clone)]
pub struct ExecutorSettings {
    pub call_timeout: Duration,
    pub reply_delay: Duration,
    pub max_replies_per_cycle: usize,
}

impl From<&SchedulerSettings> for ExecutorSettings {
    fn from(settings: &SchedulerSettings) -> Self {
        Self {
            call_timeout: settings.external_call_timeout,
            reply_delay: settings.reply_delay,
            max_replies_per_cycle: settings.max_replies_per_cycle,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Posted { post_id: String },
    Replied { replied: usize, failed: usize },
    NothingToReply,
}

pub struct ActionExecutor {
    tokens: Arc<TokenProvider>,
    generator: Arc<dyn BaseContentGenerator>,
    publisher: Arc<dyn BasePublisher>,
    automation: Arc<dyn BaseAutomationStore>,
    replies: Arc<dyn BaseReplyStore>,
    history: Arc<dyn BaseHistoryStore>,
    cache: Arc<SettingsCache>,
    settings: ExecutorSettings,
}

impl ActionExecutor {
    pub fn new(
        tokens: Arc<TokenProvider>,
        generator: Arc<dyn BaseContentGenerator>,
        publisher: Arc<dyn BasePublisher>,
        automation: Arc<dyn BaseAutomationStore>,
        replies: Arc<dyn BaseReplyStore>,
        history: Arc<dyn BaseHistoryStore>,
        cache: Arc<SettingsCache>,
        settings: ExecutorSettings,
    ) -> Self {
        Self {
            tokens,
            generator,
            publisher,
            automation,
            replies,
            history,
            cache,
            settings,
        }
    }

    pub async fn execute(
        &self,
        config: &TenantAutomationConfig,
        kind: ActionKind,
    ) -> Result<ActionOutcome, ActionError> {
        self.execute_at(config, kind, Utc::now()).await
    }

    pub async fn execute_at(
        &self,
        config: &TenantAutomationConfig,
        kind: ActionKind,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        let key = config.key(kind);
        let result = match kind {
            ActionKind::Post => self.post(config, now).await,
            ActionKind::Reply => self.reply(config, now).await,
        };

        match &result {
            Ok(ActionOutcome::Posted { post_id }) => {
                info!(tenant_id = %key.tenant_id, location_id = %key.location_id, post_id = %post_id, "Post published");
                if let Err(e) = self
                    .automation
                    .record_run_success(&key.tenant_id, &key.location_id, now)
                    .await
                {
                    warn!(action = %key, error = %e, "Failed to record last run");
                }
                self.record(
                    AutomationHistoryEntry::new(&key, HistoryOutcome::Success, now)
                        .with_external_id(post_id.clone()),
                )
                .await;
            }
            Ok(ActionOutcome::Replied { replied, failed }) => {
                info!(tenant_id = %key.tenant_id, location_id = %key.location_id, replied, failed, "Review replies sent");
            }
            Ok(ActionOutcome::NothingToReply) => {}
            Err(e) => {
                warn!(
                    tenant_id = %key.tenant_id,
                    location_id = %key.location_id,
                    action = %kind,
                    kind = ?e.kind(),
                    error = %e,
                    "Automation action failed"
                );
                if let Err(store_err) = self
                    .automation
                    .record_run_error(&key.tenant_id, &key.location_id, &e.to_string())
                    .await
                {
                    warn!(action = %key, error = %store_err, "Failed to record run error");
                }
                self.record(
                    AutomationHistoryEntry::new(&key, HistoryOutcome::Failure, now)
                        .with_detail(e.to_string()),
                )
                .await;
            }
        }

        result
    }

    async fn post(
        &self,
        config: &TenantAutomationConfig,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        let token = self.token_for(&config.tenant_id, now).await?;
        let account_id = self.resolve_account(config, &token).await?;

        let summary = self
            .generate(&prompts::post_prompt(&config.business))
            .await?;

        let post = with_timeout(
            self.settings.call_timeout,
            "create post",
            self.publisher.create_post(
                &token.access_token,
                &account_id,
                &config.location_id,
                &summary,
            ),
        )
        .await
        .map_err(|e| ActionError::from_provider(&e))?;

        Ok(ActionOutcome::Posted {
            post_id: post.post_id,
        })
    }

    async fn reply(
        &self,
        config: &TenantAutomationConfig,
        now: DateTime<Utc>,
    ) -> Result<ActionOutcome, ActionError> {
        let token = self.token_for(&config.tenant_id, now).await?;
        let account_id = self.resolve_account(config, &token).await?;

        let reviews = with_timeout(
            self.settings.call_timeout,
            "list reviews",
            self.publisher
                .list_reviews(&token.access_token, &account_id, &config.location_id),
        )
        .await
        .map_err(|e| ActionError::from_provider(&e))?;

        let already_replied = self
            .replies
            .replied_review_ids(&config.tenant_id, &config.location_id)
            .await
            .map_err(|e| ActionError::Transient(format!("replied set unavailable: {e:#}")))?;

        let pending: Vec<ReviewSummary> = reviews
            .into_iter()
            .filter(|r| !r.has_reply && !already_replied.contains(&r.review_id))
            .take(self.settings.max_replies_per_cycle)
            .collect();

        if pending.is_empty() {
            return Ok(ActionOutcome::NothingToReply);
        }

        let key = config.key(ActionKind::Reply);
        let mut replied = 0;
        let mut failed = 0;
        for (i, review) in pending.iter().enumerate() {
            if i > 0 {
                tokio::time::sleep(self.settings.reply_delay).await;
            }

            match self
                .reply_one(config, &token, &account_id, review, now)
                .await
            {
                Ok(()) => {
                    replied += 1;
                    self.record(
                        AutomationHistoryEntry::new(&key, HistoryOutcome::Success, now)
                            .with_external_id(review.review_id.clone()),
                    )
                    .await;
                }
                Err(e) => {
                    failed += 1;
                    warn!(action = %key, review_id = %review.review_id, error = %e, "Review reply failed");
                    self.record(
                        AutomationHistoryEntry::new(&key, HistoryOutcome::Failure, now)
                            .with_external_id(review.review_id.clone())
                            .with_detail(e.to_string()),
                    )
                    .await;
                    // The rest would fail the same way
                    if !e.kind().should_retry() {
                        break;
                    }
                }
            }
        }

        Ok(ActionOutcome::Replied { replied, failed })
    }

    async fn reply_one(
        &self,
        config: &TenantAutomationConfig,
        token: &AccessToken,
        account_id: &str,
        review: &ReviewSummary,
        now: DateTime<Utc>,
    ) -> Result<(), ActionError> {
        let text = self
            .generate(&prompts::reply_prompt(&config.business, review))
            .await?;

        with_timeout(
            self.settings.call_timeout,
            "reply to review",
            self.publisher.reply_to_review(
                &token.access_token,
                account_id,
                &config.location_id,
                &review.review_id,
                &text,
            ),
        )
        .await
        .map_err(|e| ActionError::from_provider(&e))?;

        if let Err(e) = self
            .replies
            .mark_review_replied(&config.tenant_id, &config.location_id, &review.review_id, now)
            .await
        {
            // The provider now shows the reply, so the next poll filters it anyway
            warn!(review_id = %review.review_id, error = %e, "Failed to record replied review");
        }
        Ok(())
    }

    async fn token_for(
        &self,
        tenant_id: &str,
        now: DateTime<Utc>,
    ) -> Result<AccessToken, ActionError> {
        match self.tokens.get_valid_token_at(tenant_id, now).await {
            TokenOutcome::Valid(token) | TokenOutcome::Refreshed(token) => Ok(token),
            TokenOutcome::StaleFallback { token, error } => {
                warn!(tenant_id, error = %error, "Using stale access token until it expires");
                Ok(token)
            }
            TokenOutcome::Unavailable { reason } => Err(ActionError::Authentication(reason)),
        }
    }

    async fn resolve_account(
        &self,
        config: &TenantAutomationConfig,
        token: &AccessToken,
    ) -> Result<String, ActionError> {
        if let Some(account_id) = config.account_id.clone().or_else(|| token.account_id.clone()) {
            return Ok(account_id);
        }

        let accounts = with_timeout(
            self.settings.call_timeout,
            "list accounts",
            self.publisher.list_accounts(&token.access_token),
        )
        .await
        .map_err(|e| ActionError::from_provider(&e))?;

        let account_id = accounts.into_iter().next().ok_or_else(|| {
            ActionError::Configuration("no Business Profile account for this credential".into())
        })?;

        if let Err(e) = self
            .automation
            .save_account_id(&config.tenant_id, &config.location_id, &account_id)
            .await
        {
            warn!(tenant_id = %config.tenant_id, error = %e, "Failed to persist resolved account id");
        }
        self.cache
            .record_account_id(&config.key(ActionKind::Post), &account_id)
            .await;
        Ok(account_id)
    }

    async fn generate(&self, prompt: &str) -> Result<String, ActionError> {
        let text = with_timeout(
            self.settings.call_timeout,
            "generate content",
            self.generator.generate(prompt),
        )
        .await
        .map_err(|e| ActionError::Transient(format!("content generation failed: {e:#}")))?;

        let text = text.trim();
        if text.is_empty() {
            return Err(ActionError::Transient(
                "content generator returned empty text".into(),
            ));
        }
        Ok(text.to_string())
    }

    async fn record(&self, entry: AutomationHistoryEntry) {
        if let Err(e) = self.history.record_history(&entry).await {
            warn!(
                tenant_id = %entry.tenant_id,
                location_id = %entry.location_id,
                error = %e,
                "Failed to record automation history"
            );
        }
    }

    /// Record an outcome decided before execution (blocked, skipped).
    pub async fn record_outcome(
        &self,
        key: &ActionKey,
        outcome: HistoryOutcome,
        detail: &str,
        now: DateTime<Utc>,
    ) {
        self.record(AutomationHistoryEntry::new(key, outcome, now).with_detail(detail))
            .await;
    }
}
