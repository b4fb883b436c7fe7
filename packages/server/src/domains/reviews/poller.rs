//! Dispatches review replies for every reply-enabled location on an interval.
//!
//! A location whose subscription blocks it gets one `blocked` history row
//! when the block starts, not one per poll.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::domains::actions::{ActionExecutor, ActionOutcome};
use crate::domains::automation::models::{ActionKey, ActionKind, TenantAutomationConfig};
use crate::domains::automation::{DuplicateActionLock, SettingsCache};
use crate::domains::history::models::HistoryOutcome;
use crate::domains::subscriptions::SubscriptionGuard;
use crate::kernel::service_host::{until_cancelled, Service};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PollReport {
    pub considered: usize,
    pub dispatched: usize,
    pub replied: usize,
    pub blocked: usize,
    pub skipped_locked: usize,
    pub failed: usize,
}

enum PollResult {
    Replied(usize),
    NothingToReply,
    Blocked,
    Locked,
    Failed,
}

pub struct ReviewPoller {
    cache: Arc<SettingsCache>,
    guard: Arc<SubscriptionGuard>,
    lock: Arc<DuplicateActionLock>,
    executor: Arc<ActionExecutor>,
    interval: Duration,
    blocked: Mutex<HashSet<ActionKey>>,
}

impl ReviewPoller {
    pub fn new(
        cache: Arc<SettingsCache>,
        guard: Arc<SubscriptionGuard>,
        lock: Arc<DuplicateActionLock>,
        executor: Arc<ActionExecutor>,
        interval: Duration,
    ) -> Self {
        Self {
            cache,
            guard,
            lock,
            executor,
            interval,
            blocked: Mutex::new(HashSet::new()),
        }
    }

    pub async fn poll_once(&self) -> PollReport {
        self.poll_once_at(Utc::now()).await
    }

    pub async fn poll_once_at(&self, now: DateTime<Utc>) -> PollReport {
        // The engine normally owns reloads; cover the window before its first one
        if self.cache.loaded_at().await.is_none() {
            if let Err(e) = self.cache.reload_at(now).await {
                warn!(error = %e, "Review poll could not load settings");
                return PollReport::default();
            }
        }

        let configs = self.cache.configs().await;
        let enabled: Vec<&TenantAutomationConfig> =
            configs.iter().filter(|c| c.reply_enabled).collect();

        let mut report = PollReport {
            considered: enabled.len(),
            ..Default::default()
        };

        let results = join_all(enabled.into_iter().map(|c| self.poll_location(c, now))).await;
        for result in results {
            match result {
                PollResult::Replied(n) => {
                    report.dispatched += 1;
                    report.replied += n;
                }
                PollResult::NothingToReply => report.dispatched += 1,
                PollResult::Blocked => report.blocked += 1,
                PollResult::Locked => report.skipped_locked += 1,
                PollResult::Failed => {
                    report.dispatched += 1;
                    report.failed += 1;
                }
            }
        }

        if report.replied > 0 || report.failed > 0 {
            info!(
                considered = report.considered,
                replied = report.replied,
                blocked = report.blocked,
                failed = report.failed,
                "Review poll complete"
            );
        } else {
            debug!(considered = report.considered, "Review poll complete");
        }
        report
    }

    async fn poll_location(&self, config: &TenantAutomationConfig, now: DateTime<Utc>) -> PollResult {
        let key = config.key(ActionKind::Reply);
        if !self.lock.try_claim_at(&key, now) {
            return PollResult::Locked;
        }

        let decision = self
            .guard
            .validate_at(&config.tenant_id, ActionKind::Reply, now)
            .await;
        if !decision.allowed {
            if self.block_started(&key) {
                let reason = decision.reason.as_deref().unwrap_or("subscription inactive");
                self.executor
                    .record_outcome(&key, HistoryOutcome::Blocked, reason, now)
                    .await;
            }
            return PollResult::Blocked;
        }
        self.block_ended(&key);

        match self.executor.execute_at(config, ActionKind::Reply, now).await {
            Ok(ActionOutcome::Replied { replied, .. }) => PollResult::Replied(replied),
            Ok(_) => PollResult::NothingToReply,
            Err(_) => PollResult::Failed,
        }
    }

    /// True the first time `key` is seen blocked since it was last allowed.
    fn block_started(&self, key: &ActionKey) -> bool {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone())
    }

    fn block_ended(&self, key: &ActionKey) {
        self.blocked
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(key);
    }
}

#[async_trait]
impl Service for ReviewPoller {
    fn name(&self) -> &'static str {
        "review-poller"
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        // First tick completes immediately
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if until_cancelled(&shutdown, self.poll_once()).await.is_none() {
                        break;
                    }
                }
            }
        }

        info!("Review poller stopped");
        Ok(())
    }
}
