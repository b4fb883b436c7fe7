//! Subscription gate in front of every automated action.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use super::models::{SubscriptionRecord, SubscriptionStatus};
use crate::domains::automation::models::ActionKind;
use crate::kernel::traits::BaseSubscriptionStore;

const SECONDS_PER_DAY: i64 = 86_400;

/// Result of a subscription check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuardDecision {
    pub allowed: bool,
    /// `None` when no record exists
    pub status: Option<SubscriptionStatus>,
    /// `None` means unlimited
    pub days_remaining: Option<i64>,
    pub reason: Option<String>,
}

impl GuardDecision {
    fn allow(status: Option<SubscriptionStatus>, days_remaining: Option<i64>) -> Self {
        Self {
            allowed: true,
            status,
            days_remaining,
            reason: None,
        }
    }

    fn deny(status: Option<SubscriptionStatus>, reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            status,
            days_remaining: Some(0),
            reason: Some(reason.into()),
        }
    }
}

/// Whole days left before `end`, at least 1 while any time remains.
pub fn days_remaining(end: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    if end <= now {
        return 0;
    }
    ((end - now).num_seconds() / SECONDS_PER_DAY).max(1)
}

pub struct SubscriptionGuard {
    store: Arc<dyn BaseSubscriptionStore>,
}

impl SubscriptionGuard {
    pub fn new(store: Arc<dyn BaseSubscriptionStore>) -> Self {
        Self { store }
    }

    pub async fn validate(&self, tenant_id: &str, action: ActionKind) -> GuardDecision {
        self.validate_at(tenant_id, action, Utc::now()).await
    }

    pub async fn validate_at(
        &self,
        tenant_id: &str,
        action: ActionKind,
        now: DateTime<Utc>,
    ) -> GuardDecision {
        let record = match self.store.find_subscription(tenant_id).await {
            Ok(Some(record)) => record,
            // Brand-new tenants have no record yet and must be able to onboard
            Ok(None) => {
                debug!(tenant_id, action = %action, "No subscription on record, allowing");
                return GuardDecision::allow(None, None);
            }
            Err(e) => {
                warn!(tenant_id, action = %action, error = %e, "Failed to load subscription");
                return GuardDecision::deny(None, "subscription could not be loaded");
            }
        };

        let decision = self.decide(&record, now).await;
        if !decision.allowed {
            debug!(
                tenant_id,
                action = %action,
                status = record.status.as_str(),
                reason = decision.reason.as_deref().unwrap_or_default(),
                "Automation blocked by subscription"
            );
        }
        decision
    }

    async fn decide(&self, record: &SubscriptionRecord, now: DateTime<Utc>) -> GuardDecision {
        let status = Some(record.status);
        match record.status {
            SubscriptionStatus::Admin => GuardDecision::allow(status, None),
            SubscriptionStatus::Active => match record.subscription_ends_at {
                None => GuardDecision::allow(status, None),
                Some(end) if end > now => GuardDecision::allow(status, Some(days_remaining(end, now))),
                Some(_) => {
                    self.expire(&record.tenant_id).await;
                    GuardDecision::deny(Some(SubscriptionStatus::Expired), "subscription has expired")
                }
            },
            SubscriptionStatus::Trial => match record.trial_ends_at {
                None => GuardDecision::deny(status, "trial has no end date"),
                Some(end) if end > now => GuardDecision::allow(status, Some(days_remaining(end, now))),
                Some(_) => {
                    self.expire(&record.tenant_id).await;
                    GuardDecision::deny(Some(SubscriptionStatus::Expired), "trial has ended")
                }
            },
            SubscriptionStatus::Expired => GuardDecision::deny(status, "subscription has expired"),
            SubscriptionStatus::Cancelled => GuardDecision::deny(status, "subscription was cancelled"),
        }
    }

    /// Best-effort write-back; the denial stands either way.
    async fn expire(&self, tenant_id: &str) {
        if let Err(e) = self
            .store
            .set_subscription_status(tenant_id, SubscriptionStatus::Expired)
            .await
        {
            warn!(tenant_id, error = %e, "Failed to persist subscription expiry");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::test_dependencies::MemoryStore;
    use chrono::Duration;

    fn guard(store: &Arc<MemoryStore>) -> SubscriptionGuard {
        SubscriptionGuard::new(store.clone())
    }

    #[test]
    fn partial_day_counts_as_one() {
        let now = Utc::now();
        assert_eq!(days_remaining(now + Duration::hours(3), now), 1);
        assert_eq!(days_remaining(now + Duration::hours(49), now), 2);
        assert_eq!(days_remaining(now, now), 0);
        assert_eq!(days_remaining(now - Duration::hours(1), now), 0);
    }

    #[tokio::test]
    async fn trial_with_future_end_is_allowed() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_subscription(SubscriptionRecord::trial("t1", now + Duration::days(5)));

        let decision = guard(&store).validate_at("t1", ActionKind::Post, now).await;

        assert!(decision.allowed);
        assert_eq!(decision.status, Some(SubscriptionStatus::Trial));
        assert_eq!(decision.days_remaining, Some(5));
    }

    #[tokio::test]
    async fn trial_past_end_is_denied_and_expired() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_subscription(SubscriptionRecord::trial("t1", now - Duration::minutes(1)));

        let decision = guard(&store).validate_at("t1", ActionKind::Post, now).await;

        assert!(!decision.allowed);
        assert_eq!(decision.days_remaining, Some(0));
        assert_eq!(
            store.subscription("t1").map(|s| s.status),
            Some(SubscriptionStatus::Expired)
        );
    }

    #[tokio::test]
    async fn active_past_end_is_expired() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        store.put_subscription(SubscriptionRecord::active("t1", Some(now - Duration::days(1))));

        let decision = guard(&store).validate_at("t1", ActionKind::Reply, now).await;

        assert!(!decision.allowed);
        assert_eq!(
            store.subscription("t1").map(|s| s.status),
            Some(SubscriptionStatus::Expired)
        );
    }

    #[tokio::test]
    async fn active_without_end_is_unlimited() {
        let store = Arc::new(MemoryStore::new());
        store.put_subscription(SubscriptionRecord::active("t1", None));

        let decision = guard(&store).validate("t1", ActionKind::Post).await;

        assert!(decision.allowed);
        assert_eq!(decision.days_remaining, None);
    }

    #[tokio::test]
    async fn admin_bypasses_time_checks() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new());
        let mut record = SubscriptionRecord::trial("t1", now - Duration::days(30));
        record.status = SubscriptionStatus::Admin;
        store.put_subscription(record);

        let decision = guard(&store).validate_at("t1", ActionKind::Post, now).await;

        assert!(decision.allowed);
        assert_eq!(decision.days_remaining, None);
    }

    #[tokio::test]
    async fn cancelled_and_trial_without_end_are_denied() {
        let store = Arc::new(MemoryStore::new());
        let mut cancelled = SubscriptionRecord::active("t1", None);
        cancelled.status = SubscriptionStatus::Cancelled;
        store.put_subscription(cancelled);
        let mut open_trial = SubscriptionRecord::trial("t2", Utc::now());
        open_trial.trial_ends_at = None;
        store.put_subscription(open_trial);

        let guard = guard(&store);
        assert!(!guard.validate("t1", ActionKind::Post).await.allowed);
        assert!(!guard.validate("t2", ActionKind::Post).await.allowed);
    }

    #[tokio::test]
    async fn missing_record_allows_onboarding() {
        let store = Arc::new(MemoryStore::new());
        let decision = guard(&store).validate("new-tenant", ActionKind::Post).await;
        assert!(decision.allowed);
        assert_eq!(decision.status, None);
    }

    #[tokio::test]
    async fn load_failure_denies() {
        let store = Arc::new(MemoryStore::new().with_failing_subscription_reads());
        let decision = guard(&store).validate("t1", ActionKind::Post).await;
        assert!(!decision.allowed);
    }

    #[tokio::test]
    async fn failed_expiry_write_still_denies() {
        let now = Utc::now();
        let store = Arc::new(MemoryStore::new().with_failing_subscription_writes());
        store.put_subscription(SubscriptionRecord::trial("t1", now - Duration::days(1)));

        let decision = guard(&store).validate_at("t1", ActionKind::Post, now).await;

        assert!(!decision.allowed);
        assert_eq!(
            store.subscription("t1").map(|s| s.status),
            Some(SubscriptionStatus::Trial)
        );
    }
}
