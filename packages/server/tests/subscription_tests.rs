//! Subscription guard decisions backed by PostgreSQL.

mod common;

use crate::common::{create_trial, unique_tenant, TestHarness};
use automation_core::domains::automation::models::ActionKind;
use automation_core::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};
use automation_core::domains::subscriptions::SubscriptionGuard;
use chrono::{Duration, Utc};
use test_context::test_context;

#[test_context(TestHarness)]
#[tokio::test]
async fn ended_trial_is_denied_and_written_back_as_expired(ctx: &TestHarness) {
    let tenant = unique_tenant("trial-ended");
    let now = Utc::now();
    create_trial(&ctx.db_pool, &tenant, now - Duration::hours(1))
        .await
        .unwrap();
    let guard = SubscriptionGuard::new(ctx.store());

    let decision = guard.validate_at(&tenant, ActionKind::Post, now).await;

    assert!(!decision.allowed);
    assert_eq!(decision.status, Some(SubscriptionStatus::Expired));
    assert_eq!(decision.days_remaining, Some(0));

    let stored = SubscriptionRecord::find_by_tenant(&tenant, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn running_trial_reports_days_remaining(ctx: &TestHarness) {
    let tenant = unique_tenant("trial-running");
    let now = Utc::now();
    create_trial(&ctx.db_pool, &tenant, now + Duration::days(5))
        .await
        .unwrap();
    let guard = SubscriptionGuard::new(ctx.store());

    let decision = guard.validate_at(&tenant, ActionKind::Reply, now).await;

    assert!(decision.allowed);
    assert_eq!(decision.status, Some(SubscriptionStatus::Trial));
    assert_eq!(decision.days_remaining, Some(5));
}

#[test_context(TestHarness)]
#[tokio::test]
async fn active_without_end_date_is_unlimited(ctx: &TestHarness) {
    let tenant = unique_tenant("active");
    SubscriptionRecord::active(&tenant, None)
        .upsert(&ctx.db_pool)
        .await
        .unwrap();
    let guard = SubscriptionGuard::new(ctx.store());

    let decision = guard.validate(&tenant, ActionKind::Post).await;

    assert!(decision.allowed);
    assert_eq!(decision.days_remaining, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn tenant_without_record_is_allowed(ctx: &TestHarness) {
    let guard = SubscriptionGuard::new(ctx.store());

    let decision = guard
        .validate(&unique_tenant("no-record"), ActionKind::Post)
        .await;

    assert!(decision.allowed);
    assert_eq!(decision.status, None);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn cancelled_is_denied_without_rewrite(ctx: &TestHarness) {
    let tenant = unique_tenant("cancelled");
    let mut record = SubscriptionRecord::active(&tenant, Some(Utc::now() + Duration::days(30)));
    record.status = SubscriptionStatus::Cancelled;
    record.upsert(&ctx.db_pool).await.unwrap();
    let guard = SubscriptionGuard::new(ctx.store());

    let decision = guard.validate(&tenant, ActionKind::Post).await;

    assert!(!decision.allowed);
    let stored = SubscriptionRecord::find_by_tenant(&tenant, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Cancelled);
}
