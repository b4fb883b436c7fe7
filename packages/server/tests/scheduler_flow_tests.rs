//! End-to-end scheduling over PostgreSQL with mocked Google and AI clients.

mod common;

use crate::common::{create_daily_settings, create_trial, create_valid_credential, unique_tenant, TestHarness};
use automation_core::config::SchedulerSettings;
use automation_core::domains::automation::models::{AutomationSettingsRow, TenantAutomationConfig};
use automation_core::domains::credentials::models::Credential;
use automation_core::domains::history::models::{AutomationHistoryEntry, HistoryOutcome};
use automation_core::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};
use automation_core::kernel::test_dependencies::{
    MemoryStore, MockContentGenerator, MockPublisher, MockTokenEndpoint, TestDependencies,
};
use automation_core::kernel::{BaseAutomationStore, ServerDeps, ServerKernel};
use chrono::{DateTime, Duration, NaiveTime, TimeZone, Utc};
use std::sync::Arc;
use test_context::test_context;

fn kernel(
    ctx: &TestHarness,
    generator: MockContentGenerator,
    publisher: MockPublisher,
) -> Arc<ServerKernel> {
    let deps = ServerDeps::from_store(
        ctx.store(),
        Arc::new(generator),
        Arc::new(publisher),
        Arc::new(MockTokenEndpoint::new()),
    );
    ServerKernel::build(deps, SchedulerSettings::default())
}

fn at(hour: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 10, hour, 0, 0).unwrap()
}

#[test_context(TestHarness)]
#[tokio::test]
async fn due_daily_post_is_generated_published_and_recorded(ctx: &TestHarness) {
    let tenant = unique_tenant("flow");
    let now = at(10);
    create_trial(&ctx.db_pool, &tenant, now + Duration::days(5)).await.unwrap();
    create_valid_credential(&ctx.db_pool, &tenant).await.unwrap();
    create_daily_settings(&ctx.db_pool, &tenant, "loc-1", NaiveTime::from_hms_opt(10, 0, 0).unwrap())
        .await
        .unwrap();
    let store = ctx.store();
    store.record_run_success(&tenant, "loc-1", now - Duration::days(1)).await.unwrap();
    store.save_account_id(&tenant, "loc-1", "accounts/flow").await.unwrap();

    let generator = MockContentGenerator::new().with_response("Fresh bread all week!");
    let publisher = MockPublisher::new();
    let kernel = kernel(ctx, generator.clone(), publisher.clone());
    kernel.cache.reload().await.unwrap();

    kernel.engine.reconcile_at(now).await;

    let posts: Vec<_> = publisher
        .created_posts()
        .into_iter()
        .filter(|p| p.account_id == "accounts/flow")
        .collect();
    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].location_id, "loc-1");
    assert_eq!(posts[0].summary, "Fresh bread all week!");
    assert!(generator.calls().iter().any(|prompt| prompt.contains("Test Bakery")));

    let row = AutomationSettingsRow::find(&tenant, "loc-1", &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.last_run_at, Some(now));
    assert_eq!(row.last_error, None);

    let history = AutomationHistoryEntry::find_for_location(&tenant, "loc-1", 10, &ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, HistoryOutcome::Success);

    // A second pass in the same minute sees the slot already taken
    kernel.engine.reconcile_at(now + Duration::seconds(20)).await;
    assert_eq!(
        publisher
            .created_posts()
            .iter()
            .filter(|p| p.account_id == "accounts/flow")
            .count(),
        1
    );
}

#[test_context(TestHarness)]
#[tokio::test]
async fn expired_trial_blocks_post_and_expires_subscription(ctx: &TestHarness) {
    let tenant = unique_tenant("flow-expired");
    let now = at(11);
    create_trial(&ctx.db_pool, &tenant, now - Duration::days(1)).await.unwrap();
    create_valid_credential(&ctx.db_pool, &tenant).await.unwrap();
    create_daily_settings(&ctx.db_pool, &tenant, "loc-1", NaiveTime::from_hms_opt(11, 0, 0).unwrap())
        .await
        .unwrap();
    ctx.store()
        .save_account_id(&tenant, "loc-1", "accounts/expired")
        .await
        .unwrap();

    let generator = MockContentGenerator::new();
    let publisher = MockPublisher::new();
    let kernel = kernel(ctx, generator.clone(), publisher.clone());
    kernel.cache.reload().await.unwrap();

    kernel.engine.reconcile_at(now).await;

    assert!(publisher
        .created_posts()
        .iter()
        .all(|p| p.account_id != "accounts/expired"));

    let stored = SubscriptionRecord::find_by_tenant(&tenant, &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(stored.status, SubscriptionStatus::Expired);

    let history = AutomationHistoryEntry::find_for_location(&tenant, "loc-1", 10, &ctx.db_pool)
        .await
        .unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0].outcome, HistoryOutcome::Blocked);

    let row = AutomationSettingsRow::find(&tenant, "loc-1", &ctx.db_pool)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.last_run_at, None);
}

#[tokio::test]
async fn in_memory_daily_post_runs_once_at_its_slot() {
    let now = at(10);
    let store = Arc::new(MemoryStore::new());
    store.put_subscription(SubscriptionRecord::trial("t1", now + Duration::days(5)));
    store.put_credential(Credential::new("t1", "token", "refresh", now + Duration::hours(2)));
    let mut config =
        TenantAutomationConfig::daily("t1", "loc-1", NaiveTime::from_hms_opt(10, 0, 0).unwrap());
    config.last_run_at = Some(now - Duration::days(1));
    config.account_id = Some("accounts/t1".to_string());
    store.put_automation(config);

    let generator = MockContentGenerator::new().with_response("Open late on Fridays");
    let publisher = MockPublisher::new();
    let kernel = TestDependencies::new()
        .store(store.clone())
        .mock_generator(generator.clone())
        .mock_publisher(publisher.clone())
        .into_kernel(&SchedulerSettings::default());
    kernel.cache.reload().await.unwrap();

    let report = kernel.engine.reconcile_at(now).await;
    assert_eq!(report.executed, 1);
    assert_eq!(generator.calls().len(), 1);
    assert_eq!(publisher.created_posts().len(), 1);
    assert_eq!(publisher.created_posts()[0].summary, "Open late on Fridays");
    assert_eq!(store.automation("t1", "loc-1").unwrap().last_run_at, Some(now));
    assert_eq!(store.history().len(), 1);
    assert_eq!(store.history()[0].outcome, HistoryOutcome::Success);

    let next_minute = kernel.engine.reconcile_at(now + Duration::minutes(1)).await;
    assert_eq!(next_minute.due, 0);
    assert_eq!(publisher.created_posts().len(), 1);
}
