//! Leadership claims against PostgreSQL.
//!
//! The claim is a single conditional upsert, so concurrent claimants must
//! never both win.

mod common;

use crate::common::TestHarness;
use automation_core::kernel::BaseLeadershipStore;
use chrono::{Duration, Utc};
use futures::future::join_all;
use serde_json::json;
use test_context::test_context;
use uuid::Uuid;

fn unique_role() -> String {
    format!("scheduler-test-{}", Uuid::new_v4())
}

#[test_context(TestHarness)]
#[tokio::test]
async fn concurrent_claims_elect_exactly_one_holder(ctx: &TestHarness) {
    let store = ctx.store();
    let role = unique_role();
    let now = Utc::now();
    let stale_before = now - Duration::seconds(60);
    let holders: Vec<String> = (0..8).map(|i| format!("replica-{i}")).collect();

    let results = join_all(holders.iter().map(|holder| {
        let store = store.clone();
        let role = role.clone();
        async move {
            store
                .try_claim_leadership(&role, holder, now, stale_before, &json!({}))
                .await
                .unwrap()
        }
    }))
    .await;

    assert_eq!(results.iter().filter(|won| **won).count(), 1);

    let winner = holders
        .iter()
        .zip(&results)
        .find(|(_, won)| **won)
        .map(|(holder, _)| holder.clone())
        .unwrap();
    let record = store.find_leader(&role).await.unwrap().unwrap();
    assert_eq!(record.holder_id, winner);
}

#[test_context(TestHarness)]
#[tokio::test]
async fn live_holder_cannot_be_displaced(ctx: &TestHarness) {
    let store = ctx.store();
    let role = unique_role();
    let now = Utc::now();

    assert!(store
        .try_claim_leadership(&role, "a", now, now - Duration::seconds(60), &json!({}))
        .await
        .unwrap());

    let later = now + Duration::seconds(10);
    let taken = store
        .try_claim_leadership(&role, "b", later, later - Duration::seconds(60), &json!({}))
        .await
        .unwrap();

    assert!(!taken);
    assert_eq!(store.find_leader(&role).await.unwrap().unwrap().holder_id, "a");
}

#[test_context(TestHarness)]
#[tokio::test]
async fn stale_holder_is_taken_over(ctx: &TestHarness) {
    let store = ctx.store();
    let role = unique_role();
    let start = Utc::now();

    store
        .try_claim_leadership(&role, "a", start, start - Duration::seconds(60), &json!({}))
        .await
        .unwrap();

    let later = start + Duration::seconds(90);
    let taken = store
        .try_claim_leadership(
            &role,
            "b",
            later,
            later - Duration::seconds(60),
            &json!({ "host": "replica-b" }),
        )
        .await
        .unwrap();

    assert!(taken);
    let record = store.find_leader(&role).await.unwrap().unwrap();
    assert_eq!(record.holder_id, "b");
    assert_eq!(record.metadata["host"], "replica-b");

    // The displaced holder's heartbeat no longer lands
    assert!(!store.heartbeat_leadership(&role, "a", later).await.unwrap());
    assert!(store.heartbeat_leadership(&role, "b", later).await.unwrap());
}

#[test_context(TestHarness)]
#[tokio::test]
async fn release_only_removes_own_record(ctx: &TestHarness) {
    let store = ctx.store();
    let role = unique_role();
    let now = Utc::now();

    store
        .try_claim_leadership(&role, "a", now, now - Duration::seconds(60), &json!({}))
        .await
        .unwrap();

    assert!(!store.release_leadership(&role, "b").await.unwrap());
    assert!(store.find_leader(&role).await.unwrap().is_some());

    assert!(store.release_leadership(&role, "a").await.unwrap());
    assert!(store.find_leader(&role).await.unwrap().is_none());
}
