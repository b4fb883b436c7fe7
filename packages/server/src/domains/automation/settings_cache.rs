use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::debug;

use super::models::{ActionKey, TenantAutomationConfig};
use crate::kernel::traits::BaseAutomationStore;

#[derive(Default)]
struct Snapshot {
    configs: Arc<Vec<TenantAutomationConfig>>,
    loaded_at: Option<DateTime<Utc>>,
}

/// In-memory copy of every automation config, reloaded on an interval.
///
/// Owned by the schedule engine and shared with the review poller. Between
/// reloads the engine patches last-run in place so the slot gate sees runs
/// that happened since the last load.
pub struct SettingsCache {
    store: Arc<dyn BaseAutomationStore>,
    snapshot: RwLock<Snapshot>,
}

impl SettingsCache {
    pub fn new(store: Arc<dyn BaseAutomationStore>) -> Self {
        Self {
            store,
            snapshot: RwLock::new(Snapshot::default()),
        }
    }

    /// Replace the snapshot from the store. Returns the number of configs.
    pub async fn reload(&self) -> Result<usize> {
        self.reload_at(Utc::now()).await
    }

    pub async fn reload_at(&self, now: DateTime<Utc>) -> Result<usize> {
        let configs = self.store.list_automation_settings().await?;
        let count = configs.len();

        let mut snapshot = self.snapshot.write().await;
        snapshot.configs = Arc::new(configs);
        snapshot.loaded_at = Some(now);

        debug!(configs = count, "Automation settings reloaded");
        Ok(count)
    }

    pub async fn configs(&self) -> Arc<Vec<TenantAutomationConfig>> {
        self.snapshot.read().await.configs.clone()
    }

    pub async fn find(&self, tenant_id: &str, location_id: &str) -> Option<TenantAutomationConfig> {
        self.snapshot
            .read()
            .await
            .configs
            .iter()
            .find(|c| c.tenant_id == tenant_id && c.location_id == location_id)
            .cloned()
    }

    pub async fn loaded_at(&self) -> Option<DateTime<Utc>> {
        self.snapshot.read().await.loaded_at
    }

    /// Never loaded, or last loaded longer than `max_age` ago.
    pub async fn is_stale(&self, now: DateTime<Utc>, max_age: chrono::Duration) -> bool {
        match self.loaded_at().await {
            Some(at) => now - at > max_age,
            None => true,
        }
    }

    /// Record a successful run without waiting for the next reload.
    pub async fn record_run(&self, key: &ActionKey, ran_at: DateTime<Utc>) {
        self.patch(key, |config| {
            config.last_run_at = Some(ran_at);
            config.last_error = None;
        })
        .await;
    }

    pub async fn record_error(&self, key: &ActionKey, error: &str) {
        self.patch(key, |config| config.last_error = Some(error.to_string()))
            .await;
    }

    pub async fn record_account_id(&self, key: &ActionKey, account_id: &str) {
        self.patch(key, |config| config.account_id = Some(account_id.to_string()))
            .await;
    }

    async fn patch(&self, key: &ActionKey, apply: impl FnOnce(&mut TenantAutomationConfig)) {
        let mut snapshot = self.snapshot.write().await;
        let configs = Arc::make_mut(&mut snapshot.configs);
        if let Some(config) = configs
            .iter_mut()
            .find(|c| c.tenant_id == key.tenant_id && c.location_id == key.location_id)
        {
            apply(config);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::automation::models::ActionKind;
    use crate::kernel::test_dependencies::MemoryStore;
    use chrono::{Duration, NaiveTime};

    #[tokio::test]
    async fn reload_replaces_snapshot_and_stamps_time() {
        let store = Arc::new(MemoryStore::new());
        store.put_automation(TenantAutomationConfig::daily("t", "l", NaiveTime::MIN));
        let cache = SettingsCache::new(store.clone());
        let now = Utc::now();

        assert!(cache.is_stale(now, Duration::minutes(5)).await);
        assert_eq!(cache.reload_at(now).await.unwrap(), 1);
        assert_eq!(cache.loaded_at().await, Some(now));
        assert!(!cache.is_stale(now + Duration::minutes(4), Duration::minutes(5)).await);
        assert!(cache.is_stale(now + Duration::minutes(6), Duration::minutes(5)).await);
    }

    #[tokio::test]
    async fn record_run_patches_without_reload() {
        let store = Arc::new(MemoryStore::new());
        let config = TenantAutomationConfig::daily("t", "l", NaiveTime::MIN);
        let key = config.key(ActionKind::Post);
        store.put_automation(config);
        let cache = SettingsCache::new(store.clone());
        cache.reload().await.unwrap();

        let held = cache.configs().await;
        let ran_at = Utc::now();
        cache.record_run(&key, ran_at).await;

        assert_eq!(cache.find("t", "l").await.unwrap().last_run_at, Some(ran_at));
        // Earlier snapshots handed out stay untouched
        assert_eq!(held[0].last_run_at, None);
    }

    #[tokio::test]
    async fn failed_reload_keeps_previous_snapshot() {
        let store = Arc::new(MemoryStore::new());
        store.put_automation(TenantAutomationConfig::daily("t", "l", NaiveTime::MIN));
        let cache = SettingsCache::new(store.clone());
        cache.reload().await.unwrap();

        store.set_fail_settings_reads(true);
        assert!(cache.reload().await.is_err());
        assert_eq!(cache.configs().await.len(), 1);
    }
}
