//! Schedule engine: cron timers plus a once-a-minute reconciliation pass.
//!
//! ```text
//! JobScheduler (per config, tenant tz)      reconcile tick (every minute)
//!          │                                         │
//!          └─► fire_timer_at(key)                    └─► evaluate every armed config
//!                  │                                          │
//!                  └──────────────► dispatch_at ◄─────────────┘
//!                                       │
//!                                       ├─► DuplicateActionLock (held → deduplicated)
//!                                       ├─► SubscriptionGuard   (deny → history: blocked)
//!                                       └─► ActionExecutor (post)
//! ```
//!
//! Both layers go through [`ScheduleEngine::dispatch_at`], so a timer firing
//! and a reconciliation tick landing in the same minute collapse onto one
//! execution, or onto one `blocked` record.
//!
//! Passes in flight are raced against the duty token: losing leadership
//! drops them at their next await point.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Timelike, Utc};
use futures::future::join_all;
use serde::Serialize;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::dedupe::DuplicateActionLock;
use super::models::{ActionKey, ActionKind, TenantAutomationConfig};
use super::schedule::{cron_expressions, evaluate, next_trigger_after, DueDecision};
use super::settings_cache::SettingsCache;
use crate::config::SchedulerSettings;
use crate::domains::actions::ActionExecutor;
use crate::domains::history::models::HistoryOutcome;
use crate::domains::subscriptions::SubscriptionGuard;
use crate::kernel::service_host::{until_cancelled, Service};
use crate::kernel::traits::BaseAutomationStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigState {
    /// Posting disabled or no cadence
    Idle,
    /// Cadence computed, waiting for a trigger
    Armed,
    /// Trigger minute reached, not yet claimed
    Due,
    Executing,
    /// Executed, duplicate lock still held
    Cooling,
}

/// What happened to one due action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Executed,
    Failed,
    Blocked,
    Deduplicated,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub armed: usize,
    pub due: usize,
    pub executed: usize,
    pub blocked: usize,
    pub deduplicated: usize,
    pub failed: usize,
}

impl ReconcileReport {
    fn count(&mut self, dispatch: Dispatch) {
        match dispatch {
            Dispatch::Executed => self.executed += 1,
            Dispatch::Failed => self.failed += 1,
            Dispatch::Blocked => self.blocked += 1,
            Dispatch::Deduplicated => self.deduplicated += 1,
        }
    }
}

pub struct ScheduleEngine {
    cache: Arc<SettingsCache>,
    guard: Arc<SubscriptionGuard>,
    lock: Arc<DuplicateActionLock>,
    executor: Arc<ActionExecutor>,
    automation: Arc<dyn BaseAutomationStore>,
    reconcile_interval: Duration,
    reload_interval: Duration,
    states: Mutex<HashMap<ActionKey, ConfigState>>,
    timers: tokio::sync::Mutex<Option<JobScheduler>>,
}

impl ScheduleEngine {
    pub fn new(
        cache: Arc<SettingsCache>,
        guard: Arc<SubscriptionGuard>,
        lock: Arc<DuplicateActionLock>,
        executor: Arc<ActionExecutor>,
        automation: Arc<dyn BaseAutomationStore>,
        settings: &SchedulerSettings,
    ) -> Self {
        Self {
            cache,
            guard,
            lock,
            executor,
            automation,
            reconcile_interval: settings.reconcile_interval,
            reload_interval: settings.settings_reload_interval,
            states: Mutex::new(HashMap::new()),
            timers: tokio::sync::Mutex::new(None),
        }
    }

    pub fn cache(&self) -> &Arc<SettingsCache> {
        &self.cache
    }

    /// Current state of a config's post action. `Cooling` decays back to
    /// `Armed` once the duplicate lock has expired.
    pub fn state_at(&self, key: &ActionKey, now: DateTime<Utc>) -> ConfigState {
        let state = self
            .states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(key)
            .copied()
            .unwrap_or(ConfigState::Idle);

        match state {
            ConfigState::Cooling if !self.lock.is_held_at(key, now) => ConfigState::Armed,
            other => other,
        }
    }

    fn set_state(&self, key: &ActionKey, state: ConfigState) {
        self.states
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(key.clone(), state);
    }

    /// Number of configs currently eligible for scheduling.
    pub async fn armed_count(&self) -> usize {
        self.cache
            .configs()
            .await
            .iter()
            .filter(|c| c.is_schedulable())
            .count()
    }

    pub async fn reconcile(&self) -> ReconcileReport {
        self.reconcile_at(Utc::now()).await
    }

    /// One reconciliation pass over the cached configs.
    ///
    /// Due actions run concurrently; a failure in one never stops the others.
    pub async fn reconcile_at(&self, now: DateTime<Utc>) -> ReconcileReport {
        let configs = self.cache.configs().await;
        let mut report = ReconcileReport::default();
        let mut due = Vec::new();

        for config in configs.iter() {
            let key = config.key(ActionKind::Post);
            if !config.is_schedulable() {
                self.set_state(&key, ConfigState::Idle);
                continue;
            }
            report.armed += 1;

            let decision = evaluate(config, now);
            if decision.is_due() {
                self.set_state(&key, ConfigState::Due);
                due.push(config);
            } else if self.state_at(&key, now) == ConfigState::Idle {
                self.set_state(&key, ConfigState::Armed);
            }
        }
        report.due = due.len();

        let dispatches = join_all(due.into_iter().map(|config| self.dispatch_at(config, now))).await;
        for dispatch in dispatches {
            report.count(dispatch);
        }

        if report.due > 0 {
            info!(
                armed = report.armed,
                due = report.due,
                executed = report.executed,
                blocked = report.blocked,
                deduplicated = report.deduplicated,
                failed = report.failed,
                "Reconciliation pass complete"
            );
        } else {
            debug!(armed = report.armed, "Reconciliation pass found nothing due");
        }
        report
    }

    /// Guarded execution of one due post action.
    pub async fn dispatch_at(&self, config: &TenantAutomationConfig, now: DateTime<Utc>) -> Dispatch {
        let key = config.key(ActionKind::Post);

        // A timer and a tick in the same window: the second one stops here
        if !self.lock.try_claim_at(&key, now) {
            debug!(action = %key, "Action already claimed in this window");
            return Dispatch::Deduplicated;
        }

        let decision = self
            .guard
            .validate_at(&config.tenant_id, ActionKind::Post, now)
            .await;
        if !decision.allowed {
            let reason = decision.reason.as_deref().unwrap_or("subscription inactive");
            self.executor
                .record_outcome(&key, HistoryOutcome::Blocked, reason, now)
                .await;
            self.set_state(&key, ConfigState::Armed);
            return Dispatch::Blocked;
        }

        self.set_state(&key, ConfigState::Executing);
        let dispatch = match self.executor.execute_at(config, ActionKind::Post, now).await {
            Ok(_) => {
                self.cache.record_run(&key, now).await;
                Dispatch::Executed
            }
            Err(e) => {
                self.cache.record_error(&key, &e.to_string()).await;
                Dispatch::Failed
            }
        };
        self.set_state(&key, ConfigState::Cooling);
        dispatch
    }

    /// Cron callback: re-check against the cached config, then dispatch.
    ///
    /// A trigger that the every-N-days gate turns away is recorded as
    /// `skipped`; other non-due fires are dropped silently.
    pub async fn fire_timer_at(&self, key: &ActionKey, now: DateTime<Utc>) -> Option<Dispatch> {
        let Some(config) = self.cache.find(&key.tenant_id, &key.location_id).await else {
            debug!(action = %key, "Timer fired for a config that is no longer cached");
            return None;
        };

        match evaluate(&config, now) {
            DueDecision::Due { .. } => {
                let dispatch = self.dispatch_at(&config, now).await;
                debug!(action = %key, dispatch = ?dispatch, "Timer dispatch finished");
                Some(dispatch)
            }
            DueDecision::TooSoon { eligible_at } => {
                let detail = format!("interval not elapsed, eligible at {}", eligible_at.to_rfc3339());
                self.executor
                    .record_outcome(key, HistoryOutcome::Skipped, &detail, now)
                    .await;
                None
            }
            decision => {
                debug!(action = %key, decision = ?decision, "Timer fired but action is not due");
                None
            }
        }
    }

    /// Register cron jobs for every schedulable config, replacing the
    /// previous set. Callbacks stop dispatching once `shutdown` is
    /// cancelled. Returns the number of jobs registered.
    pub async fn arm_timers(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<usize> {
        let configs = self.cache.configs().await;
        let scheduler = JobScheduler::new().await?;
        let now = Utc::now();
        let mut registered = 0;

        for config in configs.iter() {
            let key = config.key(ActionKind::Post);
            let expressions = cron_expressions(config);
            if expressions.is_empty() {
                self.set_state(&key, ConfigState::Idle);
                continue;
            }
            if matches!(self.state_at(&key, now), ConfigState::Idle) {
                self.set_state(&key, ConfigState::Armed);
            }

            for expression in expressions {
                let engine = Arc::clone(self);
                let job_key = key.clone();
                let job_token = shutdown.clone();
                let job = Job::new_async_tz(expression.as_str(), config.tz(), move |_uuid, _lock| {
                    let engine = engine.clone();
                    let key = job_key.clone();
                    let token = job_token.clone();
                    Box::pin(async move {
                        until_cancelled(&token, engine.fire_timer_at(&key, Utc::now())).await;
                    })
                });

                match job {
                    Ok(job) => {
                        scheduler.add(job).await?;
                        registered += 1;
                    }
                    Err(e) => {
                        warn!(action = %key, expression = %expression, error = ?e, "Invalid cron expression");
                    }
                }
            }

            let next_run_at = next_trigger_after(config, now);
            if let Err(e) = self
                .automation
                .set_next_run_at(&config.tenant_id, &config.location_id, next_run_at)
                .await
            {
                warn!(action = %key, error = %e, "Failed to record next run");
            }
        }

        scheduler.start().await?;

        let previous = self.timers.lock().await.replace(scheduler);
        if let Some(mut previous) = previous {
            if let Err(e) = previous.shutdown().await {
                warn!(error = ?e, "Failed to shut down previous timers");
            }
        }

        info!(jobs = registered, configs = configs.len(), "Automation timers armed");
        Ok(registered)
    }

    /// Stop every registered cron job.
    pub async fn disarm(&self) {
        if let Some(mut scheduler) = self.timers.lock().await.take() {
            if let Err(e) = scheduler.shutdown().await {
                warn!(error = ?e, "Failed to shut down timers");
            }
        }
    }

    pub async fn reload_and_arm(self: &Arc<Self>, shutdown: &CancellationToken) -> Result<usize> {
        self.cache.reload().await?;
        self.arm_timers(shutdown).await
    }

    /// Forget per-config state once the engine stops leading.
    fn reset_states(&self) {
        self.states.lock().unwrap_or_else(|e| e.into_inner()).clear();
    }
}

/// First reconciliation lands just after the next minute boundary.
fn next_minute_boundary() -> Instant {
    let now = Utc::now();
    let into_minute = Duration::from_secs(u64::from(now.second()))
        + Duration::from_nanos(u64::from(now.nanosecond() % 1_000_000_000));
    let until = Duration::from_secs(60)
        .saturating_sub(into_minute)
        .saturating_add(Duration::from_secs(1));
    Instant::now() + until
}

#[async_trait]
impl Service for ScheduleEngine {
    fn name(&self) -> &'static str {
        "schedule-engine"
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        if let Some(Err(e)) = until_cancelled(&shutdown, self.reload_and_arm(&shutdown)).await {
            warn!(error = %e, "Initial settings load failed, retrying on next reload");
        }
        // A leader taking over mid-minute still catches that minute's slots
        until_cancelled(&shutdown, self.reconcile()).await;

        let mut reconcile = tokio::time::interval_at(next_minute_boundary(), self.reconcile_interval);
        reconcile.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut reload = tokio::time::interval_at(
            Instant::now() + self.reload_interval,
            self.reload_interval,
        );
        reload.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = reconcile.tick() => {
                    if until_cancelled(&shutdown, self.reconcile()).await.is_none() {
                        break;
                    }
                }
                _ = reload.tick() => {
                    match until_cancelled(&shutdown, self.reload_and_arm(&shutdown)).await {
                        None => break,
                        Some(Err(e)) => {
                            warn!(error = %e, "Settings reload failed, keeping previous snapshot");
                        }
                        Some(Ok(_)) => {}
                    }
                }
            }
        }

        self.disarm().await;
        self.reset_states();
        info!("Schedule engine stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::credentials::models::Credential;
    use crate::domains::subscriptions::models::{SubscriptionRecord, SubscriptionStatus};
    use crate::domains::automation::models::Cadence;
    use crate::kernel::test_dependencies::{
        MemoryStore, MockContentGenerator, MockPublisher, TestDependencies,
    };
    use chrono::{Duration as ChronoDuration, DurationRound, NaiveTime};

    fn at(s: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
    }

    fn daily(tenant: &str, hour: u32) -> TenantAutomationConfig {
        let mut config = TenantAutomationConfig::daily(
            tenant,
            format!("{tenant}-loc"),
            NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        );
        config.account_id = Some(format!("{tenant}-acct"));
        config
    }

    fn connect(store: &MemoryStore, tenant: &str, now: DateTime<Utc>) {
        store.put_credential(Credential::new(tenant, "token", "refresh", now + ChronoDuration::hours(2)));
    }

    async fn engine_with(store: Arc<MemoryStore>, publisher: MockPublisher) -> Arc<ScheduleEngine> {
        let kernel = TestDependencies::new()
            .store(store)
            .mock_publisher(publisher)
            .into_kernel(&SchedulerSettings::default());
        kernel.engine.cache().reload().await.unwrap();
        kernel.engine.clone()
    }

    #[tokio::test]
    async fn due_config_executes_once_per_slot() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let mut config = daily("t1", 9);
        config.last_run_at = Some(now - ChronoDuration::days(1));
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        let engine = engine_with(store.clone(), MockPublisher::new()).await;

        let report = engine.reconcile_at(now).await;
        assert_eq!(report.due, 1);
        assert_eq!(report.executed, 1);
        assert_eq!(
            engine.state_at(&config.key(ActionKind::Post), now),
            ConfigState::Cooling
        );

        // Same minute: the slot gate sees the patched last-run
        let again = engine.reconcile_at(now + ChronoDuration::seconds(30)).await;
        assert_eq!(again.due, 0);

        // Next minute is not a trigger minute
        let later = engine.reconcile_at(now + ChronoDuration::minutes(1)).await;
        assert_eq!(later.due, 0);
        assert_eq!(store.automation("t1", "t1-loc").unwrap().last_run_at, Some(now));
    }

    #[tokio::test]
    async fn timer_and_tick_in_same_window_execute_once() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let config = daily("t1", 9);
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        let publisher = MockPublisher::new();
        let kernel = TestDependencies::new()
            .store(store.clone())
            .mock_publisher(publisher.clone())
            .into_kernel(&SchedulerSettings::default());
        kernel.engine.cache().reload().await.unwrap();

        let (first, second) = tokio::join!(
            kernel.engine.dispatch_at(&config, now),
            kernel.engine.dispatch_at(&config, now + ChronoDuration::seconds(1)),
        );

        let mut outcomes = vec![first, second];
        outcomes.sort_by_key(|d| *d as u8);
        assert_eq!(outcomes, vec![Dispatch::Executed, Dispatch::Deduplicated]);
        assert_eq!(publisher.created_posts().len(), 1);
    }

    #[tokio::test]
    async fn expired_subscription_is_blocked_and_recorded() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        store.put_automation(daily("t1", 9));
        connect(&store, "t1", now);
        store.put_subscription(SubscriptionRecord::trial("t1", now - ChronoDuration::days(1)));
        let engine = engine_with(store.clone(), MockPublisher::new()).await;

        let report = engine.reconcile_at(now).await;

        assert_eq!(report.blocked, 1);
        assert_eq!(report.executed, 0);
        assert_eq!(store.subscription("t1").unwrap().status, SubscriptionStatus::Expired);
        assert_eq!(store.history()[0].outcome, HistoryOutcome::Blocked);
        assert!(store.automation("t1", "t1-loc").unwrap().last_run_at.is_none());
    }

    #[tokio::test]
    async fn one_tenant_failing_does_not_stop_the_pass() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        store.put_automation(daily("good", 9));
        store.put_automation(daily("no-credential", 9));
        connect(&store, "good", now);
        let engine = engine_with(store.clone(), MockPublisher::new()).await;

        let report = engine.reconcile_at(now).await;

        assert_eq!(report.due, 2);
        assert_eq!(report.executed, 1);
        assert_eq!(report.failed, 1);
        let failed = store.automation("no-credential", "no-credential-loc").unwrap();
        assert!(failed.last_run_at.is_none());
        assert!(failed.last_error.is_some());
    }

    #[tokio::test]
    async fn disabled_configs_stay_idle() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let mut config = daily("t1", 9);
        config.posting_enabled = false;
        store.put_automation(config.clone());
        let engine = engine_with(store, MockPublisher::new()).await;

        let report = engine.reconcile_at(now).await;

        assert_eq!(report, ReconcileReport::default());
        assert_eq!(
            engine.state_at(&config.key(ActionKind::Post), now),
            ConfigState::Idle
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn arming_registers_jobs_and_next_run() {
        let store = Arc::new(MemoryStore::new());
        store.put_automation(daily("t1", 9));
        let mut off = daily("t2", 9);
        off.posting_enabled = false;
        store.put_automation(off);
        let engine = engine_with(store.clone(), MockPublisher::new()).await;

        let jobs = engine.arm_timers(&CancellationToken::new()).await.unwrap();
        engine.disarm().await;

        assert_eq!(jobs, 1);
        assert!(store.automation("t1", "t1-loc").unwrap().next_run_at.is_some());
        assert!(store.automation("t2", "t2-loc").unwrap().next_run_at.is_none());
        assert_eq!(engine.armed_count().await, 1);
    }

    #[tokio::test]
    async fn blocked_action_is_recorded_once_per_window() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let config = daily("t1", 9);
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        store.put_subscription(SubscriptionRecord::trial("t1", now - ChronoDuration::days(1)));
        let engine = engine_with(store.clone(), MockPublisher::new()).await;

        let first = engine.dispatch_at(&config, now).await;
        let second = engine.dispatch_at(&config, now + ChronoDuration::seconds(1)).await;

        assert_eq!(first, Dispatch::Blocked);
        assert_eq!(second, Dispatch::Deduplicated);
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, HistoryOutcome::Blocked);
    }

    #[tokio::test]
    async fn timer_fire_dispatches_only_cached_due_configs() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let config = daily("t1", 9);
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        let publisher = MockPublisher::new();
        let engine = engine_with(store.clone(), publisher.clone()).await;

        let unknown = daily("gone", 9).key(ActionKind::Post);
        assert_eq!(engine.fire_timer_at(&unknown, now).await, None);

        let key = config.key(ActionKind::Post);
        assert_eq!(
            engine.fire_timer_at(&key, now + ChronoDuration::hours(1)).await,
            None
        );
        assert_eq!(engine.fire_timer_at(&key, now).await, Some(Dispatch::Executed));
        assert_eq!(publisher.created_posts().len(), 1);
        assert!(store.history().iter().all(|h| h.outcome != HistoryOutcome::Skipped));
    }

    #[tokio::test]
    async fn timer_fire_inside_interval_is_recorded_as_skipped() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let mut config = daily("t1", 9);
        config.cadence = Some(Cadence::EveryNDays(2));
        config.last_run_at = Some(now - ChronoDuration::hours(36));
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        let publisher = MockPublisher::new();
        let engine = engine_with(store.clone(), publisher.clone()).await;

        let fired = engine.fire_timer_at(&config.key(ActionKind::Post), now).await;

        assert_eq!(fired, None);
        assert!(publisher.created_posts().is_empty());
        let history = store.history();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].outcome, HistoryOutcome::Skipped);
    }

    #[tokio::test]
    async fn resolved_account_is_reused_on_later_runs() {
        let store = Arc::new(MemoryStore::new());
        let now = at("2026-03-10T09:00:00Z");
        let mut config = daily("t1", 9);
        config.account_id = None;
        store.put_automation(config);
        connect(&store, "t1", now);
        let publisher = MockPublisher::new().with_accounts(vec!["accounts/42"]);
        let engine = engine_with(store.clone(), publisher.clone()).await;

        assert_eq!(engine.reconcile_at(now).await.executed, 1);
        let tomorrow = now + ChronoDuration::days(1);
        connect(&store, "t1", tomorrow);
        assert_eq!(engine.reconcile_at(tomorrow).await.executed, 1);

        assert_eq!(publisher.created_posts().len(), 2);
        assert_eq!(publisher.account_lookups(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn cancelling_run_abandons_the_post_in_flight() {
        let store = Arc::new(MemoryStore::new());
        let now = Utc::now();
        let this_minute = now.duration_trunc(ChronoDuration::minutes(1)).unwrap();
        let mut config = daily("t1", 9);
        config.cadence = Some(Cadence::Custom(vec![
            this_minute.time(),
            (this_minute + ChronoDuration::minutes(1)).time(),
        ]));
        store.put_automation(config.clone());
        connect(&store, "t1", now);
        let generator = MockContentGenerator::new().with_delay(Duration::from_secs(30));
        let publisher = MockPublisher::new();
        let settings = SchedulerSettings::builder()
            .external_call_timeout(Duration::from_secs(120))
            .build();
        let kernel = TestDependencies::new()
            .store(store.clone())
            .mock_generator(generator.clone())
            .mock_publisher(publisher.clone())
            .into_kernel(&settings);
        let token = CancellationToken::new();

        let handle = tokio::spawn(kernel.engine.clone().run(token.clone()));
        tokio::time::timeout(Duration::from_secs(90), async {
            while generator.calls().is_empty() {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .expect("a post should start generating");

        token.cancel();
        tokio::time::timeout(Duration::from_secs(5), handle)
            .await
            .expect("engine should stop promptly")
            .unwrap()
            .unwrap();

        assert!(publisher.created_posts().is_empty());
        assert!(store.automation("t1", "t1-loc").unwrap().last_run_at.is_none());
        assert_eq!(
            kernel.engine.state_at(&config.key(ActionKind::Post), Utc::now()),
            ConfigState::Idle
        );
    }
}
