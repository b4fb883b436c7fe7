// ServerKernel - the automation components wired together
//
// Built once at process start from ServerDeps. Every component is an explicit
// instance taking its collaborators through the constructor, so tests build
// the same graph over MemoryStore and mocks.

use std::sync::Arc;

use super::deps::ServerDeps;
use super::service_host::Service;
use crate::config::SchedulerSettings;
use crate::domains::actions::{ActionExecutor, ExecutorSettings};
use crate::domains::automation::{DuplicateActionLock, ScheduleEngine, SettingsCache};
use crate::domains::credentials::TokenProvider;
use crate::domains::leadership::LeaderCoordinator;
use crate::domains::reviews::ReviewPoller;
use crate::domains::subscriptions::SubscriptionGuard;

pub struct ServerKernel {
    pub deps: ServerDeps,
    pub settings: SchedulerSettings,
    pub guard: Arc<SubscriptionGuard>,
    pub tokens: Arc<TokenProvider>,
    pub lock: Arc<DuplicateActionLock>,
    pub cache: Arc<SettingsCache>,
    pub executor: Arc<ActionExecutor>,
    pub engine: Arc<ScheduleEngine>,
    pub poller: Arc<ReviewPoller>,
    /// Runs `engine` and `poller` while this process holds leadership
    pub coordinator: Arc<LeaderCoordinator>,
}

impl ServerKernel {
    pub fn build(deps: ServerDeps, settings: SchedulerSettings) -> Arc<Self> {
        let guard = Arc::new(SubscriptionGuard::new(deps.subscriptions.clone()));
        let tokens = Arc::new(TokenProvider::new(
            deps.credentials.clone(),
            deps.token_endpoint.clone(),
            settings.token_refresh_buffer,
            settings.external_call_timeout,
        ));
        let lock = Arc::new(DuplicateActionLock::new(settings.dedupe_window));
        let cache = Arc::new(SettingsCache::new(deps.automation.clone()));

        let executor = Arc::new(ActionExecutor::new(
            tokens.clone(),
            deps.generator.clone(),
            deps.publisher.clone(),
            deps.automation.clone(),
            deps.replies.clone(),
            deps.history.clone(),
            cache.clone(),
            ExecutorSettings::from(&settings),
        ));

        let engine = Arc::new(ScheduleEngine::new(
            cache.clone(),
            guard.clone(),
            lock.clone(),
            executor.clone(),
            deps.automation.clone(),
            &settings,
        ));

        let poller = Arc::new(ReviewPoller::new(
            cache.clone(),
            guard.clone(),
            lock.clone(),
            executor.clone(),
            settings.review_poll_interval,
        ));

        let duties: Vec<Arc<dyn Service>> = vec![engine.clone(), poller.clone()];
        let coordinator = Arc::new(LeaderCoordinator::new(
            deps.leadership.clone(),
            duties,
            &settings,
        ));

        Arc::new(Self {
            deps,
            settings,
            guard,
            tokens,
            lock,
            cache,
            executor,
            engine,
            poller,
            coordinator,
        })
    }
}
