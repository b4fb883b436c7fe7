//! Elects a single scheduler process over the shared leadership record.
//!
//! ```text
//! every heartbeat interval
//!     Follower: read record ─► absent / stale / ours ─► conditional claim ─► re-read
//!                                                          └─► holder is us → Leader (start duties)
//!     Leader:   heartbeat ─► written → stay
//!                         └─► not written / error → Follower (cancel duties)
//! ```
//!
//! There is no fencing token: for up to one timeout after a partition, zero
//! or two processes may believe they lead.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::models::SCHEDULER_ROLE;
use crate::config::SchedulerSettings;
use crate::kernel::service_host::Service;
use crate::kernel::traits::BaseLeadershipStore;

struct RunningDuties {
    token: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

pub struct LeaderCoordinator {
    store: Arc<dyn BaseLeadershipStore>,
    role: String,
    holder_id: String,
    heartbeat_interval: Duration,
    timeout: chrono::Duration,
    metadata: serde_json::Value,
    is_leader: AtomicBool,
    duties: Vec<Arc<dyn Service>>,
    running: Mutex<Option<RunningDuties>>,
}

impl LeaderCoordinator {
    pub fn new(
        store: Arc<dyn BaseLeadershipStore>,
        duties: Vec<Arc<dyn Service>>,
        settings: &SchedulerSettings,
    ) -> Self {
        let holder_id = format!("scheduler-{}", Uuid::new_v4());
        let metadata = json!({
            "pid": std::process::id(),
            "host": std::env::var("HOSTNAME").unwrap_or_else(|_| "unknown".to_string()),
            "started_at": Utc::now(),
        });

        Self {
            store,
            role: SCHEDULER_ROLE.to_string(),
            holder_id,
            heartbeat_interval: settings.heartbeat_interval,
            timeout: chrono::Duration::from_std(settings.leader_timeout())
                .unwrap_or_else(|_| chrono::Duration::seconds(90)),
            metadata,
            is_leader: AtomicBool::new(false),
            duties,
            running: Mutex::new(None),
        }
    }

    pub fn holder_id(&self) -> &str {
        &self.holder_id
    }

    pub fn is_leader(&self) -> bool {
        self.is_leader.load(Ordering::SeqCst)
    }

    /// One heartbeat-interval step. Returns whether this process leads
    /// afterwards.
    pub async fn tick_at(&self, now: DateTime<Utc>, shutdown: &CancellationToken) -> bool {
        if self.is_leader() {
            match self
                .store
                .heartbeat_leadership(&self.role, &self.holder_id, now)
                .await
            {
                Ok(true) => {
                    debug!(holder_id = %self.holder_id, "Leadership heartbeat written");
                    return true;
                }
                Ok(false) => {
                    warn!(holder_id = %self.holder_id, "Leadership record taken over, stepping down");
                }
                Err(e) => {
                    warn!(holder_id = %self.holder_id, error = %e, "Heartbeat write failed, stepping down");
                }
            }
            self.demote().await;
            return false;
        }

        let current = match self.store.find_leader(&self.role).await {
            Ok(current) => current,
            Err(e) => {
                warn!(error = %e, "Failed to read leadership record");
                return false;
            }
        };

        if let Some(record) = &current {
            if record.holder_id != self.holder_id && !record.is_stale_at(now, self.timeout) {
                debug!(leader = %record.holder_id, "Following live leader");
                return false;
            }
        }

        let stale_before = now - self.timeout;
        match self
            .store
            .try_claim_leadership(&self.role, &self.holder_id, now, stale_before, &self.metadata)
            .await
        {
            Ok(true) => {}
            Ok(false) => {
                debug!("Leadership claim lost the race");
                return false;
            }
            Err(e) => {
                warn!(error = %e, "Leadership claim failed");
                return false;
            }
        }

        match self.store.find_leader(&self.role).await {
            Ok(Some(record)) if record.holder_id == self.holder_id => {
                self.promote(shutdown).await;
                true
            }
            Ok(_) => false,
            Err(e) => {
                warn!(error = %e, "Failed to verify leadership claim");
                false
            }
        }
    }

    async fn promote(&self, shutdown: &CancellationToken) {
        let mut running = self.running.lock().await;
        if running.is_some() {
            self.is_leader.store(true, Ordering::SeqCst);
            return;
        }

        let token = shutdown.child_token();
        let handles = self
            .duties
            .iter()
            .map(|duty| {
                let duty = Arc::clone(duty);
                let token = token.clone();
                tokio::spawn(async move {
                    let name = duty.name();
                    if let Err(e) = duty.run(token).await {
                        error!(service = name, error = %e, "Leader duty failed");
                    }
                })
            })
            .collect();

        *running = Some(RunningDuties { token, handles });
        self.is_leader.store(true, Ordering::SeqCst);
        info!(holder_id = %self.holder_id, duties = self.duties.len(), "Became scheduler leader");
    }

    async fn demote(&self) {
        self.is_leader.store(false, Ordering::SeqCst);
        let duties = self.running.lock().await.take();
        if let Some(duties) = duties {
            duties.token.cancel();
            for handle in duties.handles {
                if let Err(e) = handle.await {
                    warn!(error = %e, "Leader duty did not stop cleanly");
                }
            }
            info!(holder_id = %self.holder_id, "Stepped down as scheduler leader");
        }
    }

    /// Stop duties and hand the record back so a successor need not wait
    /// out the timeout.
    pub async fn step_down(&self) {
        let was_leader = self.is_leader();
        self.demote().await;
        if !was_leader {
            return;
        }

        match self.store.release_leadership(&self.role, &self.holder_id).await {
            Ok(true) => info!(holder_id = %self.holder_id, "Leadership record released"),
            Ok(false) => debug!("Leadership record already held by another process"),
            Err(e) => warn!(error = %e, "Failed to release leadership record"),
        }
    }
}

#[async_trait]
impl Service for LeaderCoordinator {
    fn name(&self) -> &'static str {
        "leader-coordinator"
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let mut ticker = tokio::time::interval(self.heartbeat_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        info!(holder_id = %self.holder_id, "Leader coordinator started");

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    self.tick_at(Utc::now(), &shutdown).await;
                }
            }
        }

        self.step_down().await;
        Ok(())
    }
}
