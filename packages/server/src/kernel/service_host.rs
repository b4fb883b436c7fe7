//! Long-running service hosting with cooperative shutdown.
//!
//! ```ignore
//! ServiceHost::new()
//!     .with_service(coordinator)
//!     .with_service(http)
//!     .run_until_shutdown()
//!     .await;
//! ```

use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use futures::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// A long-running component. `run` returns once `shutdown` is cancelled.
#[async_trait]
pub trait Service: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Default)]
pub struct ServiceHost {
    services: Vec<Arc<dyn Service>>,
    shutdown: CancellationToken,
}

impl ServiceHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_service(mut self, service: Arc<dyn Service>) -> Self {
        self.services.push(service);
        self
    }

    /// Token cancelled when the host shuts down.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Run every service until Ctrl-C / SIGTERM, then cancel and wait for all.
    pub async fn run_until_shutdown(self) {
        let token = self.shutdown.clone();
        tokio::spawn(async move {
            wait_for_signal().await;
            info!("received shutdown signal");
            token.cancel();
        });

        self.run().await;
    }

    /// Run every service until the shutdown token is cancelled.
    pub async fn run(self) {
        let shutdown = self.shutdown;
        let runs = self.services.into_iter().map(|service| {
            let token = shutdown.clone();
            async move {
                let name = service.name();
                info!(service = name, "service starting");
                match service.run(token.clone()).await {
                    Ok(()) => info!(service = name, "service stopped"),
                    Err(e) => {
                        error!(service = name, error = %e, "service failed");
                        // One failed service takes the host down
                        token.cancel();
                    }
                }
            }
        });

        join_all(runs).await;
    }
}

/// Drive `work` until it finishes or `shutdown` is cancelled, whichever is
/// first. On cancellation `work` is dropped at its current await point and
/// `None` is returned.
pub async fn until_cancelled<F: Future>(shutdown: &CancellationToken, work: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.cancelled() => None,
        output = work => Some(output),
    }
}

async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(_) => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        stopped: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Service for Counting {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
            shutdown.cancelled().await;
            self.stopped.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    #[async_trait]
    impl Service for Failing {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn run(self: Arc<Self>, _shutdown: CancellationToken) -> Result<()> {
            anyhow::bail!("boom")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_drops_work_in_flight() {
        let token = CancellationToken::new();
        let finished = Arc::new(AtomicUsize::new(0));
        let work = {
            let finished = finished.clone();
            async move {
                tokio::time::sleep(std::time::Duration::from_secs(60)).await;
                finished.fetch_add(1, Ordering::SeqCst);
            }
        };

        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(std::time::Duration::from_secs(1)).await;
            canceller.cancel();
        });

        assert!(until_cancelled(&token, work).await.is_none());
        tokio::time::sleep(std::time::Duration::from_secs(120)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn finished_work_returns_its_output() {
        let token = CancellationToken::new();
        assert_eq!(until_cancelled(&token, async { 7 }).await, Some(7));

        token.cancel();
        assert_eq!(until_cancelled(&token, async { 7 }).await, None);
    }

    #[tokio::test]
    async fn cancelling_token_stops_all_services() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let host = ServiceHost::new()
            .with_service(Arc::new(Counting { stopped: stopped.clone() }))
            .with_service(Arc::new(Counting { stopped: stopped.clone() }));
        let token = host.shutdown_token();

        let handle = tokio::spawn(host.run());
        token.cancel();
        handle.await.unwrap();

        assert_eq!(stopped.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failing_service_shuts_down_the_rest() {
        let stopped = Arc::new(AtomicUsize::new(0));
        let host = ServiceHost::new()
            .with_service(Arc::new(Counting { stopped: stopped.clone() }))
            .with_service(Arc::new(Failing));

        tokio::time::timeout(std::time::Duration::from_secs(5), host.run())
            .await
            .expect("host should stop after a service fails");
        assert_eq!(stopped.load(Ordering::SeqCst), 1);
    }
}
