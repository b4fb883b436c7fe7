//! Application setup and server configuration.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::{extract::Extension, routing::get, Router};
use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;

use crate::kernel::{Service, ServerKernel};
use crate::server::routes::{health_handler, status_handler};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub db_pool: PgPool,
    pub kernel: Arc<ServerKernel>,
}

/// Build the Axum application router
pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/status", get(status_handler))
        .layer(Extension(state))
        .layer(TraceLayer::new_for_http())
}

/// Serves the status surface until shutdown.
pub struct HttpService {
    addr: SocketAddr,
    app: Router,
}

impl HttpService {
    pub fn new(addr: SocketAddr, app: Router) -> Self {
        Self { addr, app }
    }
}

#[async_trait]
impl Service for HttpService {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn run(self: Arc<Self>, shutdown: CancellationToken) -> Result<()> {
        let listener = tokio::net::TcpListener::bind(self.addr)
            .await
            .context("Failed to bind to address")?;
        tracing::info!("Status server listening on {}", self.addr);

        axum::serve(listener, self.app.clone())
            .with_graceful_shutdown(shutdown.cancelled_owned())
            .await
            .context("Server error")?;
        Ok(())
    }
}
