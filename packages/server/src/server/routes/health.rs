use axum::{extract::Extension, http::StatusCode, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::kernel::timeout::with_timeout;
use crate::kernel::ServerKernel;
use crate::server::app::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: DatabaseHealth,
    connection_pool: ConnectionPoolHealth,
    scheduler: SchedulerHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

#[derive(Serialize)]
pub struct ConnectionPoolHealth {
    size: u32,
    idle_connections: usize,
    max_connections: u32,
}

#[derive(Debug, Serialize)]
pub struct SchedulerHealth {
    holder_id: String,
    is_leader: bool,
    settings_age_secs: Option<i64>,
    /// Leading on a settings snapshot older than two reload intervals
    settings_stale: bool,
}

pub(crate) async fn scheduler_health(kernel: &ServerKernel, now: DateTime<Utc>) -> SchedulerHealth {
    let is_leader = kernel.coordinator.is_leader();
    let loaded_at = kernel.cache.loaded_at().await;
    let max_age = chrono::Duration::from_std(kernel.settings.settings_reload_interval * 2)
        .unwrap_or_else(|_| chrono::Duration::minutes(10));

    SchedulerHealth {
        holder_id: kernel.coordinator.holder_id().to_string(),
        is_leader,
        settings_age_secs: loaded_at.map(|at| (now - at).num_seconds()),
        settings_stale: is_leader && kernel.cache.is_stale(now, max_age).await,
    }
}

/// Liveness check
///
/// 503 when the database does not answer within the store deadline, or when
/// this process leads on stale settings.
pub async fn health_handler(
    Extension(state): Extension<AppState>,
) -> (StatusCode, Json<HealthResponse>) {
    let ping = async {
        sqlx::query("SELECT 1")
            .execute(&state.db_pool)
            .await
            .map_err(anyhow::Error::from)
    };
    let limit = state.kernel.settings.store_timeout;
    let db_health = match with_timeout(limit, "health query", ping).await {
        Ok(_) => DatabaseHealth {
            status: "ok".to_string(),
            error: None,
        },
        Err(e) => DatabaseHealth {
            status: "error".to_string(),
            error: Some(format!("{e:#}")),
        },
    };

    let pool_health = ConnectionPoolHealth {
        size: state.db_pool.size(),
        idle_connections: state.db_pool.num_idle(),
        max_connections: state.db_pool.options().get_max_connections(),
    };

    let scheduler = scheduler_health(&state.kernel, Utc::now()).await;

    let is_healthy = db_health.status == "ok" && !scheduler.settings_stale;
    let status_code = if is_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(HealthResponse {
            status: if is_healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            connection_pool: pool_health,
            scheduler,
        }),
    )
}
