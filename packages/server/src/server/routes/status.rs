use axum::{extract::Extension, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::server::app::AppState;

#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub holder_id: String,
    pub is_leader: bool,
    pub armed_configs: usize,
    pub settings_loaded_at: Option<DateTime<Utc>>,
    /// Seconds since the settings cache was last loaded
    pub settings_age_secs: Option<i64>,
}

/// Scheduler status for operators
pub async fn status_handler(Extension(state): Extension<AppState>) -> Json<StatusResponse> {
    let kernel = &state.kernel;
    let loaded_at = kernel.cache.loaded_at().await;

    Json(StatusResponse {
        holder_id: kernel.coordinator.holder_id().to_string(),
        is_leader: kernel.coordinator.is_leader(),
        armed_configs: kernel.engine.armed_count().await,
        settings_loaded_at: loaded_at,
        settings_age_secs: loaded_at.map(|at| (Utc::now() - at).num_seconds()),
    })
}
