//! Pool diagnostics and monitor control routes

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use crate::app::AppState;
use crate::db::monitor::MonitorStatus;
use crate::db::StatsReport;
use crate::error::{ApiError, ApiResult};

#[derive(Debug, Deserialize)]
pub struct MonitorCommand {
    pub action: String,
    /// Sampling interval in milliseconds; only used by `start`.
    pub interval: Option<u64>,
}

#[derive(Serialize)]
pub struct MonitorCommandResponse {
    pub action: String,
    /// False when the monitor was already in the requested state.
    pub changed: bool,
    pub status: MonitorStatus,
}

/// GET /db/stats
pub async fn get_stats(State(state): State<Arc<AppState>>) -> Json<StatsReport> {
    Json(state.db.connection_stats())
}

/// GET /db/monitor
pub async fn get_monitor(State(state): State<Arc<AppState>>) -> Json<MonitorStatus> {
    Json(state.monitor.get_pool_status())
}

/// POST /db/monitor
///
/// Start or stop the pool monitor.
pub async fn control_monitor(
    State(state): State<Arc<AppState>>,
    Json(command): Json<MonitorCommand>,
) -> ApiResult<Json<MonitorCommandResponse>> {
    let action = command.action.trim().to_lowercase();

    let changed = match action.as_str() {
        "start" => {
            let interval = command
                .interval
                .filter(|ms| *ms > 0)
                .map(Duration::from_millis)
                .unwrap_or(state.settings.monitor_interval);
            state.monitor.start_monitoring(interval)
        }
        "stop" => state.monitor.stop_monitoring(),
        other => {
            return Err(ApiError::BadRequest(format!(
                "Unknown monitor action '{}', expected 'start' or 'stop'",
                other
            )))
        }
    };

    Ok(Json(MonitorCommandResponse {
        action,
        changed,
        status: state.monitor.get_pool_status(),
    }))
}
