use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;
use std::sync::Arc;

use crate::app::AppState;
use crate::db::StatsReport;
use crate::error::{ApiError, ApiResult};

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub database: DatabaseHealth,
}

#[derive(Serialize)]
pub struct DatabaseHealth {
    pub state: String,
    pub ready: bool,
    pub pool: StatsReport,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub ready: bool,
}

/// Health check endpoint - public
pub async fn health_check(
    State(state): State<Arc<AppState>>,
) -> (StatusCode, Json<HealthResponse>) {
    let ready = state.db.is_ready();

    let (status, status_code) = if ready {
        ("healthy", StatusCode::OK)
    } else {
        ("unhealthy", StatusCode::SERVICE_UNAVAILABLE)
    };

    (
        status_code,
        Json(HealthResponse {
            status: status.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            database: DatabaseHealth {
                state: state.db.state_name().to_string(),
                ready,
                pool: state.db.connection_stats(),
            },
        }),
    )
}

/// Readiness probe for process supervisors
pub async fn readiness(State(state): State<Arc<AppState>>) -> ApiResult<Json<ReadyResponse>> {
    if state.db.is_ready() {
        Ok(Json(ReadyResponse { ready: true }))
    } else {
        Err(ApiError::ServiceUnavailable(format!(
            "Database is {}",
            state.db.state_name()
        )))
    }
}
