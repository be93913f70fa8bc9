pub mod health;
pub mod pool;

use axum::{routing::get, Router};
use std::sync::Arc;

use crate::app::AppState;

/// Build the API router with all routes
pub fn api_router() -> Router<Arc<AppState>> {
    Router::new()
        // Probes
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness))
        // Pool diagnostics
        .route("/db/stats", get(pool::get_stats))
        .route(
            "/db/monitor",
            get(pool::get_monitor).post(pool::control_monitor),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request, StatusCode};
    use serde_json::{json, Value};
    use std::time::Duration;
    use tower::ServiceExt;

    use crate::app::{create_app, AppState};
    use crate::config::{Environment, Settings};
    use crate::db::testing::{db_config, MockFactory};
    use crate::db::{ConnectionManager, PoolDiagnostics, PoolMonitor};
    use crate::middleware::request_id::X_REQUEST_ID;

    fn settings() -> Settings {
        Settings {
            env: Environment::Test,
            server_addr: "127.0.0.1:0".to_string(),
            database: db_config(),
            monitor_autostart: false,
            monitor_interval: Duration::from_secs(30),
        }
    }

    fn app(manager: &ConnectionManager<MockFactory>) -> (Router, PoolMonitor) {
        let db: Arc<dyn PoolDiagnostics> = Arc::new(manager.clone());
        let monitor = PoolMonitor::new(Arc::clone(&db));
        let state = AppState::new(settings(), db, monitor.clone());
        (create_app(state), monitor)
    }

    async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn readiness_follows_manager_state() {
        let manager = ConnectionManager::new(MockFactory::new());
        let (app, _) = app(&manager);

        let (status, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["code"], "SERVICE_UNAVAILABLE");

        let (status, body) = send(&app, get("/db/stats")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body.get("error").is_some());

        manager.initialize(db_config()).await.unwrap();

        let (status, body) = send(&app, get("/ready")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["ready"], true);

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["database"]["state"], "ready");
        assert!(body["database"]["pool"]["utilization_percent"].is_number());

        manager.shutdown().await;

        let (status, body) = send(&app, get("/health")).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert_eq!(body["database"]["state"], "closed");
        assert!(body["database"]["pool"]["error"].is_string());
    }

    #[tokio::test]
    async fn monitor_can_be_started_and_stopped() {
        let manager = ConnectionManager::new(MockFactory::new());
        let (app, monitor) = app(&manager);

        let start = json!({ "action": "start", "interval": 5000 });
        let (status, body) = send(&app, post_json("/db/monitor", start.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert_eq!(body["status"]["interval_ms"], 5000);
        assert!(monitor.is_active());

        let (_, body) = send(&app, post_json("/db/monitor", start)).await;
        assert_eq!(body["changed"], false);

        let (_, body) = send(&app, get("/db/monitor")).await;
        assert_eq!(body["active"], true);

        let (status, body) = send(&app, post_json("/db/monitor", json!({ "action": "stop" }))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["changed"], true);
        assert!(!monitor.is_active());
    }

    #[tokio::test]
    async fn monitor_start_defaults_interval() {
        let manager = ConnectionManager::new(MockFactory::new());
        let (app, monitor) = app(&manager);

        let (_, body) = send(&app, post_json("/db/monitor", json!({ "action": "START" }))).await;
        assert_eq!(body["status"]["interval_ms"], 30_000);

        monitor.stop_monitoring();
    }

    #[tokio::test]
    async fn unknown_monitor_action_is_rejected() {
        let manager = ConnectionManager::new(MockFactory::new());
        let (app, monitor) = app(&manager);

        let (status, body) =
            send(&app, post_json("/db/monitor", json!({ "action": "pause" }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["code"], "BAD_REQUEST");
        assert!(!monitor.is_active());
    }

    #[tokio::test]
    async fn responses_carry_request_id() {
        let manager = ConnectionManager::new(MockFactory::new());
        let (app, _) = app(&manager);

        let response = app.clone().oneshot(get("/db/stats")).await.unwrap();
        let assigned = response.headers()[X_REQUEST_ID].to_str().unwrap().to_string();
        assert_eq!(assigned.len(), 36);
        assert_eq!(assigned.matches('-').count(), 4);

        let request = Request::builder()
            .uri("/db/stats")
            .header(X_REQUEST_ID, "ops-check-17")
            .body(Body::empty())
            .unwrap();
        let response = app.clone().oneshot(request).await.unwrap();
        assert_eq!(response.headers()[X_REQUEST_ID], "ops-check-17");
    }
}
