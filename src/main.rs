use anyhow::Result;
use std::sync::Arc;

use dbkeeper::db::{ConnectionManager, PgPoolFactory, PoolDiagnostics, PoolMonitor};
use dbkeeper::{app, config, logging, shutdown};

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let settings = config::Settings::from_env()?;

    // Initialize logging
    logging::init_logging(&settings.env);

    tracing::info!(
        env = ?settings.env,
        server_addr = %settings.server_addr,
        "Starting dbkeeper"
    );

    // Bring up the database connection; failure here is fatal
    let manager = ConnectionManager::new(PgPoolFactory::new());
    manager.initialize(settings.database.clone()).await?;

    let diagnostics: Arc<dyn PoolDiagnostics> = Arc::new(manager.clone());
    let monitor = PoolMonitor::new(Arc::clone(&diagnostics));
    if settings.monitor_autostart {
        monitor.start_monitoring(settings.monitor_interval);
    }

    // Create application state
    let state = app::AppState::new(settings.clone(), diagnostics, monitor.clone());

    // Build application
    let app = app::create_app(state);

    // Start server
    let listener = match tokio::net::TcpListener::bind(&settings.server_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            shutdown::graceful_shutdown(&manager, &monitor).await;
            return Err(e.into());
        }
    };
    tracing::info!("Listening on {}", settings.server_addr);

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown::shutdown_signal())
        .await;

    // Close the pool even if the server failed
    shutdown::graceful_shutdown(&manager, &monitor).await;

    served?;
    Ok(())
}
