//! Process shutdown hook
//!
//! Ctrl+C and SIGTERM end the HTTP server; the pool is then closed before
//! `main` returns.

use tokio::signal;
use tracing::{error, info, warn};

use crate::db::{ConnectionManager, PoolFactory, PoolMonitor};

/// Resolves on the first termination signal.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            warn!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            warn!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

/// Stop the monitor and close the database connection.
pub async fn graceful_shutdown<F: PoolFactory>(
    manager: &ConnectionManager<F>,
    monitor: &PoolMonitor,
) {
    monitor.stop_monitoring();
    manager.shutdown().await;
    info!("Shutdown complete");
}
