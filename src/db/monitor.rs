//! Periodic pool utilization monitor
//!
//! Runs independently of the connection manager: stopping the manager does
//! not stop the monitor, which will then report an error snapshot on each
//! tick until stopped explicitly.

use parking_lot::Mutex;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{ConnectionStats, PoolDiagnostics, StatsReport};

pub const DEFAULT_MONITOR_INTERVAL: Duration = Duration::from_secs(30);

/// Share of borrowed connections above which a warning is logged.
pub const HIGH_UTILIZATION_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtilizationLevel {
    Normal,
    High,
}

pub fn utilization_level(stats: &ConnectionStats) -> UtilizationLevel {
    if stats.utilization() > HIGH_UTILIZATION_THRESHOLD {
        UtilizationLevel::High
    } else {
        UtilizationLevel::Normal
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MonitorStatus {
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interval_ms: Option<u64>,
    pub ticks: u64,
    pub pool: StatsReport,
}

struct MonitorTask {
    token: CancellationToken,
    interval: Duration,
}

#[derive(Clone)]
pub struct PoolMonitor {
    source: Arc<dyn PoolDiagnostics>,
    task: Arc<Mutex<Option<MonitorTask>>>,
    ticks: Arc<AtomicU64>,
}

impl PoolMonitor {
    pub fn new(source: Arc<dyn PoolDiagnostics>) -> Self {
        Self {
            source,
            task: Arc::new(Mutex::new(None)),
            ticks: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Start sampling every `interval`. Returns `false` if already running.
    pub fn start_monitoring(&self, interval: Duration) -> bool {
        let interval = if interval.is_zero() {
            DEFAULT_MONITOR_INTERVAL
        } else {
            interval
        };

        let mut slot = self.task.lock();
        if let Some(task) = slot.as_ref() {
            info!(
                interval_ms = task.interval.as_millis() as u64,
                "Pool monitoring already active"
            );
            return false;
        }

        let token = CancellationToken::new();
        tokio::spawn(run_monitor(
            Arc::clone(&self.source),
            Arc::clone(&self.ticks),
            token.clone(),
            interval,
        ));

        info!(interval_ms = interval.as_millis() as u64, "Pool monitoring started");
        *slot = Some(MonitorTask { token, interval });
        true
    }

    /// Returns `false` if monitoring was not running.
    pub fn stop_monitoring(&self) -> bool {
        match self.task.lock().take() {
            Some(task) => {
                task.token.cancel();
                info!("Pool monitoring stopped");
                true
            }
            None => {
                debug!("Pool monitoring not active");
                false
            }
        }
    }

    pub fn is_active(&self) -> bool {
        self.task.lock().is_some()
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn get_pool_status(&self) -> MonitorStatus {
        let interval_ms = self
            .task
            .lock()
            .as_ref()
            .map(|task| task.interval.as_millis() as u64);

        MonitorStatus {
            active: interval_ms.is_some(),
            interval_ms,
            ticks: self.tick_count(),
            pool: self.source.connection_stats(),
        }
    }
}

async fn run_monitor(
    source: Arc<dyn PoolDiagnostics>,
    ticks: Arc<AtomicU64>,
    token: CancellationToken,
    period: Duration,
) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                ticks.fetch_add(1, Ordering::Relaxed);
                sample(source.as_ref());
            }
        }
    }

    debug!("Pool monitor loop stopped");
}

fn sample(source: &dyn PoolDiagnostics) {
    match source.connection_stats() {
        StatsReport::Stats(stats) => {
            info!(
                state = source.state_name(),
                size = stats.size,
                used = stats.used,
                pending = stats.pending,
                available = stats.available,
                utilization_percent = stats.utilization_percent,
                "Pool status"
            );

            if utilization_level(&stats) == UtilizationLevel::High {
                warn!(
                    used = stats.used,
                    size = stats.size,
                    utilization_percent = stats.utilization_percent,
                    threshold_percent = HIGH_UTILIZATION_THRESHOLD * 100.0,
                    "High connection pool utilization"
                );
            }
        }
        StatsReport::Unavailable { error, .. } => {
            warn!(error = %error, "Pool status unavailable");
        }
    }
}
