//! Read-only pool diagnostics

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::PoolSnapshot;

/// Fresh snapshot of pool usage. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionStats {
    pub size: u32,
    pub used: u32,
    pub pending: u32,
    pub available: u32,
    pub max_size: u32,
    pub utilization_percent: f64,
    pub timestamp: DateTime<Utc>,
}

impl ConnectionStats {
    pub fn from_snapshot(snapshot: PoolSnapshot) -> Self {
        let used = snapshot.size.saturating_sub(snapshot.idle);

        Self {
            size: snapshot.size,
            used,
            pending: snapshot.pending,
            available: snapshot.idle,
            max_size: snapshot.max_size,
            utilization_percent: utilization_percent(used, snapshot.size),
            timestamp: Utc::now(),
        }
    }

    /// Borrowed share of open connections, in `0.0..=1.0`.
    pub fn utilization(&self) -> f64 {
        if self.size == 0 {
            0.0
        } else {
            (f64::from(self.used) / f64::from(self.size)).min(1.0)
        }
    }
}

fn utilization_percent(used: u32, size: u32) -> f64 {
    if size == 0 {
        return 0.0;
    }
    let percent = (f64::from(used) / f64::from(size) * 100.0).min(100.0);
    (percent * 100.0).round() / 100.0
}

/// Stats, or an error object when no live pool is available.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum StatsReport {
    Stats(ConnectionStats),
    Unavailable {
        error: String,
        timestamp: DateTime<Utc>,
    },
}

impl StatsReport {
    pub fn unavailable(error: impl Into<String>) -> Self {
        Self::Unavailable {
            error: error.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn stats(&self) -> Option<&ConnectionStats> {
        match self {
            Self::Stats(stats) => Some(stats),
            Self::Unavailable { .. } => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Read-only view of the connection manager for monitors and HTTP handlers.
pub trait PoolDiagnostics: Send + Sync {
    fn is_ready(&self) -> bool;

    fn connection_stats(&self) -> StatsReport;

    fn state_name(&self) -> &'static str;
}
