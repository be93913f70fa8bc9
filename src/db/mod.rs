//! Database connection lifecycle: pool presets, pool construction, the
//! connection manager and the utilization monitor.

pub mod error;
pub mod factory;
pub mod manager;
pub mod monitor;
pub mod pool_config;
pub mod postgres;
pub mod stats;

#[cfg(test)]
pub(crate) mod testing;

pub use error::DbError;
pub use factory::{ManagedPool, PoolFactory, PoolSnapshot};
pub use manager::ConnectionManager;
pub use monitor::PoolMonitor;
pub use pool_config::{PoolConfig, PoolOverrides};
pub use postgres::PgPoolFactory;
pub use stats::{ConnectionStats, PoolDiagnostics, StatsReport};
