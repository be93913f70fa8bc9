//! Seams between the connection manager and the concrete pooled client

use async_trait::async_trait;

use super::{DbError, PoolConfig};
use crate::config::DatabaseConfig;

/// Point-in-time counters read from a live pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolSnapshot {
    /// Connections currently open (idle + borrowed).
    pub size: u32,
    /// Open connections sitting idle in the pool.
    pub idle: u32,
    /// Callers waiting to acquire a connection.
    pub pending: u32,
    pub max_size: u32,
}

/// A pooled client that callers borrow connections from.
#[async_trait]
pub trait ManagedPool: Clone + Send + Sync + 'static {
    /// Lightweight round-trip used for authentication and health checks.
    async fn probe(&self) -> Result<(), DbError>;

    fn snapshot(&self) -> PoolSnapshot;

    /// Close the pool, waiting for borrowed connections to be returned.
    async fn close(&self);
}

/// Builds pools for the connection manager. Implementations never retry;
/// retry policy lives in the manager.
#[async_trait]
pub trait PoolFactory: Send + Sync + 'static {
    type Pool: ManagedPool;

    /// Create the target database if it does not exist, using a one-off
    /// administrative connection outside the managed pool.
    async fn ensure_database_exists(&self, config: &DatabaseConfig) -> Result<(), DbError>;

    /// Build the pool. Performs no network I/O; connections open lazily.
    fn create_pool(
        &self,
        config: &DatabaseConfig,
        pool: &PoolConfig,
    ) -> Result<Self::Pool, DbError>;

    /// Release any administrative resources held by the factory.
    async fn release(&self) {}
}
