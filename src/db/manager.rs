//! Connection lifecycle manager
//!
//! Owns the single managed pool for the process: provisions the database,
//! authenticates with bounded retries, runs a periodic health probe and
//! rebuilds the pool when the probe fails. Application code borrows the
//! pool through [`ConnectionManager::handle`].
//!
//! State transitions:
//!
//! ```text
//! Uninitialized -> Initializing -> Ready <-> Reconnecting
//!                       |            |           |
//!                       v            v           v
//!                     Closed <- ShuttingDown <---+
//! ```

use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{
    ConnectionStats, DbError, ManagedPool, PoolConfig, PoolDiagnostics, PoolFactory, StatsReport,
};
use crate::config::DatabaseConfig;

/// Authentication attempts made by `initialize` before giving up.
pub const MAX_AUTH_ATTEMPTS: u32 = 3;

/// Delay before retry `n` is `RETRY_BASE_DELAY * n`.
pub const RETRY_BASE_DELAY: Duration = Duration::from_millis(2000);

pub const DEFAULT_HEALTH_CHECK_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManagerState {
    Uninitialized,
    Initializing,
    Ready,
    Reconnecting,
    ShuttingDown,
    Closed,
}

impl ManagerState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Reconnecting => "reconnecting",
            Self::ShuttingDown => "shutting_down",
            Self::Closed => "closed",
        }
    }
}

impl fmt::Display for ManagerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Inner<P> {
    state: ManagerState,
    pool: Option<P>,
    /// Retained for the process lifetime; reconnects rebuild from it.
    db_config: Option<DatabaseConfig>,
    pool_config: Option<PoolConfig>,
    ready_once: bool,
    reconnect_failures: u32,
}

impl<P> Inner<P> {
    fn set_state(&mut self, to: ManagerState) {
        if self.state != to {
            info!(from = %self.state, to = %to, "Connection manager state changed");
            self.state = to;
        }
    }
}

struct HealthTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

struct Shared<F: PoolFactory> {
    factory: F,
    health_interval: Duration,
    inner: RwLock<Inner<F::Pool>>,
    /// Serializes `initialize` calls so only one pool is ever built.
    init_lock: tokio::sync::Mutex<()>,
    health_task: Mutex<Option<HealthTask>>,
}

/// Handle to the process-wide connection manager. Clones share state.
pub struct ConnectionManager<F: PoolFactory> {
    shared: Arc<Shared<F>>,
}

impl<F: PoolFactory> Clone for ConnectionManager<F> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<F: PoolFactory> ConnectionManager<F> {
    pub fn new(factory: F) -> Self {
        Self::with_health_check_interval(factory, DEFAULT_HEALTH_CHECK_INTERVAL)
    }

    pub fn with_health_check_interval(factory: F, health_interval: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                factory,
                health_interval,
                inner: RwLock::new(Inner {
                    state: ManagerState::Uninitialized,
                    pool: None,
                    db_config: None,
                    pool_config: None,
                    ready_once: false,
                    reconnect_failures: 0,
                }),
                init_lock: tokio::sync::Mutex::new(()),
                health_task: Mutex::new(None),
            }),
        }
    }

    pub(crate) fn state(&self) -> ManagerState {
        self.shared.inner.read().state
    }

    pub fn is_ready(&self) -> bool {
        self.state() == ManagerState::Ready
    }

    /// Provision, build and authenticate the pool, then start health checks.
    ///
    /// Pool settings are resolved from the config's environment and overrides.
    /// Calling this again once the manager is ready is a no-op. On failure the
    /// manager is closed and the last error is returned.
    pub async fn initialize(&self, config: DatabaseConfig) -> Result<(), DbError> {
        let _guard = self.shared.init_lock.lock().await;

        {
            let mut inner = self.shared.inner.write();
            match inner.state {
                ManagerState::Ready | ManagerState::Reconnecting => {
                    info!(state = %inner.state, "Connection manager already initialized");
                    return Ok(());
                }
                ManagerState::ShuttingDown | ManagerState::Closed => {
                    warn!(state = %inner.state, "Refusing to initialize a closed connection manager");
                    return Err(DbError::Closed);
                }
                // Initializing here means an earlier initialize was cancelled mid-way.
                ManagerState::Uninitialized | ManagerState::Initializing => {
                    inner.set_state(ManagerState::Initializing);
                }
            }
        }

        let pool_config = config.pool_config();
        info!(
            host = %config.host,
            port = config.port,
            database = %config.database,
            environment = config.environment.as_str(),
            max_connections = pool_config.max_size,
            "Initializing database connection"
        );

        let pool = match self.bring_up(&config, &pool_config).await {
            Ok(pool) => pool,
            Err(e) => {
                error!(error = %e, "Database initialization failed");
                let owned = {
                    let mut inner = self.shared.inner.write();
                    let owned = inner.state == ManagerState::Initializing;
                    if owned {
                        inner.set_state(ManagerState::Closed);
                    }
                    owned
                };
                // otherwise shutdown() already released the factory
                if owned {
                    self.shared.factory.release().await;
                }
                return Err(e);
            }
        };

        let rejected = {
            let mut inner = self.shared.inner.write();
            if inner.state == ManagerState::Initializing {
                inner.pool = Some(pool);
                inner.db_config = Some(config);
                inner.pool_config = Some(pool_config);
                inner.ready_once = true;
                inner.set_state(ManagerState::Ready);
                None
            } else {
                // shutdown() ran while we were authenticating
                Some(pool)
            }
        };

        if let Some(pool) = rejected {
            pool.close().await;
            return Err(DbError::Closed);
        }

        if !self.start_health_check() {
            return Err(DbError::Closed);
        }
        info!("Database connection ready");
        Ok(())
    }

    /// Provision, build and authenticate within one retry budget. Connection
    /// and authentication failures are retried whether they come from the
    /// provisioning connection or the pool; provisioning errors are final.
    async fn bring_up(
        &self,
        config: &DatabaseConfig,
        pool_config: &PoolConfig,
    ) -> Result<F::Pool, DbError> {
        let mut pool = None;
        let mut attempt = 1;
        loop {
            match self.connect_attempt(config, pool_config, &mut pool).await {
                Ok(ready) => {
                    info!(attempt, "Database connection authenticated");
                    return Ok(ready);
                }
                Err(e) if e.is_retryable() && attempt < MAX_AUTH_ATTEMPTS => {
                    let delay = RETRY_BASE_DELAY * attempt;
                    warn!(
                        attempt,
                        max_attempts = MAX_AUTH_ATTEMPTS,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Database connection attempt failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    error!(attempts = attempt, error = %e, "Database connection failed");
                    if let Some(pool) = pool {
                        pool.close().await;
                    }
                    return Err(e);
                }
            }
        }
    }

    /// One attempt. The pool is built once, after provisioning succeeds, and
    /// kept in `slot` so later attempts only repeat the probe.
    async fn connect_attempt(
        &self,
        config: &DatabaseConfig,
        pool_config: &PoolConfig,
        slot: &mut Option<F::Pool>,
    ) -> Result<F::Pool, DbError> {
        let pool = match slot.take() {
            Some(pool) => pool,
            None => {
                self.shared.factory.ensure_database_exists(config).await?;
                self.shared.factory.create_pool(config, pool_config)?
            }
        };

        match pool.probe().await {
            Ok(()) => Ok(pool),
            Err(e) => {
                *slot = Some(pool);
                Err(e)
            }
        }
    }

    /// Borrow the managed pool. Never blocks.
    ///
    /// While reconnecting this still returns the last pool, so queries may
    /// fail at the driver level until the rebuild succeeds.
    pub fn handle(&self) -> Result<F::Pool, DbError> {
        let inner = self.shared.inner.read();
        match (inner.state, &inner.pool) {
            (ManagerState::ShuttingDown | ManagerState::Closed, _) if inner.ready_once => {
                Err(DbError::Closed)
            }
            (ManagerState::Ready | ManagerState::Reconnecting, Some(pool)) => Ok(pool.clone()),
            _ => Err(DbError::NotInitialized),
        }
    }

    pub fn connection_stats(&self) -> StatsReport {
        let inner = self.shared.inner.read();
        match &inner.pool {
            Some(pool) => StatsReport::Stats(ConnectionStats::from_snapshot(pool.snapshot())),
            None => StatsReport::unavailable(format!(
                "No active connection pool (state: {})",
                inner.state
            )),
        }
    }

    /// Stop health checks, close the pool and release factory resources.
    /// Safe to call more than once.
    pub async fn shutdown(&self) {
        let pool = {
            let mut inner = self.shared.inner.write();
            match inner.state {
                ManagerState::ShuttingDown | ManagerState::Closed => {
                    debug!(state = %inner.state, "Connection manager already shut down");
                    return;
                }
                _ => inner.set_state(ManagerState::ShuttingDown),
            }
            inner.pool.take()
        };

        // Cancel before closing so no probe runs against a closed pool.
        let task = self.shared.health_task.lock().take();
        if let Some(task) = task {
            task.token.cancel();
            if let Err(e) = task.handle.await {
                warn!(error = %e, "Health check task ended abnormally");
            }
        }

        if let Some(pool) = pool {
            pool.close().await;
        }
        self.shared.factory.release().await;

        self.shared.inner.write().set_state(ManagerState::Closed);
        info!("Database connection closed");
    }

    /// Spawn the health loop unless one is running. Returns `false` when the
    /// manager left `Ready` before the loop could be registered.
    fn start_health_check(&self) -> bool {
        let mut slot = self.shared.health_task.lock();
        if slot.is_some() {
            return true;
        }
        // shutdown() leaves Ready before it takes this slot
        if self.state() != ManagerState::Ready {
            debug!("Manager no longer ready, health check loop not started");
            return false;
        }

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_health_check(
            Arc::downgrade(&self.shared),
            token.clone(),
            self.shared.health_interval,
        ));

        debug!(
            interval_secs = self.shared.health_interval.as_secs(),
            "Health check loop started"
        );
        *slot = Some(HealthTask { token, handle });
        true
    }

    /// One health-check tick: probe while ready, rebuild while reconnecting.
    pub(crate) async fn health_tick(&self) {
        let state = self.state();
        match state {
            ManagerState::Ready => {
                let Some(pool) = self.shared.inner.read().pool.clone() else {
                    return;
                };

                match pool.probe().await {
                    Ok(()) => debug!("Database health probe succeeded"),
                    Err(e) => {
                        let failure = DbError::ProbeFailure(e.to_string());
                        warn!(error = %failure, "Database health check failed, reconnecting");

                        {
                            let mut inner = self.shared.inner.write();
                            if inner.state != ManagerState::Ready {
                                return;
                            }
                            inner.set_state(ManagerState::Reconnecting);
                        }

                        close_in_background(pool);
                        self.try_reconnect().await;
                    }
                }
            }
            ManagerState::Reconnecting => self.try_reconnect().await,
            _ => {}
        }
    }

    /// Single rebuild attempt. Failure leaves the manager reconnecting so the
    /// next tick tries again.
    async fn try_reconnect(&self) {
        let retained = {
            let inner = self.shared.inner.read();
            inner.db_config.clone().zip(inner.pool_config)
        };
        let Some((config, pool_config)) = retained else {
            error!("No retained database configuration, cannot reconnect");
            return;
        };

        match self.rebuild(&config, &pool_config).await {
            Ok(pool) => {
                let stale = {
                    let mut inner = self.shared.inner.write();
                    if inner.state == ManagerState::Reconnecting {
                        let failures = std::mem::take(&mut inner.reconnect_failures);
                        inner.pool = Some(pool);
                        inner.set_state(ManagerState::Ready);
                        info!(previous_failures = failures, "Database reconnected");
                        None
                    } else {
                        Some(pool)
                    }
                };
                if let Some(pool) = stale {
                    close_in_background(pool);
                }
            }
            Err(e) => {
                let failures = {
                    let mut inner = self.shared.inner.write();
                    inner.reconnect_failures += 1;
                    inner.reconnect_failures
                };
                warn!(
                    error = %e,
                    failures,
                    "Database reconnect failed, retrying on next health check"
                );
            }
        }
    }

    async fn rebuild(
        &self,
        config: &DatabaseConfig,
        pool_config: &PoolConfig,
    ) -> Result<F::Pool, DbError> {
        let pool = self
            .shared
            .factory
            .create_pool(config, pool_config)
            .map_err(|e| DbError::ReconnectFailure(e.to_string()))?;

        if let Err(e) = pool.probe().await {
            close_in_background(pool);
            return Err(DbError::ReconnectFailure(e.to_string()));
        }

        Ok(pool)
    }
}

impl<F: PoolFactory> PoolDiagnostics for ConnectionManager<F> {
    fn is_ready(&self) -> bool {
        ConnectionManager::is_ready(self)
    }

    fn connection_stats(&self) -> StatsReport {
        ConnectionManager::connection_stats(self)
    }

    fn state_name(&self) -> &'static str {
        self.state().as_str()
    }
}

fn close_in_background<P: ManagedPool>(pool: P) {
    tokio::spawn(async move { pool.close().await });
}

async fn run_health_check<F: PoolFactory>(
    shared: Weak<Shared<F>>,
    token: CancellationToken,
    period: Duration,
) {
    let mut tick = tokio::time::interval(period);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // first tick completes immediately
    tick.tick().await;

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = tick.tick() => {
                let Some(shared) = shared.upgrade() else { break };
                let manager = ConnectionManager { shared };

                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = manager.health_tick() => {}
                }
            }
        }
    }

    debug!("Health check loop stopped");
}
