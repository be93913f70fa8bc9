//! Scripted pool factory for exercising the manager without a database

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use super::{DbError, ManagedPool, PoolConfig, PoolFactory, PoolOverrides, PoolSnapshot};
use crate::config::{DatabaseConfig, Environment};

pub fn db_config() -> DatabaseConfig {
    DatabaseConfig {
        host: "localhost".to_string(),
        port: 5432,
        user: "postgres".to_string(),
        password: "postgres".to_string(),
        database: "dbkeeper_test".to_string(),
        environment: Environment::Test,
        pool: PoolOverrides::default(),
    }
}

#[derive(Default)]
struct Script {
    probes: Mutex<VecDeque<Result<(), DbError>>>,
    probes_made: AtomicUsize,
    provisioning: Mutex<VecDeque<Result<(), DbError>>>,
    provision_error: Mutex<Option<DbError>>,
    provision_calls: AtomicUsize,
    release_calls: AtomicUsize,
    size: AtomicU32,
    idle: AtomicU32,
    /// Closed flag of every pool created, in creation order.
    pools: Mutex<Vec<Arc<AtomicBool>>>,
}

/// Pools share the factory's probe script; once it runs dry probes succeed.
/// Provisioning follows its own script, then `fail_provisioning`, then succeeds.
#[derive(Clone, Default)]
pub struct MockFactory {
    script: Arc<Script>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn script_probes(&self, results: impl IntoIterator<Item = Result<(), DbError>>) {
        self.script.probes.lock().extend(results);
    }

    pub fn script_provisioning(&self, results: impl IntoIterator<Item = Result<(), DbError>>) {
        self.script.provisioning.lock().extend(results);
    }

    pub fn fail_provisioning(&self, message: &str) {
        *self.script.provision_error.lock() = Some(DbError::Provisioning(message.to_string()));
    }

    pub fn set_usage(&self, size: u32, idle: u32) {
        self.script.size.store(size, Ordering::SeqCst);
        self.script.idle.store(idle, Ordering::SeqCst);
    }

    pub fn pools_created(&self) -> usize {
        self.script.pools.lock().len()
    }

    pub fn pool_closed(&self, index: usize) -> bool {
        self.script.pools.lock()[index].load(Ordering::SeqCst)
    }

    pub fn probes_made(&self) -> usize {
        self.script.probes_made.load(Ordering::SeqCst)
    }

    pub fn provision_calls(&self) -> usize {
        self.script.provision_calls.load(Ordering::SeqCst)
    }

    pub fn release_calls(&self) -> usize {
        self.script.release_calls.load(Ordering::SeqCst)
    }

    pub fn released(&self) -> bool {
        self.release_calls() > 0
    }
}

#[async_trait]
impl PoolFactory for MockFactory {
    type Pool = MockPool;

    async fn ensure_database_exists(&self, _config: &DatabaseConfig) -> Result<(), DbError> {
        self.script.provision_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = self.script.provisioning.lock().pop_front() {
            return scripted;
        }
        match self.script.provision_error.lock().clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    fn create_pool(
        &self,
        _config: &DatabaseConfig,
        pool: &PoolConfig,
    ) -> Result<MockPool, DbError> {
        let closed = Arc::new(AtomicBool::new(false));
        let mut pools = self.script.pools.lock();
        pools.push(Arc::clone(&closed));

        Ok(MockPool {
            id: pools.len() - 1,
            max_size: pool.max_size,
            closed,
            script: Arc::clone(&self.script),
        })
    }

    async fn release(&self) {
        self.script.release_calls.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Clone)]
pub struct MockPool {
    id: usize,
    max_size: u32,
    closed: Arc<AtomicBool>,
    script: Arc<Script>,
}

impl MockPool {
    /// Creation order within the factory, starting at zero.
    pub fn id(&self) -> usize {
        self.id
    }
}

#[async_trait]
impl ManagedPool for MockPool {
    async fn probe(&self) -> Result<(), DbError> {
        self.script.probes_made.fetch_add(1, Ordering::SeqCst);
        let next = self.script.probes.lock().pop_front();
        next.unwrap_or(Ok(()))
    }

    fn snapshot(&self) -> PoolSnapshot {
        let size = self.script.size.load(Ordering::SeqCst);
        PoolSnapshot {
            size,
            idle: self.script.idle.load(Ordering::SeqCst).min(size),
            pending: 0,
            max_size: self.max_size,
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}
