//! Pool sizing presets per environment
//!
//! Resolution is pure and total: unknown environments get the development
//! preset, and any override that is present wins over the preset field.

use std::time::Duration;

use serde::Serialize;

/// Bounds applied to the managed connection pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PoolConfig {
    pub min_size: u32,
    pub max_size: u32,
    pub acquire_timeout_ms: u64,
    pub idle_timeout_ms: u64,
    pub eviction_interval_ms: u64,
    pub max_lifetime_ms: u64,
}

impl PoolConfig {
    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn max_lifetime(&self) -> Duration {
        Duration::from_millis(self.max_lifetime_ms)
    }
}

const DEVELOPMENT: PoolConfig = PoolConfig {
    min_size: 0,
    max_size: 10,
    acquire_timeout_ms: 30_000,
    idle_timeout_ms: 10_000,
    eviction_interval_ms: 1_000,
    max_lifetime_ms: 1_800_000,
};

const TEST: PoolConfig = PoolConfig {
    min_size: 0,
    max_size: 5,
    acquire_timeout_ms: 30_000,
    idle_timeout_ms: 10_000,
    eviction_interval_ms: 1_000,
    max_lifetime_ms: 1_800_000,
};

const PRODUCTION: PoolConfig = PoolConfig {
    min_size: 5,
    max_size: 20,
    acquire_timeout_ms: 60_000,
    idle_timeout_ms: 10_000,
    eviction_interval_ms: 1_000,
    max_lifetime_ms: 1_800_000,
};

/// Look up a named preset, falling back to development.
pub fn preset(environment: &str) -> PoolConfig {
    match environment.trim().to_lowercase().as_str() {
        "production" | "prod" => PRODUCTION,
        "test" | "testing" => TEST,
        _ => DEVELOPMENT,
    }
}

/// Field-by-field overrides; `None` keeps the preset value.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolOverrides {
    pub min_size: Option<u32>,
    pub max_size: Option<u32>,
    pub acquire_timeout_ms: Option<u64>,
    pub idle_timeout_ms: Option<u64>,
    pub eviction_interval_ms: Option<u64>,
    pub max_lifetime_ms: Option<u64>,
}

impl PoolOverrides {
    /// Read `DB_POOL_*` variables. Values that fail to parse are ignored.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        fn parsed<T: std::str::FromStr>(raw: Option<String>) -> Option<T> {
            raw.and_then(|s| s.trim().parse().ok())
        }

        Self {
            min_size: parsed(lookup("DB_POOL_MIN")),
            max_size: parsed(lookup("DB_POOL_MAX")),
            acquire_timeout_ms: parsed(lookup("DB_POOL_ACQUIRE_TIMEOUT_MS")),
            idle_timeout_ms: parsed(lookup("DB_POOL_IDLE_TIMEOUT_MS")),
            eviction_interval_ms: parsed(lookup("DB_POOL_EVICTION_INTERVAL_MS")),
            max_lifetime_ms: parsed(lookup("DB_POOL_MAX_LIFETIME_MS")),
        }
    }
}

/// Resolve the pool configuration for an environment tag.
pub fn resolve(environment: &str, overrides: &PoolOverrides) -> PoolConfig {
    let base = preset(environment);

    let mut config = PoolConfig {
        min_size: overrides.min_size.unwrap_or(base.min_size),
        max_size: overrides.max_size.unwrap_or(base.max_size).max(1),
        acquire_timeout_ms: overrides.acquire_timeout_ms.unwrap_or(base.acquire_timeout_ms),
        idle_timeout_ms: overrides.idle_timeout_ms.unwrap_or(base.idle_timeout_ms),
        eviction_interval_ms: overrides
            .eviction_interval_ms
            .unwrap_or(base.eviction_interval_ms),
        max_lifetime_ms: overrides.max_lifetime_ms.unwrap_or(base.max_lifetime_ms),
    };

    if config.min_size > config.max_size {
        config.min_size = config.max_size;
    }

    config
}
