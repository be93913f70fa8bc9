use anyhow::{Context, Result};
use std::env;
use std::fmt;
use std::time::Duration;

use crate::db::{pool_config, PoolConfig, PoolOverrides};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Dev,
    Test,
    Prod,
}

impl Environment {
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "prod" | "production" => Self::Prod,
            "test" | "testing" => Self::Test,
            _ => Self::Dev,
        }
    }

    /// Name of the pool preset this environment selects.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Dev => "development",
            Self::Test => "test",
            Self::Prod => "production",
        }
    }

    pub fn is_dev(&self) -> bool {
        matches!(self, Self::Dev)
    }

    pub fn is_prod(&self) -> bool {
        matches!(self, Self::Prod)
    }
}

/// Connection parameters for the target database.
///
/// Held for the lifetime of the process; the manager reuses it verbatim
/// when rebuilding the pool after a failed health probe.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub password: String,
    pub database: String,
    pub environment: Environment,
    /// `DB_POOL_*` overrides applied on top of the environment preset.
    pub pool: PoolOverrides,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("database", &self.database)
            .field("environment", &self.environment)
            .field("pool", &self.pool)
            .finish()
    }
}

impl DatabaseConfig {
    /// Read `DB_HOST`, `DB_PORT`, `DB_USER`, `DB_PASSWORD`, `DB_NAME` and
    /// the `DB_POOL_*` overrides.
    pub fn from_env(environment: Environment) -> Result<Self> {
        Self::from_lookup(environment, |key| env::var(key).ok())
    }

    pub fn from_lookup<F>(environment: Environment, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let host = lookup("DB_HOST").unwrap_or_else(|| "localhost".to_string());
        let port = match lookup("DB_PORT") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("DB_PORT is not a valid port: {raw}"))?,
            None => 5432,
        };
        let user = lookup("DB_USER").unwrap_or_else(|| "postgres".to_string());
        let password = lookup("DB_PASSWORD").unwrap_or_default();
        let database = lookup("DB_NAME")
            .filter(|s| !s.trim().is_empty())
            .context("DB_NAME must be set")?;
        let pool = PoolOverrides::from_lookup(&lookup);

        Ok(Self {
            host,
            port,
            user,
            password,
            database,
            environment,
            pool,
        })
    }

    /// Pool settings for this config's environment, overrides applied.
    pub fn pool_config(&self) -> PoolConfig {
        pool_config::resolve(self.environment.as_str(), &self.pool)
    }
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub env: Environment,
    pub server_addr: String,

    // Database
    pub database: DatabaseConfig,

    // Pool monitor
    pub monitor_autostart: bool,
    pub monitor_interval: Duration,
}

impl Settings {
    pub fn from_env() -> Result<Self> {
        let env = Environment::from_str(&env::var("ENV").unwrap_or_else(|_| "dev".to_string()));
        let server_addr = env::var("SERVER_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".to_string());

        // Database
        let database = DatabaseConfig::from_env(env)?;

        // Pool monitor
        let monitor_autostart = env::var("POOL_MONITOR_AUTOSTART")
            .ok()
            .map(|s| matches!(s.trim().to_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);
        let monitor_interval_ms = env::var("POOL_MONITOR_INTERVAL_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|ms: &u64| *ms > 0)
            .unwrap_or(30_000); // 30 seconds default

        Ok(Settings {
            env,
            server_addr,
            database,
            monitor_autostart,
            monitor_interval: Duration::from_millis(monitor_interval_ms),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn environment_falls_back_to_dev() {
        assert_eq!(Environment::from_str("production"), Environment::Prod);
        assert_eq!(Environment::from_str("TEST"), Environment::Test);
        assert_eq!(Environment::from_str("qa"), Environment::Dev);
        assert_eq!(Environment::Prod.as_str(), "production");
    }

    #[test]
    fn database_config_uses_defaults() {
        let config =
            DatabaseConfig::from_lookup(Environment::Dev, lookup_from(&[("DB_NAME", "app")]))
                .unwrap();

        assert_eq!(config.host, "localhost");
        assert_eq!(config.port, 5432);
        assert_eq!(config.user, "postgres");
        assert_eq!(config.password, "");
        assert_eq!(config.database, "app");
    }

    #[test]
    fn database_config_requires_name() {
        let result = DatabaseConfig::from_lookup(Environment::Dev, lookup_from(&[]));
        assert!(result.is_err());
    }

    #[test]
    fn database_config_rejects_bad_port() {
        let result = DatabaseConfig::from_lookup(
            Environment::Dev,
            lookup_from(&[("DB_NAME", "app"), ("DB_PORT", "not-a-port")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn pool_config_follows_environment_and_overrides() {
        let config = DatabaseConfig::from_lookup(
            Environment::Prod,
            lookup_from(&[("DB_NAME", "app"), ("DB_POOL_MAX", "40")]),
        )
        .unwrap();

        let preset = pool_config::preset("production");
        let pool = config.pool_config();
        assert_eq!(pool.max_size, 40);
        assert_eq!(pool.min_size, preset.min_size);
        assert_eq!(pool.acquire_timeout_ms, preset.acquire_timeout_ms);
    }

    #[test]
    fn debug_output_redacts_password() {
        let config = DatabaseConfig::from_lookup(
            Environment::Prod,
            lookup_from(&[("DB_NAME", "app"), ("DB_PASSWORD", "hunter2")]),
        )
        .unwrap();

        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter2"));
        assert!(rendered.contains("<redacted>"));
    }
}
