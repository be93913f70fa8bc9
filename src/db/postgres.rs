//! PostgreSQL pool factory

use async_trait::async_trait;
use sqlx::{
    postgres::{PgConnectOptions, PgPoolOptions},
    Connection, PgConnection, PgPool,
};

use super::{DbError, ManagedPool, PoolConfig, PoolFactory, PoolSnapshot};
use crate::config::DatabaseConfig;

const APPLICATION_NAME: &str = "dbkeeper";

/// Database used for the administrative provisioning connection.
const MAINTENANCE_DATABASE: &str = "postgres";

/// Builds `PgPool`s and provisions the target database.
#[derive(Debug, Clone, Default)]
pub struct PgPoolFactory;

impl PgPoolFactory {
    pub fn new() -> Self {
        Self
    }
}

pub fn connect_options(config: &DatabaseConfig) -> PgConnectOptions {
    PgConnectOptions::new()
        .host(&config.host)
        .port(config.port)
        .username(&config.user)
        .password(&config.password)
        .database(&config.database)
        .application_name(APPLICATION_NAME)
}

/// Quote a Postgres identifier for interpolation into DDL.
fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Map a driver error to a manager error kind.
pub fn classify(err: sqlx::Error) -> DbError {
    match &err {
        sqlx::Error::Database(db_err) if is_auth_failure(db_err.code().as_deref()) => {
            DbError::Authentication(err.to_string())
        }
        _ => DbError::Connection(err.to_string()),
    }
}

/// Map an error raised on the administrative connection. The server answered,
/// so any SQLSTATE other than an authentication failure (missing maintenance
/// database, no CONNECT privilege) is a provisioning problem and not retried.
pub fn classify_provisioning(err: sqlx::Error) -> DbError {
    let rejected_by_server = matches!(
        &err,
        sqlx::Error::Database(db_err) if !is_auth_failure(db_err.code().as_deref())
    );

    if rejected_by_server {
        DbError::Provisioning(err.to_string())
    } else {
        classify(err)
    }
}

// invalid_password, invalid_authorization_specification
fn is_auth_failure(code: Option<&str>) -> bool {
    matches!(code, Some("28P01") | Some("28000"))
}

/// Create `database` on the administrative connection unless it exists.
async fn create_if_missing(conn: &mut PgConnection, database: &str) -> Result<(), DbError> {
    let exists = sqlx::query_scalar::<_, i32>("SELECT 1 FROM pg_database WHERE datname = $1")
        .bind(database)
        .fetch_optional(&mut *conn)
        .await
        .map_err(classify_provisioning)?
        .is_some();

    if exists {
        tracing::debug!(database, "Database already exists");
        return Ok(());
    }

    let statement = format!("CREATE DATABASE {}", quote_identifier(database));
    match sqlx::query(&statement).execute(&mut *conn).await {
        Ok(_) => {
            tracing::info!(database, "Database created");
            Ok(())
        }
        // duplicate_database: another process won the race
        Err(sqlx::Error::Database(db_err)) if db_err.code().as_deref() == Some("42P04") => Ok(()),
        Err(e) => Err(DbError::Provisioning(e.to_string())),
    }
}

#[async_trait]
impl PoolFactory for PgPoolFactory {
    type Pool = PgPool;

    async fn ensure_database_exists(&self, config: &DatabaseConfig) -> Result<(), DbError> {
        let options = connect_options(config).database(MAINTENANCE_DATABASE);
        let mut conn = PgConnection::connect_with(&options)
            .await
            .map_err(classify_provisioning)?;

        let outcome = create_if_missing(&mut conn, &config.database).await;

        if let Err(e) = conn.close().await {
            tracing::warn!(error = %e, "Failed to close provisioning connection");
        }

        outcome
    }

    fn create_pool(&self, config: &DatabaseConfig, pool: &PoolConfig) -> Result<PgPool, DbError> {
        let pg_pool = PgPoolOptions::new()
            .max_connections(pool.max_size)
            .min_connections(pool.min_size)
            .acquire_timeout(pool.acquire_timeout())
            .idle_timeout(pool.idle_timeout())
            .max_lifetime(pool.max_lifetime())
            .connect_lazy_with(connect_options(config));

        // sqlx schedules its own idle reaper; eviction_interval_ms is informational here.
        tracing::info!(
            host = %config.host,
            database = %config.database,
            min_connections = pool.min_size,
            max_connections = pool.max_size,
            eviction_interval_ms = pool.eviction_interval_ms,
            "Database connection pool created"
        );

        Ok(pg_pool)
    }
}

#[async_trait]
impl ManagedPool for PgPool {
    async fn probe(&self) -> Result<(), DbError> {
        sqlx::query("SELECT 1")
            .fetch_one(self)
            .await
            .map(|_| ())
            .map_err(classify)
    }

    fn snapshot(&self) -> PoolSnapshot {
        let size = self.size();
        let idle = u32::try_from(self.num_idle()).unwrap_or(u32::MAX).min(size);

        PoolSnapshot {
            size,
            idle,
            // sqlx does not expose its waiter queue length
            pending: 0,
            max_size: self.options().get_max_connections(),
        }
    }

    async fn close(&self) {
        PgPool::close(self).await;
    }
}
