//! Database connection pool manager.
//!
//! Owns the single pool for the configured backend, binds statement
//! parameters, bounds every execution by the statement timeout, and retries
//! transient connection failures exactly once.

use std::future::Future;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use common::config::PoolConfig;
use common::errors::{AppError, AppResult};
use common::models::connection::{ConnectionConfig, DbType};
use serde::Serialize;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{MySqlPool, PgPool, SqlitePool};
use utoipa::ToSchema;

use crate::classifier::{classify, classify_connect};
use crate::decode;
use crate::dialect::{dialect_for, Dialect};
use crate::executor::StatementExecutor;
use crate::value::{BoundValue, Row, Statement};

/// Connection pool for the configured backend.
#[derive(Clone, Debug)]
pub enum DatabasePool {
    /// MySQL connection pool.
    MySQL(MySqlPool),
    /// PostgreSQL connection pool.
    Postgres(PgPool),
    /// SQLite connection pool.
    SQLite(SqlitePool),
}

/// Point-in-time pool occupancy.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, ToSchema)]
pub struct PoolStats {
    /// Open connections, idle or in use.
    pub size: u32,
    /// Open connections not currently checked out.
    pub idle: u32,
    /// Configured upper bound.
    pub max: u32,
}

impl PoolStats {
    pub fn in_use(&self) -> u32 {
        self.size.saturating_sub(self.idle)
    }
}

/// Binds every [`BoundValue`] onto a `sqlx::query`, in order.
macro_rules! bind_params {
    ($query:expr, $params:expr) => {{
        let mut query = $query;
        for param in $params {
            query = match param {
                BoundValue::Text(v) => query.bind(v.as_str()),
                BoundValue::Int(v) => query.bind(*v),
                BoundValue::Float(v) => query.bind(*v),
                BoundValue::Bool(v) => query.bind(*v),
                BoundValue::Date(v) => query.bind(*v),
                BoundValue::Time(v) => query.bind(*v),
                BoundValue::DateTime(v) => query.bind(*v),
            };
        }
        query
    }};
}

/// Manages the backend connection pool.
///
/// The pool is created once at startup and shared by every caller. Dropping
/// an in-flight `fetch_all` future cancels the statement and gives its
/// connection back to the pool.
pub struct PoolManager {
    pool: DatabasePool,
    config: PoolConfig,
    target: String,
}

impl PoolManager {
    /// Opens the pool for `target`, retrying once on a transient failure.
    pub async fn connect(target: &ConnectionConfig, config: &PoolConfig) -> AppResult<Self> {
        let pool = with_retry(config.retry_backoff, "connect", || {
            Self::try_create_pool(target, config)
        })
        .await?;

        tracing::info!(
            target_db = %target.describe(),
            max_connections = config.max_connections,
            "database pool ready"
        );

        Ok(Self {
            pool,
            config: config.clone(),
            target: target.describe(),
        })
    }

    /// Attempts to create a database connection pool within the connect
    /// timeout.
    async fn try_create_pool(
        target: &ConnectionConfig,
        config: &PoolConfig,
    ) -> AppResult<DatabasePool> {
        match tokio::time::timeout(config.connect_timeout, Self::open_pool(target, config)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::connection(format!(
                "connecting to {} exceeded {:?}",
                target.describe(),
                config.connect_timeout
            ))),
        }
    }

    async fn open_pool(target: &ConnectionConfig, config: &PoolConfig) -> AppResult<DatabasePool> {
        match target.db_type {
            DbType::MySQL => {
                let options = MySqlConnectOptions::new()
                    .host(required(target.host.as_deref(), "host")?)
                    .port(target.port.unwrap_or(3306))
                    .username(required(target.username.as_deref(), "username")?)
                    .password(target.password.as_deref().unwrap_or_default())
                    .database(required(target.database.as_deref(), "database")?);
                let pool = MySqlPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(classify_connect)?;
                Ok(DatabasePool::MySQL(pool))
            }
            DbType::Postgres => {
                let options = PgConnectOptions::new()
                    .host(required(target.host.as_deref(), "host")?)
                    .port(target.port.unwrap_or(5432))
                    .username(required(target.username.as_deref(), "username")?)
                    .password(target.password.as_deref().unwrap_or_default())
                    .database(required(target.database.as_deref(), "database")?);
                let pool = PgPoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(classify_connect)?;
                Ok(DatabasePool::Postgres(pool))
            }
            DbType::SQLite => {
                let path = required(target.file_path.as_deref(), "file_path")?;
                let options = SqliteConnectOptions::new()
                    .filename(path)
                    .read_only(true)
                    .create_if_missing(false);
                let pool = SqlitePoolOptions::new()
                    .max_connections(config.max_connections)
                    .acquire_timeout(config.acquire_timeout)
                    .connect_with(options)
                    .await
                    .map_err(classify_connect)?;
                Ok(DatabasePool::SQLite(pool))
            }
        }
    }

    pub fn db_type(&self) -> DbType {
        match &self.pool {
            DatabasePool::MySQL(_) => DbType::MySQL,
            DatabasePool::Postgres(_) => DbType::Postgres,
            DatabasePool::SQLite(_) => DbType::SQLite,
        }
    }

    /// Log-safe description of the backend.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Round-trips `SELECT 1` and returns the latency.
    pub async fn ping(&self) -> AppResult<Duration> {
        let start = Instant::now();
        self.fetch_all(&Statement::new("SELECT 1")).await?;
        Ok(start.elapsed())
    }

    /// Gets the connection pool stats.
    pub fn stats(&self) -> PoolStats {
        let (size, idle) = match &self.pool {
            DatabasePool::MySQL(p) => (p.size(), p.num_idle()),
            DatabasePool::Postgres(p) => (p.size(), p.num_idle()),
            DatabasePool::SQLite(p) => (p.size(), p.num_idle()),
        };
        PoolStats {
            size,
            idle: idle as u32,
            max: self.config.max_connections,
        }
    }

    /// Closes every connection. Further executions fail with a connection
    /// error.
    pub async fn close(&self) {
        match &self.pool {
            DatabasePool::MySQL(p) => p.close().await,
            DatabasePool::Postgres(p) => p.close().await,
            DatabasePool::SQLite(p) => p.close().await,
        }
        tracing::info!(target_db = %self.target, "database pool closed");
    }

    /// One execution attempt, bounded by the statement timeout.
    async fn fetch_once(&self, statement: &Statement) -> AppResult<Vec<Row>> {
        match tokio::time::timeout(self.config.statement_timeout, self.execute(statement)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::timeout(format!(
                "statement exceeded {:?}: {}",
                self.config.statement_timeout, statement.sql
            ))),
        }
    }

    async fn execute(&self, statement: &Statement) -> AppResult<Vec<Row>> {
        match &self.pool {
            DatabasePool::MySQL(pool) => {
                let rows = bind_params!(sqlx::query(&statement.sql), &statement.params)
                    .fetch_all(pool)
                    .await
                    .map_err(classify)?;
                rows.iter().map(decode::mysql_row).collect()
            }
            DatabasePool::Postgres(pool) => {
                let rows = bind_params!(sqlx::query(&statement.sql), &statement.params)
                    .fetch_all(pool)
                    .await
                    .map_err(classify)?;
                rows.iter().map(decode::pg_row).collect()
            }
            DatabasePool::SQLite(pool) => {
                let rows = bind_params!(sqlx::query(&statement.sql), &statement.params)
                    .fetch_all(pool)
                    .await
                    .map_err(classify)?;
                rows.iter().map(decode::sqlite_row).collect()
            }
        }
    }
}

#[async_trait]
impl StatementExecutor for PoolManager {
    fn dialect(&self) -> &'static dyn Dialect {
        dialect_for(self.db_type())
    }

    async fn fetch_all(&self, statement: &Statement) -> AppResult<Vec<Row>> {
        tracing::debug!(
            sql = %statement.sql,
            params = statement.params.len(),
            "executing statement"
        );
        with_retry(self.config.retry_backoff, "execute", || self.fetch_once(statement)).await
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::connection(format!("connection target is missing {}", field)))
}

/// Runs `op`, and runs it once more after `backoff` if the first attempt
/// failed with a retryable error.
pub(crate) async fn with_retry<T, F, Fut>(backoff: Duration, operation: &str, mut op: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    match op().await {
        Err(err) if err.is_retryable() => {
            tracing::warn!(
                operation,
                detail = err.detail().unwrap_or_default(),
                "transient connection failure, retrying once"
            );
            tokio::time::sleep(backoff).await;
            op().await
        }
        other => other,
    }
}
