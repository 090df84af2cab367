//! Application configuration.
//!
//! Everything is read from env-style key/value pairs. A `.env` file in the
//! working directory is honoured for keys not already set in the process
//! environment.

use std::time::Duration;

use thiserror::Error;

use crate::models::connection::{ConnectionConfig, DbType};

/// Default row limit when the caller does not send one.
pub const DEFAULT_LIMIT: u32 = 10;
/// Upper bound every limit is clamped to.
pub const MAX_LIMIT: u32 = 100;

/// Configuration loading failures. These only occur at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("unsupported database type: {0}")]
    UnsupportedDbType(String),

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

/// Pool sizing and timing bounds.
#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
    pub connect_timeout: Duration,
    pub statement_timeout: Duration,
    pub retry_backoff: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 5,
            acquire_timeout: Duration::from_secs(5),
            connect_timeout: Duration::from_secs(10),
            statement_timeout: Duration::from_secs(30),
            retry_backoff: Duration::from_millis(200),
        }
    }
}

/// Row limit policy for select and search.
#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    pub default_limit: u32,
    pub max_limit: u32,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            default_limit: DEFAULT_LIMIT,
            max_limit: MAX_LIMIT,
        }
    }
}

/// Top-level service configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub service_name: String,
    pub host: String,
    pub port: u16,
    pub database: ConnectionConfig,
    pub pool: PoolConfig,
    pub query: QueryLimits,
}

impl AppConfig {
    /// Loads the configuration from the process environment.
    pub fn load_with_service(service_name: &str) -> Result<Self, ConfigError> {
        Self::from_lookup(service_name, |key| std::env::var(key).ok())
    }

    /// Loads the configuration from an arbitrary key/value source.
    pub fn from_lookup<F>(service_name: &str, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let db_type_raw = get("DB_TYPE").unwrap_or_else(|| "sqlite".to_string());
        let db_type =
            DbType::parse(&db_type_raw).ok_or(ConfigError::UnsupportedDbType(db_type_raw))?;

        let database = match db_type {
            DbType::SQLite => ConnectionConfig::sqlite(
                get("SQLITE_PATH").unwrap_or_else(|| "./database.db".to_string()),
            ),
            DbType::Postgres => network_target(
                db_type,
                &get,
                ["POSTGRES_HOST", "POSTGRES_PORT", "POSTGRES_DB", "POSTGRES_USER", "POSTGRES_PASSWORD"],
            )?,
            DbType::MySQL => network_target(
                db_type,
                &get,
                ["MYSQL_HOST", "MYSQL_PORT", "MYSQL_DB", "MYSQL_USER", "MYSQL_PASSWORD"],
            )?,
        };

        let defaults = PoolConfig::default();
        let pool = PoolConfig {
            max_connections: parse_or(&get, "DB_POOL_MAX", defaults.max_connections)?,
            acquire_timeout: timeout_secs(&get, "DB_ACQUIRE_TIMEOUT_SECS", defaults.acquire_timeout)?,
            connect_timeout: timeout_secs(&get, "DB_CONNECT_TIMEOUT_SECS", defaults.connect_timeout)?,
            statement_timeout: timeout_secs(
                &get,
                "DB_STATEMENT_TIMEOUT_SECS",
                defaults.statement_timeout,
            )?,
            retry_backoff: Duration::from_millis(parse_or(
                &get,
                "DB_RETRY_BACKOFF_MS",
                defaults.retry_backoff.as_millis() as u64,
            )?),
        };
        if pool.max_connections == 0 {
            return Err(ConfigError::Invalid {
                key: "DB_POOL_MAX",
                value: "0".into(),
            });
        }

        let max_limit: u32 = parse_or(&get, "QUERY_MAX_LIMIT", MAX_LIMIT)?;
        let default_limit: u32 = parse_or(&get, "QUERY_DEFAULT_LIMIT", DEFAULT_LIMIT)?;
        if max_limit == 0 || default_limit == 0 || default_limit > max_limit {
            return Err(ConfigError::Invalid {
                key: "QUERY_DEFAULT_LIMIT",
                value: format!("{default_limit} (max {max_limit})"),
            });
        }

        Ok(Self {
            service_name: service_name.to_string(),
            host: get("SERVER_HOST").unwrap_or_else(|| "0.0.0.0".to_string()),
            port: parse_or(&get, "SERVER_PORT", 8000)?,
            database,
            pool,
            query: QueryLimits {
                default_limit,
                max_limit,
            },
        })
    }
}

fn network_target<G>(
    db_type: DbType,
    get: &G,
    [host_key, port_key, db_key, user_key, password_key]: [&'static str; 5],
) -> Result<ConnectionConfig, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    let default_port = db_type.default_port().unwrap_or_default();
    Ok(ConnectionConfig {
        db_type,
        host: Some(get(host_key).unwrap_or_else(|| "localhost".to_string())),
        port: Some(parse_or(get, port_key, default_port)?),
        username: Some(get(user_key).ok_or(ConfigError::Missing(user_key))?),
        password: Some(get(password_key).ok_or(ConfigError::Missing(password_key))?),
        database: Some(get(db_key).ok_or(ConfigError::Missing(db_key))?),
        file_path: None,
    })
}

/// A timeout in whole seconds; zero would fail every operation.
fn timeout_secs<G>(get: &G, key: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    G: Fn(&str) -> Option<String>,
{
    match parse_or(get, key, default.as_secs())? {
        0 => Err(ConfigError::Invalid {
            key,
            value: "0".into(),
        }),
        secs => Ok(Duration::from_secs(secs)),
    }
}

fn parse_or<G, T>(get: &G, key: &'static str, default: T) -> Result<T, ConfigError>
where
    G: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value: raw }),
        None => Ok(default),
    }
}

/// Load .env file from the working directory (best-effort, no error if missing).
pub fn load_dotenv() {
    let env_path = std::path::Path::new(".env");
    if env_path.exists() {
        if let Ok(content) = std::fs::read_to_string(env_path) {
            for line in content.lines() {
                let line = line.trim();
                if line.is_empty() || line.starts_with('#') {
                    continue;
                }
                if let Some((key, value)) = line.split_once('=') {
                    let key = key.trim();
                    let value = value.trim().trim_matches('"');
                    // Only set if not already set by the environment
                    if std::env::var(key).is_err() {
                        std::env::set_var(key, value);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_to_sqlite() {
        let config = AppConfig::from_lookup("svc", lookup(&[])).unwrap();
        assert_eq!(config.database.db_type, DbType::SQLite);
        assert_eq!(config.database.file_path.as_deref(), Some("./database.db"));
        assert_eq!(config.query.default_limit, 10);
        assert_eq!(config.query.max_limit, 100);
        assert_eq!(config.port, 8000);
    }

    #[test]
    fn test_postgres_requires_credentials() {
        let err = AppConfig::from_lookup(
            "svc",
            lookup(&[("DB_TYPE", "postgresql"), ("POSTGRES_DB", "shop")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Missing("POSTGRES_USER")));
    }

    #[test]
    fn test_mysql_target() {
        let config = AppConfig::from_lookup(
            "svc",
            lookup(&[
                ("DB_TYPE", "mysql"),
                ("MYSQL_HOST", "db.internal"),
                ("MYSQL_DB", "shop"),
                ("MYSQL_USER", "app"),
                ("MYSQL_PASSWORD", "pw"),
                ("DB_POOL_MAX", "12"),
            ]),
        )
        .unwrap();
        assert_eq!(config.database.db_type, DbType::MySQL);
        assert_eq!(config.database.port, Some(3306));
        assert_eq!(config.database.host.as_deref(), Some("db.internal"));
        assert_eq!(config.pool.max_connections, 12);
    }

    #[test]
    fn test_rejects_unknown_backend_and_bad_numbers() {
        assert!(matches!(
            AppConfig::from_lookup("svc", lookup(&[("DB_TYPE", "oracle")])),
            Err(ConfigError::UnsupportedDbType(_))
        ));
        assert!(matches!(
            AppConfig::from_lookup("svc", lookup(&[("DB_POOL_MAX", "many")])),
            Err(ConfigError::Invalid { key: "DB_POOL_MAX", .. })
        ));
        assert!(AppConfig::from_lookup(
            "svc",
            lookup(&[("QUERY_DEFAULT_LIMIT", "500"), ("QUERY_MAX_LIMIT", "100")])
        )
        .is_err());
    }

    #[test]
    fn test_rejects_zero_timeouts() {
        for key in [
            "DB_ACQUIRE_TIMEOUT_SECS",
            "DB_CONNECT_TIMEOUT_SECS",
            "DB_STATEMENT_TIMEOUT_SECS",
        ] {
            let err = AppConfig::from_lookup("svc", lookup(&[(key, "0")])).unwrap_err();
            assert!(matches!(err, ConfigError::Invalid { key: k, .. } if k == key));
        }

        let config =
            AppConfig::from_lookup("svc", lookup(&[("DB_STATEMENT_TIMEOUT_SECS", "5")])).unwrap();
        assert_eq!(config.pool.statement_timeout, Duration::from_secs(5));
    }
}
