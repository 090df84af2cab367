//! Connection target models.
//!
//! Describes which relational backend the core talks to and how to reach it.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Supported relational backends.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DbType {
    /// MySQL / MariaDB.
    MySQL,
    /// PostgreSQL.
    Postgres,
    /// Embedded SQLite file.
    SQLite,
}

impl DbType {
    /// Returns the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbType::MySQL => Some(3306),
            DbType::Postgres => Some(5432),
            DbType::SQLite => None,
        }
    }

    /// Whether the backend is reached over the network.
    pub fn is_networked(&self) -> bool {
        !matches!(self, DbType::SQLite)
    }

    /// Parses the `DB_TYPE` selector. Accepts the common aliases.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "mysql" | "mariadb" => Some(DbType::MySQL),
            "postgres" | "postgresql" | "pg" => Some(DbType::Postgres),
            "sqlite" | "sqlite3" => Some(DbType::SQLite),
            _ => None,
        }
    }
}

impl std::fmt::Display for DbType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DbType::MySQL => write!(f, "mysql"),
            DbType::Postgres => write!(f, "postgres"),
            DbType::SQLite => write!(f, "sqlite"),
        }
    }
}

/// Resolved connection target.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ConnectionConfig {
    /// Database type.
    pub db_type: DbType,
    /// Database host (for network databases).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    /// Database port (for network databases).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    /// Database username.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Database password (never serialized).
    #[serde(skip_serializing, default)]
    pub password: Option<String>,
    /// Database name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<String>,
    /// SQLite file path.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,
}

impl ConnectionConfig {
    /// Target for an embedded SQLite file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            db_type: DbType::SQLite,
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
            file_path: Some(path.into()),
        }
    }

    /// Short description safe for logs (no credentials).
    pub fn describe(&self) -> String {
        match self.db_type {
            DbType::SQLite => format!(
                "sqlite:{}",
                self.file_path.as_deref().unwrap_or("<unset>")
            ),
            _ => format!(
                "{}://{}:{}/{}",
                self.db_type,
                self.host.as_deref().unwrap_or("localhost"),
                self.port
                    .or_else(|| self.db_type.default_port())
                    .unwrap_or_default(),
                self.database.as_deref().unwrap_or("")
            ),
        }
    }
}
