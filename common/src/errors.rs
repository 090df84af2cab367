//! Error taxonomy shared by the core and its surfaces.
//!
//! `Display` output is the only text that crosses the core boundary. Backend
//! error text and generated SQL are kept in `detail` fields, which are logged
//! but never serialized.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;

use crate::response::ApiResponse;

/// Result alias used across the workspace.
pub type AppResult<T> = Result<T, AppError>;

/// Sub-classification of backend query failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryErrorKind {
    Syntax,
    Permission,
    Constraint,
    Timeout,
    Other,
}

impl std::fmt::Display for QueryErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            QueryErrorKind::Syntax => "syntax",
            QueryErrorKind::Permission => "permission",
            QueryErrorKind::Constraint => "constraint",
            QueryErrorKind::Timeout => "timeout",
            QueryErrorKind::Other => "other",
        };
        f.write_str(s)
    }
}

/// Application error type.
#[derive(Debug, Error)]
pub enum AppError {
    /// Backend unreachable, credentials rejected or database absent.
    #[error("database is unavailable")]
    Connection { detail: String },

    /// Unknown table/column, disallowed operator, invalid limit or value.
    #[error("{0}")]
    Validation(String),

    /// Exact-name table lookup failed or no row matched an identifier.
    #[error("{message}")]
    NotFound {
        message: String,
        /// Names the caller may choose from instead (e.g. available tables).
        available: Option<Vec<String>>,
    },

    /// The backend rejected a generated statement.
    #[error("query failed ({kind})")]
    Query { kind: QueryErrorKind, detail: String },

    /// Pool wait or statement execution exceeded its bound.
    #[error("operation timed out")]
    Timeout { detail: String },
}

impl AppError {
    pub fn connection(detail: impl Into<String>) -> Self {
        AppError::Connection {
            detail: detail.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        AppError::Validation(message.into())
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        AppError::NotFound {
            message: message.into(),
            available: None,
        }
    }

    /// Table lookup failure carrying the tables that do exist.
    pub fn table_not_found(name: &str, available: Vec<String>) -> Self {
        AppError::NotFound {
            message: format!("table '{}' not found", name),
            available: Some(available),
        }
    }

    pub fn query(kind: QueryErrorKind, detail: impl Into<String>) -> Self {
        AppError::Query {
            kind,
            detail: detail.into(),
        }
    }

    pub fn timeout(detail: impl Into<String>) -> Self {
        AppError::Timeout {
            detail: detail.into(),
        }
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connection { .. } => "CONNECTION_ERROR",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound { .. } => "NOT_FOUND",
            AppError::Query { .. } => "QUERY_ERROR",
            AppError::Timeout { .. } => "TIMEOUT",
        }
    }

    /// HTTP status for the REST surface.
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::Connection { .. } | AppError::Timeout { .. } => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            AppError::Query { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Only connection failures are transient.
    pub fn is_retryable(&self) -> bool {
        matches!(self, AppError::Connection { .. })
    }

    /// Backend-internal detail, for logs only.
    pub fn detail(&self) -> Option<&str> {
        match self {
            AppError::Connection { detail }
            | AppError::Query { detail, .. }
            | AppError::Timeout { detail } => Some(detail),
            _ => None,
        }
    }

    /// Names offered to the caller alongside a not-found error.
    pub fn available(&self) -> Option<&[String]> {
        match self {
            AppError::NotFound {
                available: Some(names),
                ..
            } => Some(names),
            _ => None,
        }
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let fields: Vec<String> = errors
            .field_errors()
            .iter()
            .map(|(field, errs)| {
                let reason = errs
                    .iter()
                    .filter_map(|e| e.message.as_ref().map(|m| m.to_string()))
                    .next()
                    .unwrap_or_else(|| "invalid".to_string());
                format!("{}: {}", field, reason)
            })
            .collect();
        AppError::Validation(fields.join("; "))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self.detail() {
            Some(detail) if status.is_server_error() => {
                tracing::error!(code = self.code(), detail = %detail, "request failed");
            }
            _ => tracing::debug!(code = self.code(), error = %self, "request rejected"),
        }

        let body = match self.available() {
            Some(names) => ApiResponse::err_with_details(
                self.code(),
                self.to_string(),
                serde_json::json!({ "available": names }),
            ),
            None => ApiResponse::err(self.code(), self.to_string()),
        };
        (status, Json(body)).into_response()
    }
}
