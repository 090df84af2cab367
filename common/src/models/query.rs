//! Query request and result models.
//!
//! Request DTOs are what the REST surface deserializes; `QueryRequest` is the
//! backend-neutral form the dialogue adapter and the service facade share.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::errors::AppError;

/// Operation kinds the core supports. All are read-only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum QueryKind {
    Select,
    Search,
    GetById,
    Count,
}

/// Comparison operators allowed in a search filter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    Equals,
    Like,
    GreaterThan,
    LessThan,
    GreaterOrEqual,
    LessOrEqual,
}

impl Operator {
    /// SQL comparison token.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Operator::Equals => "=",
            Operator::Like => "LIKE",
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::GreaterOrEqual => ">=",
            Operator::LessOrEqual => "<=",
        }
    }
}

impl FromStr for Operator {
    type Err = AppError;

    /// Accepts the operator names (any case) and their SQL symbols.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EQUALS" | "EQ" | "=" | "==" => Ok(Operator::Equals),
            "LIKE" | "CONTAINS" => Ok(Operator::Like),
            "GREATER_THAN" | "GT" | ">" => Ok(Operator::GreaterThan),
            "LESS_THAN" | "LT" | "<" => Ok(Operator::LessThan),
            "GREATER_OR_EQUAL" | "GTE" | ">=" => Ok(Operator::GreaterOrEqual),
            "LESS_OR_EQUAL" | "LTE" | "<=" => Ok(Operator::LessOrEqual),
            _ => Err(AppError::validation(format!("operator '{}' is not allowed", s))),
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Operator::Equals => "EQUALS",
            Operator::Like => "LIKE",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::GreaterOrEqual => "GREATER_OR_EQUAL",
            Operator::LessOrEqual => "LESS_OR_EQUAL",
        };
        f.write_str(s)
    }
}

/// Backend-neutral request for one operation.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct QueryRequest {
    pub kind: QueryKind,
    pub table: String,
    #[serde(default)]
    pub column: Option<String>,
    #[serde(default)]
    pub value: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

impl QueryRequest {
    pub fn new(kind: QueryKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            column: None,
            value: None,
            operator: None,
            limit: None,
        }
    }
}

/// One result row: column name to canonical value, in declared column order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
#[schema(value_type = Object)]
pub struct Record(pub serde_json::Map<String, serde_json::Value>);

impl Record {
    pub fn get(&self, column: &str) -> Option<&serde_json::Value> {
        self.0.get(column)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// Request body for `POST /api/query`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct TableQueryRequest {
    #[validate(length(min = 1, message = "table_name is required"))]
    pub table_name: String,
    /// Row limit (default 10, clamped to the configured maximum).
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Request body for `POST /api/search`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct SearchRequest {
    #[validate(length(min = 1, message = "table_name is required"))]
    pub table_name: String,
    #[validate(length(min = 1, message = "column_name is required"))]
    pub column_name: String,
    pub search_value: String,
    /// One of EQUALS, LIKE, GREATER_THAN, LESS_THAN, GREATER_OR_EQUAL,
    /// LESS_OR_EQUAL (default LIKE).
    #[serde(default = "default_operator")]
    pub operator: String,
    #[serde(default)]
    pub limit: Option<i64>,
}

fn default_operator() -> String {
    "LIKE".to_string()
}

/// Request body for `POST /api/record`.
#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RecordRequest {
    #[validate(length(min = 1, message = "table_name is required"))]
    pub table_name: String,
    #[validate(length(min = 1, message = "record_id is required"))]
    pub record_id: String,
    /// Identifier column (defaults to the primary key, then `id`).
    #[serde(default)]
    pub id_column: Option<String>,
}

/// Rows read from one table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordsResponse {
    pub table: String,
    pub records: Vec<Record>,
    pub count: usize,
}

/// Rows matching a search filter.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SearchResponse {
    pub table: String,
    pub column: String,
    pub search_value: String,
    pub operator: Operator,
    pub records: Vec<Record>,
    pub count: usize,
}

/// One row fetched by identifier.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RecordResponse {
    pub table: String,
    pub record_id: String,
    pub record: Record,
}

/// Row count of one table.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CountResponse {
    pub table: String,
    pub count: i64,
}
