//! Safe statement construction.
//!
//! Every table and column name is resolved against the schema snapshot and
//! quoted by the dialect; every caller value is bound as a parameter. The
//! builder never executes anything, so a rejected request reaches no backend.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use common::config::QueryLimits;
use common::errors::{AppError, AppResult};
use common::models::query::Operator;
use common::models::schema::{ColumnDescriptor, TableDescriptor, TypeCategory};

use crate::dialect::Dialect;
use crate::schema_inspector::SchemaInspector;
use crate::value::{BoundValue, Statement};

/// A statement together with the table it reads.
#[derive(Debug, Clone)]
pub struct PreparedQuery {
    pub statement: Statement,
    pub table: Arc<TableDescriptor>,
}

/// `SELECT COUNT(*)` over an already-resolved table.
pub(crate) fn count_statement(dialect: &dyn Dialect, table: &TableDescriptor) -> Statement {
    Statement::new(format!(
        "SELECT COUNT(*) AS record_count FROM {}",
        dialect.quote_identifier(&table.name)
    ))
}

pub struct QueryBuilder {
    inspector: Arc<SchemaInspector>,
    limits: QueryLimits,
}

impl QueryBuilder {
    pub fn new(inspector: Arc<SchemaInspector>, limits: QueryLimits) -> Self {
        Self { inspector, limits }
    }

    fn dialect(&self) -> &'static dyn Dialect {
        self.inspector.executor().dialect()
    }

    /// Applies the limit policy: absent means the default, non-positive is
    /// rejected, anything above the maximum is clamped.
    pub fn effective_limit(&self, requested: Option<i64>) -> AppResult<i64> {
        match requested {
            None => Ok(i64::from(self.limits.default_limit)),
            Some(n) if n <= 0 => Err(AppError::validation(format!(
                "limit must be positive, got {}",
                n
            ))),
            Some(n) => Ok(n.min(i64::from(self.limits.max_limit))),
        }
    }

    /// Unknown tables are a caller error here, not a lookup miss.
    async fn resolve_table(&self, name: &str) -> AppResult<Arc<TableDescriptor>> {
        match self.inspector.get_table(name).await {
            Err(AppError::NotFound { .. }) => {
                Err(AppError::validation(format!("unknown table '{}'", name)))
            }
            other => other,
        }
    }

    fn select_list(&self, table: &TableDescriptor) -> String {
        if table.columns.is_empty() {
            return "*".to_string();
        }
        table
            .columns
            .iter()
            .map(|c| self.dialect().select_column(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `SELECT <columns> FROM <table> LIMIT ?`.
    pub async fn build_select(&self, table: &str, limit: Option<i64>) -> AppResult<PreparedQuery> {
        let limit = self.effective_limit(limit)?;
        let table = self.resolve_table(table).await?;
        let dialect = self.dialect();

        let sql = format!(
            "SELECT {} FROM {} LIMIT {}",
            self.select_list(&table),
            dialect.quote_identifier(&table.name),
            dialect.placeholder(1)
        );
        Ok(PreparedQuery {
            statement: Statement::new(sql).bind(BoundValue::Int(limit)),
            table,
        })
    }

    /// `SELECT <columns> FROM <table> WHERE <column> <op> ? LIMIT ?`.
    pub async fn build_search(
        &self,
        table: &str,
        column: &str,
        value: &str,
        operator: Operator,
        limit: Option<i64>,
    ) -> AppResult<PreparedQuery> {
        let limit = self.effective_limit(limit)?;
        let table = self.resolve_table(table).await?;
        let filter = resolve_column(&table, column)?;
        let bound = coerce_value(filter, value, operator)?;
        let dialect = self.dialect();

        let sql = format!(
            "SELECT {} FROM {} WHERE {} {} {} LIMIT {}",
            self.select_list(&table),
            dialect.quote_identifier(&table.name),
            dialect.filter_column(filter, operator),
            operator.as_sql(),
            dialect.placeholder(1),
            dialect.placeholder(2)
        );
        Ok(PreparedQuery {
            statement: Statement::new(sql)
                .bind(bound)
                .bind(BoundValue::Int(limit)),
            table,
        })
    }

    /// Single-row lookup by identifier. The column defaults to the primary
    /// key, then to `id`.
    pub async fn build_get_by_id(
        &self,
        table: &str,
        id_column: Option<&str>,
        id_value: &str,
    ) -> AppResult<PreparedQuery> {
        let table = self.resolve_table(table).await?;
        let id_column = id_column
            .or(table.primary_key.as_deref())
            .unwrap_or("id");
        let filter = resolve_column(&table, id_column)?;
        let bound = coerce_value(filter, id_value, Operator::Equals)?;
        let dialect = self.dialect();

        let sql = format!(
            "SELECT {} FROM {} WHERE {} = {} LIMIT 1",
            self.select_list(&table),
            dialect.quote_identifier(&table.name),
            dialect.filter_column(filter, Operator::Equals),
            dialect.placeholder(1)
        );
        Ok(PreparedQuery {
            statement: Statement::new(sql).bind(bound),
            table,
        })
    }

    pub async fn build_count(&self, table: &str) -> AppResult<PreparedQuery> {
        let table = self.resolve_table(table).await?;
        Ok(PreparedQuery {
            statement: count_statement(self.dialect(), &table),
            table,
        })
    }
}

fn resolve_column<'t>(table: &'t TableDescriptor, name: &str) -> AppResult<&'t ColumnDescriptor> {
    table.column(name).ok_or_else(|| {
        AppError::validation(format!(
            "unknown column '{}' in table '{}'",
            name, table.name
        ))
    })
}

/// Converts a caller's text value into a parameter matching the column's
/// category. `LIKE` always binds a `%value%` text pattern.
pub(crate) fn coerce_value(
    column: &ColumnDescriptor,
    value: &str,
    operator: Operator,
) -> AppResult<BoundValue> {
    if operator == Operator::Like {
        return Ok(BoundValue::Text(format!("%{}%", value)));
    }

    let mismatch = |expected: &str| {
        AppError::validation(format!(
            "value '{}' is not a valid {} for column '{}'",
            value, expected, column.name
        ))
    };
    let trimmed = value.trim();

    match column.category {
        TypeCategory::Text => Ok(BoundValue::Text(value.to_string())),
        TypeCategory::Numeric => {
            if let Ok(i) = trimmed.parse::<i64>() {
                Ok(BoundValue::Int(i))
            } else {
                trimmed
                    .parse::<f64>()
                    .ok()
                    .filter(|f| f.is_finite())
                    .map(BoundValue::Float)
                    .ok_or_else(|| mismatch("number"))
            }
        }
        TypeCategory::Boolean => match trimmed.to_lowercase().as_str() {
            "true" | "t" | "1" | "yes" => Ok(BoundValue::Bool(true)),
            "false" | "f" | "0" | "no" => Ok(BoundValue::Bool(false)),
            _ => Err(mismatch("boolean")),
        },
        TypeCategory::Temporal => parse_temporal(trimmed).ok_or_else(|| mismatch("date or time")),
        TypeCategory::Binary => Err(AppError::validation(format!(
            "column '{}' is binary and only supports LIKE",
            column.name
        ))),
    }
}

fn parse_temporal(value: &str) -> Option<BoundValue> {
    const DATETIME_FORMATS: [&str; 4] = [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ];

    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
    {
        return Some(BoundValue::DateTime(dt));
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(BoundValue::DateTime(dt.naive_utc()));
    }
    if let Ok(d) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(BoundValue::Date(d));
    }
    ["%H:%M:%S%.f", "%H:%M"]
        .iter()
        .find_map(|fmt| NaiveTime::parse_from_str(value, fmt).ok())
        .map(BoundValue::Time)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StatementExecutor;
    use crate::testing::RecordingExecutor;
    use common::models::connection::DbType;

    fn builder(executor: &Arc<RecordingExecutor>) -> QueryBuilder {
        let inspector = Arc::new(SchemaInspector::new(
            executor.clone() as Arc<dyn StatementExecutor>
        ));
        QueryBuilder::new(inspector, QueryLimits::default())
    }


    #[tokio::test]
    async fn test_select_lists_columns_and_binds_limit() {
        let executor = Arc::new(RecordingExecutor::shop());
        let prepared = builder(&executor).build_select("users", None).await.unwrap();

        assert_eq!(
            prepared.statement.sql,
            "SELECT \"id\", \"name\", \"email\", \"age\", \"active\", \"created_at\" \
             FROM \"users\" LIMIT $1"
        );
        assert_eq!(prepared.statement.params, vec![BoundValue::Int(10)]);
        assert_eq!(prepared.table.name, "users");
        assert_eq!(executor.data_statements(), 0);
    }

    #[tokio::test]
    async fn test_limit_policy() {
        let executor = Arc::new(RecordingExecutor::shop());
        let builder = builder(&executor);

        let clamped = builder.build_select("users", Some(100_000)).await.unwrap();
        assert_eq!(clamped.statement.params, vec![BoundValue::Int(100)]);
        let exact = builder.build_select("users", Some(25)).await.unwrap();
        assert_eq!(exact.statement.params, vec![BoundValue::Int(25)]);

        for bad in [0, -1] {
            let err = builder.build_select("users", Some(bad)).await.unwrap_err();
            assert_eq!(err.code(), "VALIDATION_ERROR");
        }
    }

    #[tokio::test]
    async fn test_unknown_identifiers_execute_nothing() {
        let executor = Arc::new(RecordingExecutor::shop());
        let builder = builder(&executor);

        let hostile = "users; DROP TABLE users; --";
        let err = builder.build_select(hostile, None).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = builder
            .build_search("users", "name\" OR 1=1 --", "x", Operator::Equals, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = builder.build_count("Users").await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        let err = builder
            .build_get_by_id("orders", Some("missing"), "1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        assert_eq!(executor.data_statements(), 0);
    }

    #[tokio::test]
    async fn test_search_like_wraps_pattern() {
        let executor = Arc::new(RecordingExecutor::shop());
        let prepared = builder(&executor)
            .build_search("users", "name", "john", Operator::Like, Some(5))
            .await
            .unwrap();

        assert!(prepared
            .statement
            .sql
            .ends_with("FROM \"users\" WHERE \"name\" LIKE $1 LIMIT $2"));
        assert_eq!(
            prepared.statement.params,
            vec![BoundValue::Text("%john%".into()), BoundValue::Int(5)]
        );
    }

    #[tokio::test]
    async fn test_hostile_value_is_only_bound() {
        let executor = Arc::new(RecordingExecutor::shop());
        let value = "x'; DROP TABLE users; --";
        let prepared = builder(&executor)
            .build_search("users", "email", value, Operator::Equals, None)
            .await
            .unwrap();

        assert!(!prepared.statement.sql.contains("DROP"));
        assert_eq!(prepared.statement.params[0], BoundValue::Text(value.into()));
    }

    #[tokio::test]
    async fn test_values_follow_column_category() {
        let executor = Arc::new(RecordingExecutor::shop());
        let builder = builder(&executor);

        let prepared = builder
            .build_search("users", "age", "30", Operator::GreaterThan, None)
            .await
            .unwrap();
        assert_eq!(prepared.statement.params[0], BoundValue::Int(30));
        assert!(prepared.statement.sql.contains("WHERE \"age\" > $1"));

        let prepared = builder
            .build_search("users", "active", "true", Operator::Equals, None)
            .await
            .unwrap();
        assert_eq!(prepared.statement.params[0], BoundValue::Bool(true));

        let prepared = builder
            .build_search("orders", "placed_on", "2024-01-15", Operator::GreaterOrEqual, None)
            .await
            .unwrap();
        assert_eq!(
            prepared.statement.params[0],
            BoundValue::Date(NaiveDate::from_ymd_opt(2024, 1, 15).unwrap())
        );

        let err = builder
            .build_search("users", "age", "thirty", Operator::Equals, None)
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(executor.data_statements(), 0);
    }

    #[tokio::test]
    async fn test_get_by_id_defaults_to_primary_key() {
        let executor = Arc::new(RecordingExecutor::shop());
        let prepared = builder(&executor)
            .build_get_by_id("users", None, "1")
            .await
            .unwrap();

        assert!(prepared
            .statement
            .sql
            .ends_with("FROM \"users\" WHERE \"id\" = $1 LIMIT 1"));
        assert_eq!(prepared.statement.params, vec![BoundValue::Int(1)]);
    }

    #[tokio::test]
    async fn test_count_statement() {
        let executor = Arc::new(RecordingExecutor::shop());
        let prepared = builder(&executor).build_count("orders").await.unwrap();
        assert_eq!(
            prepared.statement.sql,
            "SELECT COUNT(*) AS record_count FROM \"orders\""
        );
        assert!(prepared.statement.params.is_empty());
    }

    #[tokio::test]
    async fn test_mysql_quoting_and_placeholders() {
        let executor = Arc::new(RecordingExecutor::new(
            DbType::MySQL,
            crate::testing::shop_catalog(),
        ));
        let prepared = builder(&executor)
            .build_search("orders", "total", "12.50", Operator::LessThan, None)
            .await
            .unwrap();
        assert_eq!(
            prepared.statement.sql,
            "SELECT `id`, `user_id`, CAST(`total` AS CHAR) AS `total`, `placed_on` \
             FROM `orders` WHERE `total` < ? LIMIT ?"
        );
        assert_eq!(prepared.statement.params[0], BoundValue::Float(12.5));
    }

    #[test]
    fn test_temporal_parsing() {
        let column = ColumnDescriptor::new("created_at", "timestamp", true);
        let bound = coerce_value(&column, "2024-01-15T10:30:00", Operator::Equals).unwrap();
        let expected = NaiveDate::from_ymd_opt(2024, 1, 15)
            .unwrap()
            .and_hms_opt(10, 30, 0)
            .unwrap();
        assert_eq!(bound, BoundValue::DateTime(expected));
        let bound = coerce_value(&column, "2024-01-15 10:30:00", Operator::Equals).unwrap();
        assert_eq!(bound, BoundValue::DateTime(expected));
        assert!(coerce_value(&column, "yesterday", Operator::Equals).is_err());
    }
}
