//! In-memory executor used by the unit tests.

use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use common::errors::{AppError, AppResult, QueryErrorKind};
use common::models::connection::DbType;

use crate::dialect::{dialect_for, Catalog, Dialect, CATALOG_COLUMNS, FOREIGN_KEY_COLUMNS};
use crate::executor::StatementExecutor;
use crate::value::{BoundValue, Cell, Row, Statement};

/// Answers catalog and count statements from fixed data and records every
/// statement it receives.
pub(crate) struct RecordingExecutor {
    dialect: &'static dyn Dialect,
    catalog: Mutex<Vec<Row>>,
    foreign_keys: Mutex<Vec<Row>>,
    rows: Mutex<Vec<Row>>,
    count: i64,
    delay: Duration,
    views: Vec<String>,
    broken: Vec<String>,
    executed: Mutex<Vec<Statement>>,
}

impl RecordingExecutor {
    pub fn new(db_type: DbType, catalog: Vec<Row>) -> Self {
        Self {
            dialect: dialect_for(db_type),
            catalog: Mutex::new(catalog),
            foreign_keys: Mutex::new(Vec::new()),
            rows: Mutex::new(Vec::new()),
            count: 0,
            delay: Duration::ZERO,
            views: Vec::new(),
            broken: Vec::new(),
            executed: Mutex::new(Vec::new()),
        }
    }

    /// Postgres-flavored executor over the `users`/`orders` fixture.
    pub fn shop() -> Self {
        Self::new(DbType::Postgres, shop_catalog()).with_foreign_keys(vec![foreign_key_row(
            "orders", "user_id", "users", "id",
        )])
    }

    pub fn with_foreign_keys(self, keys: Vec<Row>) -> Self {
        *self.foreign_keys.lock().unwrap() = keys;
        self
    }

    pub fn with_rows(self, rows: Vec<Row>) -> Self {
        *self.rows.lock().unwrap() = rows;
        self
    }

    pub fn with_count(mut self, count: i64) -> Self {
        self.count = count;
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Lists `name` as a view whose columns can no longer be read.
    pub fn with_broken_view(mut self, name: &str) -> Self {
        self.views.push(name.to_string());
        self.broken.push(name.to_string());
        self
    }

    pub fn with_broken_table(mut self, name: &str) -> Self {
        self.broken.push(name.to_string());
        self
    }

    pub fn set_catalog(&self, catalog: Vec<Row>) {
        *self.catalog.lock().unwrap() = catalog;
    }

    pub fn executed(&self) -> Vec<Statement> {
        self.executed.lock().unwrap().clone()
    }

    pub fn catalog_reads(&self) -> usize {
        let catalog_sql = match self.dialect.catalog() {
            Catalog::Single(sql) => sql,
            Catalog::PerObject { objects, .. } => objects,
        };
        self.executed()
            .iter()
            .filter(|s| s.sql == catalog_sql)
            .count()
    }

    /// Statements spent on schema discovery, foreign keys included.
    pub fn discovery_reads(&self) -> usize {
        let discovery = |catalog: Catalog, sql: &str| match catalog {
            Catalog::Single(single) => sql == single,
            Catalog::PerObject { objects, columns } => sql == objects || sql == columns("").sql,
        };
        self.executed()
            .iter()
            .filter(|s| {
                discovery(self.dialect.catalog(), &s.sql)
                    || discovery(self.dialect.foreign_key_catalog(), &s.sql)
            })
            .count()
    }

    /// Statements other than schema discovery.
    pub fn data_statements(&self) -> usize {
        self.executed().len() - self.discovery_reads()
    }

    /// `(table_name, object_type)` rows for every table in the catalog.
    fn objects(&self, catalog: &[Row]) -> Vec<Row> {
        let mut names: Vec<String> = catalog
            .iter()
            .filter_map(|row| row.get("table_name").and_then(Cell::as_text))
            .collect();
        names.dedup();
        names
            .into_iter()
            .map(|name| {
                let kind = if self.views.contains(&name) { "view" } else { "table" };
                Row::new(
                    vec!["table_name".into(), "object_type".into()],
                    vec![Cell::Text(name), Cell::Text(kind.into())],
                )
            })
            .collect()
    }

    fn answer(
        &self,
        catalog: Catalog,
        rows: &[Row],
        statement: &Statement,
    ) -> Option<AppResult<Vec<Row>>> {
        match catalog {
            Catalog::Single(sql) => (statement.sql == sql).then(|| Ok(rows.to_vec())),
            Catalog::PerObject { objects, .. } if statement.sql == objects => {
                let tables = self.catalog.lock().unwrap().clone();
                Some(Ok(self.objects(&tables)))
            }
            Catalog::PerObject { columns, .. } if statement.sql == columns("").sql => {
                let Some(BoundValue::Text(name)) = statement.params.first() else {
                    return Some(Ok(Vec::new()));
                };
                if self.broken.contains(name) {
                    return Some(Err(AppError::query(
                        QueryErrorKind::Syntax,
                        format!("no such table referenced by {}", name),
                    )));
                }
                let owned = |row: &Row| {
                    row.get("table_name").and_then(Cell::as_text).as_deref() == Some(name.as_str())
                };
                Some(Ok(rows.iter().filter(|row| owned(row)).cloned().collect()))
            }
            Catalog::PerObject { .. } => None,
        }
    }
}

#[async_trait]
impl StatementExecutor for RecordingExecutor {
    fn dialect(&self) -> &'static dyn Dialect {
        self.dialect
    }

    async fn fetch_all(&self, statement: &Statement) -> AppResult<Vec<Row>> {
        self.executed.lock().unwrap().push(statement.clone());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let catalog = self.catalog.lock().unwrap().clone();
        let keys = self.foreign_keys.lock().unwrap().clone();
        let answered = self
            .answer(self.dialect.catalog(), &catalog, statement)
            .or_else(|| self.answer(self.dialect.foreign_key_catalog(), &keys, statement));
        if let Some(answer) = answered {
            return answer;
        }
        if statement.sql.starts_with("SELECT COUNT(*)") {
            return Ok(vec![Row::new(
                vec!["record_count".into()],
                vec![Cell::Int(self.count)],
            )]);
        }
        Ok(self.rows.lock().unwrap().clone())
    }
}

pub(crate) fn catalog_row(
    table: &str,
    column: &str,
    data_type: &str,
    nullable: bool,
    primary: bool,
) -> Row {
    let yes_no = |b: bool| Cell::Text(if b { "YES" } else { "NO" }.to_string());
    Row::new(
        CATALOG_COLUMNS.iter().map(|c| c.to_string()).collect(),
        vec![
            Cell::Text(table.into()),
            Cell::Text(column.into()),
            Cell::Text(data_type.into()),
            yes_no(nullable),
            yes_no(primary),
        ],
    )
}

pub(crate) fn foreign_key_row(
    table: &str,
    column: &str,
    referenced_table: &str,
    referenced_column: &str,
) -> Row {
    Row::new(
        FOREIGN_KEY_COLUMNS.iter().map(|c| c.to_string()).collect(),
        vec![
            Cell::Text(table.into()),
            Cell::Text(column.into()),
            Cell::Text(referenced_table.into()),
            Cell::Text(referenced_column.into()),
        ],
    )
}

pub(crate) fn shop_catalog() -> Vec<Row> {
    vec![
        catalog_row("orders", "id", "integer", false, true),
        catalog_row("orders", "user_id", "integer", false, false),
        catalog_row("orders", "total", "numeric", true, false),
        catalog_row("orders", "placed_on", "date", true, false),
        catalog_row("users", "id", "integer", false, true),
        catalog_row("users", "name", "character varying", true, false),
        catalog_row("users", "email", "character varying", true, false),
        catalog_row("users", "age", "integer", true, false),
        catalog_row("users", "active", "boolean", true, false),
        catalog_row("users", "created_at", "timestamp without time zone", true, false),
    ]
}

pub(crate) fn user_row(id: i64, name: &str, email: &str) -> Row {
    Row::new(
        vec![
            "id".into(),
            "name".into(),
            "email".into(),
            "age".into(),
            "active".into(),
            "created_at".into(),
        ],
        vec![
            Cell::Int(id),
            Cell::Text(name.into()),
            Cell::Text(email.into()),
            Cell::Null,
            Cell::Bool(true),
            Cell::DateTime(
                chrono::NaiveDate::from_ymd_opt(2024, 1, 15)
                    .unwrap()
                    .and_hms_opt(10, 30, 0)
                    .unwrap(),
            ),
        ],
    )
}
