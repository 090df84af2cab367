//! Data access facade.
//!
//! Composes inspector, builder, executor and formatter into the operations
//! the REST surface and the dialogue adapter call.

use std::sync::Arc;
use std::time::Instant;

use common::config::QueryLimits;
use common::errors::{AppError, AppResult, QueryErrorKind};
use common::models::query::{
    CountResponse, Operator, QueryKind, QueryRequest, Record, RecordResponse, RecordsResponse,
    SearchResponse,
};
use common::models::schema::{TableInfo, TablesResponse};
use serde::Serialize;
use utoipa::ToSchema;

use crate::executor::StatementExecutor;
use crate::formatter::{format_rows, format_single};
use crate::query_builder::{PreparedQuery, QueryBuilder};
use crate::schema_inspector::SchemaInspector;
use crate::value::{Cell, Row};

/// Result of a backend-neutral [`QueryRequest`].
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct QueryOutcome {
    pub kind: QueryKind,
    pub table: String,
    pub records: Vec<Record>,
    /// Rows returned, or the table's row count for `count`.
    pub count: i64,
}

/// Summary returned after a schema refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshSummary {
    pub generation: u64,
    pub tables: Vec<String>,
    pub loaded_at: chrono::DateTime<chrono::Utc>,
}

pub struct DataService {
    executor: Arc<dyn StatementExecutor>,
    inspector: Arc<SchemaInspector>,
    builder: QueryBuilder,
}

impl DataService {
    pub fn new(executor: Arc<dyn StatementExecutor>, limits: QueryLimits) -> Self {
        let inspector = Arc::new(SchemaInspector::new(executor.clone()));
        let builder = QueryBuilder::new(inspector.clone(), limits);
        Self {
            executor,
            inspector,
            builder,
        }
    }

    pub fn inspector(&self) -> &Arc<SchemaInspector> {
        &self.inspector
    }

    /// Runs a built statement. A backend rejecting SQL we generated is a bug
    /// on our side, so it is logged loudly.
    async fn execute(&self, prepared: &PreparedQuery) -> AppResult<Vec<Row>> {
        let start = Instant::now();
        match self.executor.fetch_all(&prepared.statement).await {
            Ok(rows) => {
                tracing::debug!(
                    table = %prepared.table.name,
                    rows = rows.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "statement completed"
                );
                Ok(rows)
            }
            Err(err @ AppError::Query { .. }) => {
                tracing::error!(
                    table = %prepared.table.name,
                    sql = %prepared.statement.sql,
                    detail = err.detail().unwrap_or_default(),
                    "backend rejected a generated statement"
                );
                Err(err)
            }
            Err(err) => Err(err),
        }
    }

    /// Every table with its columns and current row count.
    pub async fn list_tables(&self) -> AppResult<TablesResponse> {
        let mut tables = Vec::new();
        for table in self.inspector.list_tables().await? {
            let count = self.inspector.record_count(&table.name).await?;
            tables.push(TableInfo::new(&table, count));
        }
        Ok(TablesResponse { tables })
    }

    pub async fn describe_table(&self, name: &str) -> AppResult<TableInfo> {
        let table = self.inspector.get_table(name).await?;
        let count = self.inspector.record_count(&table.name).await?;
        Ok(TableInfo::new(&table, count))
    }

    pub async fn select(&self, table: &str, limit: Option<i64>) -> AppResult<RecordsResponse> {
        let prepared = self.builder.build_select(table, limit).await?;
        let rows = self.execute(&prepared).await?;
        let records = format_rows(&rows, &prepared.table.columns);
        Ok(RecordsResponse {
            table: prepared.table.name.clone(),
            count: records.len(),
            records,
        })
    }

    /// `operator` is parsed against the allow-list before anything else.
    pub async fn search(
        &self,
        table: &str,
        column: &str,
        value: &str,
        operator: &str,
        limit: Option<i64>,
    ) -> AppResult<SearchResponse> {
        let operator: Operator = operator.parse()?;
        let prepared = self
            .builder
            .build_search(table, column, value, operator, limit)
            .await?;
        let rows = self.execute(&prepared).await?;
        let records = format_rows(&rows, &prepared.table.columns);
        Ok(SearchResponse {
            table: prepared.table.name.clone(),
            column: column.to_string(),
            search_value: value.to_string(),
            operator,
            count: records.len(),
            records,
        })
    }

    pub async fn get_by_id(
        &self,
        table: &str,
        id_column: Option<&str>,
        id_value: &str,
    ) -> AppResult<RecordResponse> {
        let prepared = self
            .builder
            .build_get_by_id(table, id_column, id_value)
            .await?;
        let rows = self.execute(&prepared).await?;
        let record = format_single(rows.first(), &prepared.table.columns).ok_or_else(|| {
            AppError::not_found(format!(
                "no record with id '{}' in table '{}'",
                id_value, prepared.table.name
            ))
        })?;
        Ok(RecordResponse {
            table: prepared.table.name.clone(),
            record_id: id_value.to_string(),
            record,
        })
    }

    /// Row count. Unknown tables are a lookup miss here, not a bad request.
    pub async fn count(&self, table: &str) -> AppResult<CountResponse> {
        let descriptor = self.inspector.get_table(table).await?;
        let prepared = self.builder.build_count(&descriptor.name).await?;
        let rows = self.execute(&prepared).await?;
        let count = rows
            .first()
            .and_then(Row::first)
            .and_then(Cell::as_i64)
            .ok_or_else(|| {
                AppError::query(
                    QueryErrorKind::Other,
                    format!("count of '{}' returned no integer", descriptor.name),
                )
            })?;
        Ok(CountResponse {
            table: descriptor.name.clone(),
            count,
        })
    }

    pub async fn refresh_schema(&self) -> AppResult<RefreshSummary> {
        let snapshot = self.inspector.refresh().await?;
        Ok(RefreshSummary {
            generation: self.inspector.generation(),
            tables: snapshot.table_names(),
            loaded_at: snapshot.loaded_at(),
        })
    }

    /// Dispatches a backend-neutral request.
    pub async fn run(&self, request: &QueryRequest) -> AppResult<QueryOutcome> {
        let table = request.table.as_str();
        match request.kind {
            QueryKind::Select => {
                let resp = self.select(table, request.limit).await?;
                Ok(QueryOutcome {
                    kind: request.kind,
                    table: resp.table,
                    count: resp.count as i64,
                    records: resp.records,
                })
            }
            QueryKind::Search => {
                let column = required(request.column.as_deref(), "column")?;
                let value = required(request.value.as_deref(), "value")?;
                let operator = request.operator.as_deref().unwrap_or("LIKE");
                let resp = self
                    .search(table, column, value, operator, request.limit)
                    .await?;
                Ok(QueryOutcome {
                    kind: request.kind,
                    table: resp.table,
                    count: resp.count as i64,
                    records: resp.records,
                })
            }
            QueryKind::GetById => {
                let value = required(request.value.as_deref(), "value")?;
                let resp = self
                    .get_by_id(table, request.column.as_deref(), value)
                    .await?;
                Ok(QueryOutcome {
                    kind: request.kind,
                    table: resp.table,
                    count: 1,
                    records: vec![resp.record],
                })
            }
            QueryKind::Count => {
                let resp = self.count(table).await?;
                Ok(QueryOutcome {
                    kind: request.kind,
                    table: resp.table,
                    count: resp.count,
                    records: Vec::new(),
                })
            }
        }
    }
}

fn required<'a>(value: Option<&'a str>, field: &str) -> AppResult<&'a str> {
    value.ok_or_else(|| AppError::validation(format!("{} is required", field)))
}
