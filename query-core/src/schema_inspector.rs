//! Schema discovery and the shared schema snapshot.
//!
//! The snapshot is the single source of truth for table and column names:
//! listing and lookup both read the same immutable value, and identifiers
//! never reach SQL unless they come from it.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use common::errors::{AppError, AppResult, QueryErrorKind};
use common::models::schema::{ColumnDescriptor, ForeignKey, TableDescriptor};
use tokio::sync::{Mutex, RwLock};

use crate::dialect::Catalog;
use crate::executor::StatementExecutor;
use crate::query_builder::count_statement;
use crate::value::{Row, Statement};

/// Immutable view of every discovered table, keyed by exact name.
#[derive(Debug, Clone)]
pub struct SchemaSnapshot {
    tables: BTreeMap<String, Arc<TableDescriptor>>,
    loaded_at: DateTime<Utc>,
}

impl SchemaSnapshot {
    /// Builds a snapshot from catalog rows ordered by table, then column
    /// position.
    pub fn from_catalog(rows: &[Row]) -> AppResult<Self> {
        Self::build(rows, &[])
    }

    /// Like [`SchemaSnapshot::from_catalog`], attaching foreign-key rows to
    /// the tables they belong to. Keys of unknown tables are dropped; a key
    /// without a referenced column points at the referenced primary key.
    pub fn build(rows: &[Row], foreign_keys: &[Row]) -> AppResult<Self> {
        let mut tables: BTreeMap<String, TableDescriptor> = BTreeMap::new();

        for row in rows {
            let table_name = catalog_text(row, "table_name")?;
            let column_name = catalog_text(row, "column_name")?;
            let data_type = catalog_text(row, "data_type").unwrap_or_default();
            let nullable = catalog_flag(row, "is_nullable");
            let primary = catalog_flag(row, "is_primary");

            let table = tables
                .entry(table_name.clone())
                .or_insert_with(|| TableDescriptor {
                    name: table_name,
                    columns: Vec::new(),
                    primary_key: None,
                    foreign_keys: Vec::new(),
                });
            if primary && table.primary_key.is_none() {
                table.primary_key = Some(column_name.clone());
            }
            table
                .columns
                .push(ColumnDescriptor::new(column_name, data_type, nullable));
        }

        for row in foreign_keys {
            let table_name = catalog_text(row, "table_name")?;
            let referenced_table = catalog_text(row, "referenced_table")?;
            let referenced_column = catalog_text(row, "referenced_column")
                .ok()
                .or_else(|| tables.get(&referenced_table)?.primary_key.clone())
                .unwrap_or_else(|| "id".to_string());
            let key = ForeignKey {
                column: catalog_text(row, "column_name")?,
                referenced_table,
                referenced_column,
            };
            if let Some(table) = tables.get_mut(&table_name) {
                table.foreign_keys.push(key);
            }
        }

        Ok(Self {
            tables: tables
                .into_iter()
                .map(|(name, table)| (name, Arc::new(table)))
                .collect(),
            loaded_at: Utc::now(),
        })
    }

    /// Exact, case-sensitive lookup.
    pub fn get(&self, name: &str) -> Option<&Arc<TableDescriptor>> {
        self.tables.get(name)
    }

    /// Tables that reference `name` or that `name` references, sorted.
    pub fn related_tables(&self, name: &str) -> Vec<String> {
        let mut related: Vec<String> = self
            .tables
            .values()
            .filter(|t| t.name != name)
            .filter(|t| t.foreign_keys.iter().any(|fk| fk.referenced_table == name))
            .map(|t| t.name.clone())
            .collect();
        if let Some(table) = self.tables.get(name) {
            related.extend(table.referenced_tables().into_iter().filter(|t| t != name));
        }
        related.sort();
        related.dedup();
        related
    }

    /// Every table, sorted by name.
    pub fn tables(&self) -> impl Iterator<Item = &Arc<TableDescriptor>> {
        self.tables.values()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.tables.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn loaded_at(&self) -> DateTime<Utc> {
        self.loaded_at
    }
}

fn catalog_text(row: &Row, column: &str) -> AppResult<String> {
    row.get(column)
        .and_then(|cell| cell.as_text())
        .ok_or_else(|| {
            AppError::query(
                QueryErrorKind::Other,
                format!("catalog row is missing {}", column),
            )
        })
}

fn catalog_flag(row: &Row, column: &str) -> bool {
    catalog_text(row, column)
        .map(|v| v.eq_ignore_ascii_case("YES"))
        .unwrap_or(false)
}

/// Discovers the schema and serves lookups from the current snapshot.
///
/// The snapshot is loaded on first use. Refreshes are coalesced: callers that
/// arrive while a refresh is running wait for it and share its result instead
/// of starting another. Readers keep the old snapshot until the new one is
/// swapped in whole.
pub struct SchemaInspector {
    executor: Arc<dyn StatementExecutor>,
    current: RwLock<Option<Arc<SchemaSnapshot>>>,
    refresh_gate: Mutex<()>,
    generation: AtomicU64,
}

impl SchemaInspector {
    pub fn new(executor: Arc<dyn StatementExecutor>) -> Self {
        Self {
            executor,
            current: RwLock::new(None),
            refresh_gate: Mutex::new(()),
            generation: AtomicU64::new(0),
        }
    }

    pub fn executor(&self) -> &Arc<dyn StatementExecutor> {
        &self.executor
    }

    /// Number of snapshots published so far.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// The current snapshot, discovering it first if none exists yet.
    pub async fn snapshot(&self) -> AppResult<Arc<SchemaSnapshot>> {
        if let Some(snapshot) = self.current.read().await.clone() {
            return Ok(snapshot);
        }
        let _gate = self.refresh_gate.lock().await;
        if let Some(snapshot) = self.current.read().await.clone() {
            return Ok(snapshot);
        }
        self.discover().await
    }

    /// Rebuilds the snapshot from the catalog and swaps it in.
    pub async fn refresh(&self) -> AppResult<Arc<SchemaSnapshot>> {
        let seen = self.generation();
        let _gate = self.refresh_gate.lock().await;
        if self.generation() != seen {
            if let Some(snapshot) = self.current.read().await.clone() {
                tracing::debug!("joined concurrent schema refresh");
                return Ok(snapshot);
            }
        }
        self.discover().await
    }

    /// Runs discovery and publishes the result. Callers hold the gate.
    async fn discover(&self) -> AppResult<Arc<SchemaSnapshot>> {
        let start = Instant::now();
        let dialect = self.executor.dialect();
        let rows = self.read_catalog(dialect.catalog()).await?;
        let foreign_keys = match self.read_catalog(dialect.foreign_key_catalog()).await {
            Ok(found) => found,
            Err(AppError::Query { kind, detail }) => {
                tracing::warn!(%kind, %detail, "foreign keys unavailable, continuing without them");
                Vec::new()
            }
            Err(err) => return Err(err),
        };
        let snapshot = Arc::new(SchemaSnapshot::build(&rows, &foreign_keys)?);

        *self.current.write().await = Some(snapshot.clone());
        let generation = self.generation.fetch_add(1, Ordering::AcqRel) + 1;

        tracing::info!(
            tables = snapshot.len(),
            generation,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "schema snapshot published"
        );
        Ok(snapshot)
    }

    async fn read_catalog(&self, catalog: Catalog) -> AppResult<Vec<Row>> {
        let (objects, columns) = match catalog {
            Catalog::Single(sql) => return self.executor.fetch_all(&Statement::new(sql)).await,
            Catalog::PerObject { objects, columns } => (objects, columns),
        };

        let listed = self.executor.fetch_all(&Statement::new(objects)).await?;
        let mut rows = Vec::new();
        for object in &listed {
            let name = catalog_text(object, "table_name")?;
            let is_view = catalog_text(object, "object_type")
                .map(|t| t.eq_ignore_ascii_case("view"))
                .unwrap_or(false);
            match self.executor.fetch_all(&columns(&name)).await {
                Ok(found) => rows.extend(found),
                Err(AppError::Query { kind, detail }) if is_view => {
                    tracing::warn!(view = %name, %kind, %detail, "skipping view that cannot be read");
                }
                Err(err) => return Err(err),
            }
        }
        Ok(rows)
    }

    /// Every table, sorted by name.
    pub async fn list_tables(&self) -> AppResult<Vec<Arc<TableDescriptor>>> {
        Ok(self.snapshot().await?.tables().cloned().collect())
    }

    /// Exact-name lookup. On a miss the error lists the tables that exist.
    pub async fn get_table(&self, name: &str) -> AppResult<Arc<TableDescriptor>> {
        let snapshot = self.snapshot().await?;
        snapshot
            .get(name)
            .cloned()
            .ok_or_else(|| AppError::table_not_found(name, snapshot.table_names()))
    }

    /// Tables linked to `table` by a foreign key in either direction.
    pub async fn related_tables(&self, table: &str) -> AppResult<Vec<String>> {
        let snapshot = self.snapshot().await?;
        if snapshot.get(table).is_none() {
            return Err(AppError::table_not_found(table, snapshot.table_names()));
        }
        Ok(snapshot.related_tables(table))
    }

    /// Current row count of `table`.
    pub async fn record_count(&self, table: &str) -> AppResult<i64> {
        let descriptor = self.get_table(table).await?;
        let statement = count_statement(self.executor.dialect(), &descriptor);
        let rows = self.executor.fetch_all(&statement).await?;
        rows.first()
            .and_then(Row::first)
            .and_then(|cell| cell.as_i64())
            .ok_or_else(|| {
                AppError::query(
                    QueryErrorKind::Other,
                    format!("count of '{}' returned no integer", table),
                )
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::FOREIGN_KEY_COLUMNS;
    use crate::testing::{catalog_row, foreign_key_row, RecordingExecutor};
    use crate::value::Cell;
    use std::time::Duration;

    fn inspector(executor: &Arc<RecordingExecutor>) -> SchemaInspector {
        SchemaInspector::new(executor.clone() as Arc<dyn StatementExecutor>)
    }

    #[test]
    fn test_snapshot_groups_columns_in_order() {
        let snapshot = SchemaSnapshot::from_catalog(&crate::testing::shop_catalog()).unwrap();
        assert_eq!(snapshot.table_names(), vec!["orders", "users"]);
        let users = snapshot.get("users").unwrap();
        assert_eq!(
            users.column_names(),
            vec!["id", "name", "email", "age", "active", "created_at"]
        );
        assert_eq!(users.primary_key.as_deref(), Some("id"));
        assert!(!users.column("id").unwrap().nullable);
    }

    #[test]
    fn test_foreign_keys_attach_to_tables() {
        let without_target = Row::new(
            FOREIGN_KEY_COLUMNS.iter().map(|c| c.to_string()).collect(),
            vec![
                Cell::Text("orders".into()),
                Cell::Text("user_id".into()),
                Cell::Text("users".into()),
                Cell::Null,
            ],
        );
        let keys = vec![
            without_target,
            foreign_key_row("archive", "user_id", "users", "id"),
        ];
        let snapshot = SchemaSnapshot::build(&crate::testing::shop_catalog(), &keys).unwrap();

        let orders = snapshot.get("orders").unwrap();
        assert_eq!(
            orders.foreign_keys,
            vec![ForeignKey {
                column: "user_id".into(),
                referenced_table: "users".into(),
                referenced_column: "id".into(),
            }]
        );
        assert!(snapshot.get("users").unwrap().foreign_keys.is_empty());
        assert_eq!(snapshot.related_tables("users"), vec!["orders"]);
        assert_eq!(snapshot.related_tables("orders"), vec!["users"]);
    }

    #[tokio::test]
    async fn test_related_tables_of_unknown_table() {
        let executor = Arc::new(RecordingExecutor::shop());
        let err = inspector(&executor).related_tables("user").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
    }

    #[tokio::test]
    async fn test_list_and_get_agree() {
        let executor = Arc::new(RecordingExecutor::shop());
        let inspector = inspector(&executor);

        let listed = inspector.list_tables().await.unwrap();
        let names: Vec<_> = listed.iter().map(|t| t.name.clone()).collect();
        assert_eq!(names, vec!["orders", "users"]);
        for table in &listed {
            let fetched = inspector.get_table(&table.name).await.unwrap();
            assert_eq!(&fetched, table);
        }
        assert_eq!(executor.catalog_reads(), 1);
    }

    #[tokio::test]
    async fn test_get_table_is_exact() {
        let executor = Arc::new(RecordingExecutor::shop());
        let inspector = inspector(&executor);

        let err = inspector.get_table("user").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");
        assert_eq!(
            err.available().unwrap(),
            ["orders".to_string(), "users".to_string()]
        );
        assert!(inspector.get_table("Users").await.is_err());
    }

    #[tokio::test]
    async fn test_broken_view_is_skipped() {
        let mut catalog = crate::testing::shop_catalog();
        catalog.push(catalog_row("stale_orders", "x", "", true, false));
        let executor = Arc::new(
            RecordingExecutor::new(common::models::connection::DbType::SQLite, catalog)
                .with_broken_view("stale_orders"),
        );
        let inspector = inspector(&executor);

        let snapshot = inspector.snapshot().await.unwrap();
        assert_eq!(snapshot.table_names(), vec!["orders", "users"]);
        assert_eq!(inspector.generation(), 1);
    }

    #[tokio::test]
    async fn test_broken_table_still_fails_discovery() {
        let executor = Arc::new(
            RecordingExecutor::new(
                common::models::connection::DbType::SQLite,
                crate::testing::shop_catalog(),
            )
            .with_broken_table("users"),
        );
        let err = inspector(&executor).snapshot().await.unwrap_err();
        assert_eq!(err.code(), "QUERY_ERROR");
    }

    #[tokio::test]
    async fn test_empty_catalog_lists_nothing() {
        let executor = Arc::new(RecordingExecutor::new(
            common::models::connection::DbType::SQLite,
            Vec::new(),
        ));
        let inspector = inspector(&executor);
        assert!(inspector.list_tables().await.unwrap().is_empty());
        let err = inspector.get_table("users").await.unwrap_err();
        assert_eq!(err.available().unwrap().len(), 0);
    }

    #[tokio::test]
    async fn test_record_count_unknown_table_runs_no_count() {
        let executor = Arc::new(RecordingExecutor::shop().with_count(3));
        let inspector = inspector(&executor);

        assert_eq!(inspector.record_count("users").await.unwrap(), 3);
        let err = inspector.record_count("ghosts").await.unwrap_err();
        assert_eq!(err.code(), "NOT_FOUND");

        let counts = executor
            .executed()
            .iter()
            .filter(|s| s.sql.starts_with("SELECT COUNT(*)"))
            .count();
        assert_eq!(counts, 1);
    }

    #[tokio::test]
    async fn test_concurrent_refreshes_coalesce() {
        let executor = Arc::new(RecordingExecutor::shop().with_delay(Duration::from_millis(50)));
        let inspector = inspector(&executor);

        let (a, b, c) = tokio::join!(inspector.refresh(), inspector.refresh(), inspector.refresh());
        let (a, b, c) = (a.unwrap(), b.unwrap(), c.unwrap());

        assert_eq!(executor.catalog_reads(), 1);
        assert!(Arc::ptr_eq(&a, &b) && Arc::ptr_eq(&b, &c));
        assert_eq!(inspector.generation(), 1);
    }

    #[tokio::test]
    async fn test_refresh_picks_up_new_tables() {
        let executor = Arc::new(RecordingExecutor::shop());
        let inspector = inspector(&executor);
        let before = inspector.snapshot().await.unwrap();
        assert!(before.get("invoices").is_none());

        let mut catalog = crate::testing::shop_catalog();
        catalog.push(catalog_row("invoices", "id", "integer", false, true));
        executor.set_catalog(catalog);

        let after = inspector.refresh().await.unwrap();
        assert!(after.get("invoices").is_some());
        assert!(inspector.get_table("invoices").await.is_ok());
        // the old snapshot is untouched
        assert!(before.get("invoices").is_none());
        assert_eq!(inspector.generation(), 2);
    }
}
