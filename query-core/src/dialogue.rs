//! Dialogue adapter.
//!
//! Maps a resolved conversational intent and its slots onto the data service
//! and returns a structured outcome. Rendering text for the user is left to
//! the caller.

use std::sync::Arc;

use common::errors::AppError;
use common::models::query::Record;
use common::models::schema::TableDescriptor;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::service::DataService;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    QueryDatabase,
    GetTableInfo,
    SearchRecords,
    CountRecords,
    GetSpecificRecord,
}

/// Slot values extracted from the conversation. All optional; each intent
/// checks the ones it needs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct Slots {
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub column_name: Option<String>,
    #[serde(default)]
    pub search_value: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub limit: Option<i64>,
}

/// Request body for `POST /api/actions`.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct ActionRequest {
    pub intent: Intent,
    #[serde(default)]
    pub slots: Slots,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct TableSummary {
    pub name: String,
    pub columns: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub related_tables: Vec<String>,
}

#[derive(Debug, Clone, Serialize, PartialEq, ToSchema)]
pub struct OutcomeError {
    pub code: String,
    pub message: String,
}

/// Structured result of one intent.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct DialogueOutcome {
    pub success: bool,
    pub intent: Intent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record_count: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub records: Vec<Record>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub tables: Vec<TableSummary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_tables: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub available_columns: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub missing_slots: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<OutcomeError>,
}

impl DialogueOutcome {
    fn ok(intent: Intent) -> Self {
        Self {
            success: true,
            intent,
            table: None,
            record_count: None,
            records: Vec::new(),
            tables: Vec::new(),
            available_tables: None,
            available_columns: None,
            missing_slots: Vec::new(),
            error: None,
        }
    }

    fn failed(intent: Intent, err: &AppError) -> Self {
        Self {
            success: false,
            available_tables: err.available().map(<[String]>::to_vec),
            error: Some(OutcomeError {
                code: err.code().to_string(),
                message: err.to_string(),
            }),
            ..Self::ok(intent)
        }
    }

    fn missing(intent: Intent, slots: Vec<&str>) -> Self {
        Self {
            success: false,
            missing_slots: slots.into_iter().map(String::from).collect(),
            error: Some(OutcomeError {
                code: "MISSING_SLOT".to_string(),
                message: "required slots are missing".to_string(),
            }),
            ..Self::ok(intent)
        }
    }

    fn with_table(mut self, table: &str) -> Self {
        self.table = Some(table.to_string());
        self
    }
}

pub struct DialogueAdapter {
    service: Arc<DataService>,
}

impl DialogueAdapter {
    pub fn new(service: Arc<DataService>) -> Self {
        Self { service }
    }

    pub async fn handle(&self, request: ActionRequest) -> DialogueOutcome {
        let intent = request.intent;
        let slots = request.slots;
        tracing::info!(?intent, table = ?slots.table_name, "handling dialogue intent");

        let outcome = match intent {
            Intent::QueryDatabase => self.query_database(&slots).await,
            Intent::GetTableInfo => self.table_info(&slots).await,
            Intent::SearchRecords => self.search_records(&slots).await,
            Intent::CountRecords => self.count_records(&slots).await,
            Intent::GetSpecificRecord => self.specific_record(&slots).await,
        };

        match outcome {
            Ok(outcome) => outcome,
            Err(err) => {
                if let Some(detail) = err.detail() {
                    tracing::warn!(?intent, code = err.code(), detail, "dialogue intent failed");
                }
                let table = slots.table_name.as_deref().unwrap_or_default();
                let failed = DialogueOutcome::failed(intent, &err);
                if table.is_empty() {
                    failed
                } else {
                    failed.with_table(table)
                }
            }
        }
    }

    async fn table(&self, name: &str) -> Result<Arc<TableDescriptor>, AppError> {
        self.service.inspector().get_table(name).await
    }

    async fn query_database(&self, slots: &Slots) -> Result<DialogueOutcome, AppError> {
        let Some(table) = present(&slots.table_name) else {
            return Ok(DialogueOutcome::missing(Intent::QueryDatabase, vec!["table_name"]));
        };
        self.table(table).await?;
        let resp = self.service.select(table, slots.limit).await?;
        Ok(DialogueOutcome {
            record_count: Some(resp.count as i64),
            records: resp.records,
            ..DialogueOutcome::ok(Intent::QueryDatabase).with_table(table)
        })
    }

    /// Lists every table with its columns, or one table with its row count.
    async fn table_info(&self, slots: &Slots) -> Result<DialogueOutcome, AppError> {
        if let Some(table) = present(&slots.table_name) {
            let info = self.service.describe_table(table).await?;
            let related_tables = self.service.inspector().related_tables(&info.name).await?;
            return Ok(DialogueOutcome {
                record_count: Some(info.record_count),
                tables: vec![TableSummary {
                    name: info.name,
                    columns: info.columns.into_iter().map(|c| c.name).collect(),
                    record_count: Some(info.record_count),
                    related_tables,
                }],
                ..DialogueOutcome::ok(Intent::GetTableInfo).with_table(table)
            });
        }

        let tables = self
            .service
            .inspector()
            .list_tables()
            .await?
            .iter()
            .map(|t| TableSummary {
                name: t.name.clone(),
                columns: t.column_names(),
                record_count: None,
                related_tables: Vec::new(),
            })
            .collect();
        Ok(DialogueOutcome {
            tables,
            ..DialogueOutcome::ok(Intent::GetTableInfo)
        })
    }

    async fn search_records(&self, slots: &Slots) -> Result<DialogueOutcome, AppError> {
        let table = present(&slots.table_name);
        let column = present(&slots.column_name);
        let value = present(&slots.search_value);
        let (Some(table), Some(column), Some(value)) = (table, column, value) else {
            let mut missing = Vec::new();
            if table.is_none() {
                missing.push("table_name");
            }
            if column.is_none() {
                missing.push("column_name");
            }
            if value.is_none() {
                missing.push("search_value");
            }
            return Ok(DialogueOutcome::missing(Intent::SearchRecords, missing));
        };

        let descriptor = self.table(table).await?;
        if descriptor.column(column).is_none() {
            let err = AppError::validation(format!(
                "unknown column '{}' in table '{}'",
                column, table
            ));
            return Ok(DialogueOutcome {
                available_columns: Some(descriptor.column_names()),
                ..DialogueOutcome::failed(Intent::SearchRecords, &err).with_table(table)
            });
        }

        let operator = slots.operator.as_deref().unwrap_or("LIKE");
        let resp = self
            .service
            .search(table, column, value, operator, slots.limit)
            .await?;
        Ok(DialogueOutcome {
            record_count: Some(resp.count as i64),
            records: resp.records,
            ..DialogueOutcome::ok(Intent::SearchRecords).with_table(table)
        })
    }

    /// Counts one table, or every table when no table slot is set.
    async fn count_records(&self, slots: &Slots) -> Result<DialogueOutcome, AppError> {
        if let Some(table) = present(&slots.table_name) {
            let resp = self.service.count(table).await?;
            return Ok(DialogueOutcome {
                record_count: Some(resp.count),
                ..DialogueOutcome::ok(Intent::CountRecords).with_table(table)
            });
        }

        let mut tables = Vec::new();
        for table in self.service.inspector().list_tables().await? {
            let count = self.service.inspector().record_count(&table.name).await?;
            tables.push(TableSummary {
                name: table.name.clone(),
                columns: table.column_names(),
                record_count: Some(count),
                related_tables: Vec::new(),
            });
        }
        Ok(DialogueOutcome {
            record_count: Some(tables.iter().filter_map(|t| t.record_count).sum()),
            tables,
            ..DialogueOutcome::ok(Intent::CountRecords)
        })
    }

    async fn specific_record(&self, slots: &Slots) -> Result<DialogueOutcome, AppError> {
        let table = present(&slots.table_name);
        let record_id = present(&slots.record_id);
        let (Some(table), Some(record_id)) = (table, record_id) else {
            let mut missing = Vec::new();
            if table.is_none() {
                missing.push("table_name");
            }
            if record_id.is_none() {
                missing.push("record_id");
            }
            return Ok(DialogueOutcome::missing(Intent::GetSpecificRecord, missing));
        };

        self.table(table).await?;
        let resp = self.service.get_by_id(table, None, record_id).await?;
        Ok(DialogueOutcome {
            record_count: Some(1),
            records: vec![resp.record],
            ..DialogueOutcome::ok(Intent::GetSpecificRecord).with_table(table)
        })
    }
}

fn present(slot: &Option<String>) -> Option<&str> {
    slot.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::StatementExecutor;
    use crate::testing::{user_row, RecordingExecutor};
    use common::config::QueryLimits;

    fn adapter(executor: &Arc<RecordingExecutor>) -> DialogueAdapter {
        DialogueAdapter::new(Arc::new(DataService::new(
            executor.clone() as Arc<dyn StatementExecutor>,
            QueryLimits::default(),
        )))
    }

    fn request(intent: Intent, slots: Slots) -> ActionRequest {
        ActionRequest { intent, slots }
    }

    #[tokio::test]
    async fn test_unknown_table_offers_available_tables() {
        let executor = Arc::new(RecordingExecutor::shop());
        let outcome = adapter(&executor)
            .handle(request(
                Intent::QueryDatabase,
                Slots {
                    table_name: Some("user".into()),
                    ..Slots::default()
                },
            ))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "NOT_FOUND");
        assert_eq!(
            outcome.available_tables.unwrap(),
            vec!["orders".to_string(), "users".to_string()]
        );
        assert_eq!(executor.data_statements(), 0);
    }

    #[tokio::test]
    async fn test_missing_slots_are_reported() {
        let executor = Arc::new(RecordingExecutor::shop());
        let outcome = adapter(&executor)
            .handle(request(
                Intent::SearchRecords,
                Slots {
                    table_name: Some("users".into()),
                    ..Slots::default()
                },
            ))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.missing_slots, vec!["column_name", "search_value"]);
        assert!(executor.executed().is_empty());
    }

    #[tokio::test]
    async fn test_search_unknown_column_offers_columns() {
        let executor = Arc::new(RecordingExecutor::shop());
        let outcome = adapter(&executor)
            .handle(request(
                Intent::SearchRecords,
                Slots {
                    table_name: Some("users".into()),
                    column_name: Some("nickname".into()),
                    search_value: Some("jo".into()),
                    ..Slots::default()
                },
            ))
            .await;

        assert!(!outcome.success);
        assert_eq!(outcome.error.unwrap().code, "VALIDATION_ERROR");
        assert!(outcome.available_columns.unwrap().contains(&"email".to_string()));
    }

    #[tokio::test]
    async fn test_count_without_table_counts_everything() {
        let executor = Arc::new(RecordingExecutor::shop().with_count(2));
        let outcome = adapter(&executor)
            .handle(request(Intent::CountRecords, Slots::default()))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.tables.len(), 2);
        assert_eq!(outcome.record_count, Some(4));
    }

    #[tokio::test]
    async fn test_specific_record_found() {
        let executor = Arc::new(
            RecordingExecutor::shop().with_rows(vec![user_row(1, "John Doe", "john@example.com")]),
        );
        let outcome = adapter(&executor)
            .handle(request(
                Intent::GetSpecificRecord,
                Slots {
                    table_name: Some("users".into()),
                    record_id: Some("1".into()),
                    ..Slots::default()
                },
            ))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.table.as_deref(), Some("users"));
        assert_eq!(outcome.records[0].get("email").unwrap(), "john@example.com");
    }

    #[tokio::test]
    async fn test_table_info_lists_related_tables() {
        let executor = Arc::new(RecordingExecutor::shop().with_count(3));
        let outcome = adapter(&executor)
            .handle(request(
                Intent::GetTableInfo,
                Slots {
                    table_name: Some("users".into()),
                    ..Slots::default()
                },
            ))
            .await;

        assert!(outcome.success);
        assert_eq!(outcome.record_count, Some(3));
        assert_eq!(outcome.tables[0].related_tables, vec!["orders"]);
    }

    #[tokio::test]
    async fn test_outcome_serializes_without_prose() {
        let executor = Arc::new(RecordingExecutor::shop());
        let outcome = adapter(&executor)
            .handle(request(Intent::GetTableInfo, Slots::default()))
            .await;
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["intent"], "get_table_info");
        assert_eq!(json["tables"][1]["name"], "users");
        assert!(json.get("message").is_none());
    }
}
