//! Handler模块

use std::time::Instant;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use utoipa::ToSchema;
use validator::Validate;

use common::errors::AppError;
use common::models::connection::DbType;
use common::models::query::{
    CountResponse, RecordRequest, RecordResponse, RecordsResponse, SearchRequest, SearchResponse,
    TableQueryRequest,
};
use common::models::schema::{TableInfo, TablesResponse};
use common::response::ApiResponse;
use query_core::{ActionRequest, DialogueOutcome, PoolStats, RefreshSummary};

use crate::state::AppState;
use crate::SERVICE_NAME;

fn respond<T: Serialize>(data: T, started: Instant) -> Json<ApiResponse<T>> {
    Json(
        ApiResponse::ok_with_service(data, SERVICE_NAME)
            .with_duration(started.elapsed().as_millis() as u64),
    )
}

/// 列出所有数据表
#[utoipa::path(
    get,
    path = "/api/tables",
    tag = "schema",
    responses(
        (status = 200, description = "数据表列表（含行数）", body = ApiResponse<TablesResponse>),
        (status = 503, description = "数据库不可用")
    )
)]
pub async fn list_tables(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<TablesResponse>>, AppError> {
    let started = Instant::now();
    let tables = state.service.list_tables().await?;
    Ok(respond(tables, started))
}

/// 获取单个数据表结构
#[utoipa::path(
    get,
    path = "/api/tables/{name}",
    tag = "schema",
    params(("name" = String, Path, description = "表名（区分大小写）")),
    responses(
        (status = 200, description = "表结构与行数", body = ApiResponse<TableInfo>),
        (status = 404, description = "表不存在")
    )
)]
pub async fn get_table(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<TableInfo>>, AppError> {
    let started = Instant::now();
    let info = state.service.describe_table(&name).await?;
    Ok(respond(info, started))
}

/// 查询表数据
#[utoipa::path(
    post,
    path = "/api/query",
    tag = "query",
    request_body = TableQueryRequest,
    responses(
        (status = 200, description = "查询成功", body = ApiResponse<RecordsResponse>),
        (status = 400, description = "未知表或 limit 无效")
    )
)]
pub async fn query_table(
    State(state): State<AppState>,
    Json(req): Json<TableQueryRequest>,
) -> Result<Json<ApiResponse<RecordsResponse>>, AppError> {
    req.validate()?;
    let started = Instant::now();
    let records = state.service.select(&req.table_name, req.limit).await?;
    Ok(respond(records, started))
}

/// 按条件搜索记录
#[utoipa::path(
    post,
    path = "/api/search",
    tag = "query",
    request_body = SearchRequest,
    responses(
        (status = 200, description = "搜索成功", body = ApiResponse<SearchResponse>),
        (status = 400, description = "未知表/列、非法操作符或取值")
    )
)]
pub async fn search_records(
    State(state): State<AppState>,
    Json(req): Json<SearchRequest>,
) -> Result<Json<ApiResponse<SearchResponse>>, AppError> {
    req.validate()?;
    let started = Instant::now();
    let found = state
        .service
        .search(
            &req.table_name,
            &req.column_name,
            &req.search_value,
            &req.operator,
            req.limit,
        )
        .await?;
    Ok(respond(found, started))
}

/// 按 ID 获取单条记录
#[utoipa::path(
    post,
    path = "/api/record",
    tag = "query",
    request_body = RecordRequest,
    responses(
        (status = 200, description = "记录", body = ApiResponse<RecordResponse>),
        (status = 400, description = "未知表或列"),
        (status = 404, description = "记录不存在")
    )
)]
pub async fn get_record(
    State(state): State<AppState>,
    Json(req): Json<RecordRequest>,
) -> Result<Json<ApiResponse<RecordResponse>>, AppError> {
    req.validate()?;
    let started = Instant::now();
    let record = state
        .service
        .get_by_id(&req.table_name, req.id_column.as_deref(), &req.record_id)
        .await?;
    Ok(respond(record, started))
}

/// 统计表行数
#[utoipa::path(
    get,
    path = "/api/count/{name}",
    tag = "query",
    params(("name" = String, Path, description = "表名（区分大小写）")),
    responses(
        (status = 200, description = "行数", body = ApiResponse<CountResponse>),
        (status = 404, description = "表不存在")
    )
)]
pub async fn count_records(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ApiResponse<CountResponse>>, AppError> {
    let started = Instant::now();
    let count = state.service.count(&name).await?;
    Ok(respond(count, started))
}

/// 重新发现数据库结构
#[utoipa::path(
    post,
    path = "/api/schema/refresh",
    tag = "schema",
    responses(
        (status = 200, description = "结构快照已更新", body = ApiResponse<RefreshSummary>)
    )
)]
pub async fn refresh_schema(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<RefreshSummary>>, AppError> {
    let started = Instant::now();
    let summary = state.service.refresh_schema().await?;
    Ok(respond(summary, started))
}

/// 对话意图执行
#[utoipa::path(
    post,
    path = "/api/actions",
    tag = "dialogue",
    request_body = ActionRequest,
    responses(
        (status = 200, description = "结构化执行结果", body = ApiResponse<DialogueOutcome>)
    )
)]
pub async fn handle_action(
    State(state): State<AppState>,
    Json(req): Json<ActionRequest>,
) -> Json<ApiResponse<DialogueOutcome>> {
    let started = Instant::now();
    let outcome = state.dialogue.handle(req).await;
    respond(outcome, started)
}

/// 健康检查端点
#[utoipa::path(
    get,
    path = "/api/health",
    tag = "health",
    responses(
        (status = 200, description = "服务运行正常", body = HealthResponse),
        (status = 503, description = "数据库不可达", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let (status, latency_ms) = match state.pool.ping().await {
        Ok(latency) => (StatusCode::OK, Some(latency.as_millis() as u64)),
        Err(err) => {
            tracing::warn!(code = err.code(), detail = err.detail().unwrap_or_default(), "健康检查失败");
            (StatusCode::SERVICE_UNAVAILABLE, None)
        }
    };

    let body = HealthResponse {
        status: if status.is_success() { "healthy" } else { "unhealthy" }.to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        database: state.pool.db_type(),
        latency_ms,
        pool: state.pool.stats(),
        schema_generation: state.service.inspector().generation(),
    };
    (status, Json(body))
}

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub service: String,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub database: DbType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    pub pool: PoolStats,
    pub schema_generation: u64,
}
