//! 只读数据查询服务
//!
//! 对外提供：
//! - 数据表列表与表结构
//! - 分页查询、条件搜索、按 ID 取记录、行数统计
//! - 对话意图执行（结构化结果）

mod handlers;
mod routes;
mod state;

use anyhow::Context;
use axum::{middleware, routing::get, Json, Router};
use common::config::{load_dotenv, AppConfig};
use common::middleware::request_id::request_id_middleware;
use query_core::PoolManager;
use state::AppState;
use tokio::net::TcpListener;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use utoipa::OpenApi;

pub(crate) const SERVICE_NAME: &str = "query-service";

#[derive(OpenApi)]
#[openapi(
    info(
        title = "数据查询服务 API",
        version = "0.1.0",
        description = "基于模式快照的只读关系型数据查询服务"
    ),
    paths(
        handlers::list_tables,
        handlers::get_table,
        handlers::query_table,
        handlers::search_records,
        handlers::get_record,
        handlers::count_records,
        handlers::refresh_schema,
        handlers::handle_action,
        handlers::health_check,
    ),
    components(schemas(
        common::models::TableQueryRequest,
        common::models::SearchRequest,
        common::models::RecordRequest,
        common::models::RecordsResponse,
        common::models::SearchResponse,
        common::models::RecordResponse,
        common::models::CountResponse,
        common::models::TablesResponse,
        common::models::TableInfo,
        common::models::ColumnDescriptor,
        common::models::ForeignKey,
        common::models::TypeCategory,
        common::models::Operator,
        common::models::Record,
        query_core::ActionRequest,
        query_core::DialogueOutcome,
        query_core::RefreshSummary,
        query_core::PoolStats,
        handlers::HealthResponse,
    )),
    tags(
        (name = "schema", description = "结构发现端点"),
        (name = "query", description = "数据查询端点"),
        (name = "dialogue", description = "对话意图端点"),
        (name = "health", description = "健康检查端点")
    )
)]
struct ApiDoc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    // 初始化日志追踪
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    // 加载配置
    let config = AppConfig::load_with_service(SERVICE_NAME).context("加载配置失败")?;

    // 建立连接池
    let pool = PoolManager::connect(&config.database, &config.pool)
        .await
        .with_context(|| format!("无法连接数据库 {}", config.database.describe()))?;

    // 创建应用状态，预热结构快照
    let state = AppState::new(config.clone(), pool);
    match state.service.inspector().snapshot().await {
        Ok(snapshot) => info!(tables = snapshot.len(), "结构快照已加载"),
        Err(err) => tracing::warn!(code = err.code(), "结构快照加载失败，将在首次请求时重试"),
    }
    let pool = state.pool.clone();

    // 创建路由
    let app = create_router(state);

    // 启动服务
    let addr = format!("{}:{}", config.host, config.port);
    info!(service = SERVICE_NAME, address = %addr, "启动服务");

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("绑定地址失败: {}", addr))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("服务运行失败")?;

    pool.close().await;
    info!(service = SERVICE_NAME, "服务已停止");
    Ok(())
}

pub(crate) fn create_router(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .merge(routes::router())
        .route("/api-docs/openapi.json", get(openapi_json))
        .layer(middleware::from_fn(request_id_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(ApiDoc::openapi())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "无法监听关闭信号");
        std::future::pending::<()>().await;
    }
    info!("收到关闭信号");
}
