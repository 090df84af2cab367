//! 路由模块

use axum::{
    routing::{get, post},
    Router,
};

use crate::handlers;
use crate::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/tables", get(handlers::list_tables))
        .route("/api/tables/{name}", get(handlers::get_table))
        .route("/api/query", post(handlers::query_table))
        .route("/api/search", post(handlers::search_records))
        .route("/api/record", post(handlers::get_record))
        .route("/api/count/{name}", get(handlers::count_records))
        .route("/api/schema/refresh", post(handlers::refresh_schema))
        .route("/api/actions", post(handlers::handle_action))
        .route("/api/health", get(handlers::health_check))
}
