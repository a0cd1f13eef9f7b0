//! HTTP 服务（axum）：POST /chat、POST /chat/{threadId}、GET /chat/{threadId}、健康检查

pub mod error;
pub mod handlers;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::core::SessionManager;

pub use error::{ApiError, ApiResult, INTERNAL_SERVER_ERROR};
pub use handlers::{AppState, ChatRequest, ChatResponse, HistoryResponse, StartChatResponse};

/// 构建路由；聊天组件由浏览器跨域调用，CORS 全放开
pub fn router(sessions: Arc<SessionManager>) -> Router {
    let state = AppState { sessions };
    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/api/health", get(handlers::health_handler))
        .route("/chat", post(handlers::start_chat_handler))
        .route(
            "/chat/:thread_id",
            post(handlers::resume_chat_handler).get(handlers::history_handler),
        )
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
