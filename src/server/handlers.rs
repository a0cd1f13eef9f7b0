//! 路由处理函数

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::core::{AgentError, ChatError, SessionManager};
use crate::memory::{validate_thread_id, Message};
use crate::server::error::{ApiError, ApiResult};

#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionManager>,
}

/// 请求体：message 可以是字符串，也可以是数组（取第一个元素）
#[derive(Debug, Default, Deserialize)]
pub struct ChatRequest {
    #[serde(default)]
    pub message: Option<Value>,
}

impl ChatRequest {
    pub fn message_text(&self) -> Option<String> {
        fn text(v: &Value) -> Option<String> {
            match v {
                Value::Null => None,
                Value::String(s) => Some(s.clone()),
                Value::Array(items) => items.first().and_then(text),
                other => Some(other.to_string()),
            }
        }
        self.message
            .as_ref()
            .and_then(text)
            .filter(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartChatResponse {
    pub thread_id: String,
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ChatResponse {
    pub response: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryResponse {
    pub thread_id: String,
    pub messages: Vec<Message>,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

fn require_message(req: &ChatRequest) -> ApiResult<String> {
    req.message_text()
        .ok_or_else(|| ApiError::BadRequest("message is required".to_string()))
}

fn check_thread_id(thread_id: &str) -> ApiResult<()> {
    validate_thread_id(thread_id).map_err(|e| ApiError::BadRequest(e.to_string()))
}

fn chat_failure(e: AgentError) -> ApiError {
    match e {
        AgentError::InvalidInput(msg) => ApiError::BadRequest(msg),
        other => ApiError::Chat(ChatError::from(other)),
    }
}

/// GET /
pub async fn index_handler() -> &'static str {
    "LangGraph Agent Server"
}

/// GET /api/health
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// POST /chat - 开始新对话
pub async fn start_chat_handler(
    State(state): State<AppState>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<StartChatResponse>> {
    let message = require_message(&req)?;
    tracing::info!(message = %message, "starting conversation");
    let reply = state
        .sessions
        .resume(None, &message)
        .await
        .map_err(chat_failure)?;
    Ok(Json(StartChatResponse {
        thread_id: reply.thread_id,
        response: reply.answer,
    }))
}

/// POST /chat/{threadId} - 继续已有对话
pub async fn resume_chat_handler(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
    Json(req): Json<ChatRequest>,
) -> ApiResult<Json<ChatResponse>> {
    check_thread_id(&thread_id)?;
    let message = require_message(&req)?;
    tracing::info!(thread_id = %thread_id, "resuming conversation");
    let reply = state
        .sessions
        .resume(Some(&thread_id), &message)
        .await
        .map_err(chat_failure)?;
    Ok(Json(ChatResponse {
        response: reply.answer,
    }))
}

/// GET /chat/{threadId} - 读取已保存的对话
pub async fn history_handler(
    State(state): State<AppState>,
    Path(thread_id): Path<String>,
) -> ApiResult<Json<HistoryResponse>> {
    check_thread_id(&thread_id)?;
    let conversation = state
        .sessions
        .history(&thread_id)
        .await
        .map_err(chat_failure)?
        .ok_or_else(|| ApiError::NotFound(format!("thread {thread_id} not found")))?;
    Ok(Json(HistoryResponse {
        thread_id,
        messages: conversation.into_messages(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn req(v: Value) -> ChatRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn test_message_shapes() {
        assert_eq!(
            req(serde_json::json!({"message": "sofa"})).message_text().as_deref(),
            Some("sofa")
        );
        assert_eq!(
            req(serde_json::json!({"message": ["first", "second"]}))
                .message_text()
                .as_deref(),
            Some("first")
        );
        assert_eq!(
            req(serde_json::json!({"message": 42})).message_text().as_deref(),
            Some("42")
        );
        assert!(req(serde_json::json!({})).message_text().is_none());
        assert!(req(serde_json::json!({"message": []})).message_text().is_none());
        assert!(req(serde_json::json!({"message": "  "})).message_text().is_none());
    }
}
