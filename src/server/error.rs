//! HTTP 错误映射
//!
//! 对话失败一律返回 500 `{"error": "Internal Server Error"}`，并附带分类后的 message；
//! 请求本身不合法时返回 400 / 404。

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;

use crate::core::ChatError;

pub const INTERNAL_SERVER_ERROR: &str = "Internal Server Error";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Chat(#[from] ChatError),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::BadRequest(msg) => {
                tracing::warn!(error = %msg, "Bad request");
                (
                    StatusCode::BAD_REQUEST,
                    ErrorResponse {
                        error: msg,
                        message: None,
                    },
                )
            }
            ApiError::NotFound(msg) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error: msg,
                    message: None,
                },
            ),
            ApiError::Chat(e) => {
                let category = match &e {
                    ChatError::ServiceUnavailable => "rate_limited",
                    ChatError::AuthenticationFailed => "authentication",
                    ChatError::AgentFailed(_) => "agent_failed",
                };
                tracing::error!(category, error = %e, "Chat request failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorResponse {
                        error: INTERNAL_SERVER_ERROR.to_string(),
                        message: Some(e.to_string()),
                    },
                )
            }
        };
        (status, Json(body)).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
