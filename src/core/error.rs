//! Agent 错误类型与对外错误分类
//!
//! AgentError 是图执行 / 会话管理内部的错误；ChatError 是 HTTP 层看到的三类结果，
//! 由 `From<AgentError>` 统一归类：限流 -> ServiceUnavailable，鉴权 -> AuthenticationFailed，其余 -> AgentFailed。

use thiserror::Error;

use crate::catalog::CatalogError;
use crate::llm::LlmError;
use crate::memory::PersistenceError;

/// Agent 运行过程中可能出现的错误
#[derive(Error, Debug)]
pub enum AgentError {
    #[error(transparent)]
    Llm(#[from] LlmError),

    /// 步数达到上限仍未得到最终回复
    #[error("Recursion limit of {limit} reached without a final answer")]
    RecursionLimitExceeded { limit: usize },

    #[error("Persistence error: {0}")]
    Persistence(#[from] PersistenceError),

    /// 商品库初始化失败（检索期间的错误由工具自行转为结果，不会走到这里）
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Config error: {0}")]
    ConfigError(String),
}

pub const RATE_LIMITED_MESSAGE: &str =
    "Service Temporarily unavailable due to rate limits. Please try again.";
pub const AUTH_FAILED_MESSAGE: &str =
    "Authentication Failed. Please check your API configuration.";

/// 对话请求失败的分类
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("{}", RATE_LIMITED_MESSAGE)]
    ServiceUnavailable,

    #[error("{}", AUTH_FAILED_MESSAGE)]
    AuthenticationFailed,

    #[error("Agent Failed: {0}")]
    AgentFailed(String),
}

impl From<AgentError> for ChatError {
    fn from(e: AgentError) -> Self {
        match e {
            AgentError::Llm(LlmError::RateLimited { .. })
            | AgentError::Llm(LlmError::RetriesExhausted { .. }) => ChatError::ServiceUnavailable,
            AgentError::Llm(LlmError::Unauthorized(_)) => ChatError::AuthenticationFailed,
            other => ChatError::AgentFailed(other.to_string()),
        }
    }
}
