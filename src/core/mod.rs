//! 核心编排层：错误分类、限流重试、会话管理

pub mod error;
pub mod retry;
pub mod session;

pub use error::{AgentError, ChatError, AUTH_FAILED_MESSAGE, RATE_LIMITED_MESSAGE};
pub use retry::{retry_with_backoff, RetryConfig};
pub use session::{ChatReply, SessionManager};
