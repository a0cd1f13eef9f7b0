//! LLM 客户端抽象
//!
//! 所有后端（OpenAI 兼容 / Gemini / Mock / Scripted）实现 LlmClient：
//! 输入 system prompt + 历史消息 + 可用工具，输出一条 assistant 消息（可能带 tool call intents）。
//! 失败统一为 LlmError，其中 RateLimited 是重试策略唯一会重试的类型。

use async_trait::async_trait;
use thiserror::Error;

use crate::memory::Message;
use crate::tools::ToolSpec;

/// LLM 调用错误
#[derive(Error, Debug)]
pub enum LlmError {
    /// HTTP 429 / 配额耗尽
    #[error("Rate limited by provider")]
    RateLimited { retry_after_ms: Option<u64> },

    /// HTTP 401 / 403、API Key 无效
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// 重试策略在仍被限流时用尽次数
    #[error("Max retries exceeded after {attempts} attempts")]
    RetriesExhausted { attempts: u32 },

    #[error("API error: {0}")]
    ApiError(String),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl LlmError {
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, LlmError::RateLimited { .. })
    }

    /// 按 HTTP 状态码（若有）与错误文本归类 provider 错误
    pub fn classify(status: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        match status {
            Some(429) => return LlmError::RateLimited { retry_after_ms: None },
            Some(401) | Some(403) => return LlmError::Unauthorized(message),
            _ => {}
        }
        if lower.contains("429")
            || lower.contains("too many requests")
            || lower.contains("rate limit")
            || lower.contains("rate_limit")
            || lower.contains("resource_exhausted")
            || lower.contains("quota")
        {
            LlmError::RateLimited { retry_after_ms: None }
        } else if lower.contains("401")
            || lower.contains("unauthorized")
            || lower.contains("invalid_api_key")
            || lower.contains("incorrect api key")
            || lower.contains("api key not valid")
            || lower.contains("permission_denied")
        {
            LlmError::Unauthorized(message)
        } else if lower.contains("timed out")
            || lower.contains("connection")
            || lower.contains("dns")
        {
            LlmError::Network(message)
        } else {
            LlmError::ApiError(message)
        }
    }
}

/// LLM 客户端 trait：一次推理调用
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// system_prompt 每次调用注入，不进入对话历史
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, LlmError>;

    /// 模型名（日志用）
    fn model_name(&self) -> &str {
        "unknown"
    }

    /// 获取累计 token 使用统计：(prompt_tokens, completion_tokens, total_tokens)
    /// 默认返回 (0, 0, 0)，具体实现可覆盖
    fn token_usage(&self) -> (u64, u64, u64) {
        (0, 0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_status() {
        assert!(LlmError::classify(Some(429), "slow down").is_rate_limited());
        assert!(matches!(
            LlmError::classify(Some(401), "bad key"),
            LlmError::Unauthorized(_)
        ));
    }

    #[test]
    fn test_classify_by_message() {
        assert!(LlmError::classify(None, "Resource_Exhausted: quota exceeded").is_rate_limited());
        assert!(matches!(
            LlmError::classify(None, "Incorrect API key provided"),
            LlmError::Unauthorized(_)
        ));
        assert!(matches!(
            LlmError::classify(None, "model not found"),
            LlmError::ApiError(_)
        ));
    }
}
