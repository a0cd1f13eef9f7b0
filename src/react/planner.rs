//! Planner：reasoning 节点
//!
//! 每次调用按模板渲染 system prompt（注入当前时间），带上对话历史与工具描述调用 LLM，
//! 调用整体包在限流重试策略里。

use std::sync::Arc;

use chrono::{SecondsFormat, Utc};

use crate::core::{retry_with_backoff, AgentError, RetryConfig};
use crate::llm::LlmClient;
use crate::memory::Message;
use crate::tools::ToolSpec;

/// 默认 system prompt；`{time}` 在每次推理时替换为当前 UTC 时间
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful E-commerce Chatbot Agent for a furniture store.

IMPORTANT: You have access to an item_lookup tool that searches the furniture inventory database. \
ALWAYS use this tool when customers ask about furniture items, even if the tool returns errors or empty results.

When using the item_lookup tool:
- If it returns results, provide helpful details about the furniture items
- If it returns an error or no results, acknowledge this and offer to help in other ways
- If the database appears to be empty, let the customer know that inventory might be being updated

Current time: {time}";

/// Planner：持有 LLM、prompt 模板与重试配置
pub struct Planner {
    llm: Arc<dyn LlmClient>,
    prompt_template: String,
    retry: RetryConfig,
}

impl Planner {
    pub fn new(llm: Arc<dyn LlmClient>, prompt_template: impl Into<String>, retry: RetryConfig) -> Self {
        Self {
            llm,
            prompt_template: prompt_template.into(),
            retry,
        }
    }

    pub fn model_name(&self) -> &str {
        self.llm.model_name()
    }

    /// 获取 LLM 累计 token 使用统计
    pub fn token_usage(&self) -> (u64, u64, u64) {
        self.llm.token_usage()
    }

    pub fn render_system_prompt(&self) -> String {
        let now = Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true);
        self.prompt_template.replace("{time}", &now)
    }

    /// 一次推理：返回 assistant 消息（最终回复或带工具调用意图）
    pub async fn plan(&self, history: &[Message], tools: &[ToolSpec]) -> Result<Message, AgentError> {
        let system = self.render_system_prompt();
        let llm = self.llm.as_ref();
        let prompt = system.as_str();
        let reply = retry_with_backoff(&self.retry, move || llm.invoke(prompt, history, tools)).await?;
        tracing::debug!(
            model = %self.llm.model_name(),
            tool_calls = reply.tool_calls.len(),
            "model replied"
        );
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{LlmError, ScriptedLlmClient};
    use std::time::Duration;

    #[test]
    fn test_prompt_injects_time() {
        let planner = Planner::new(
            Arc::new(ScriptedLlmClient::default()),
            DEFAULT_SYSTEM_PROMPT,
            RetryConfig::default(),
        );
        let prompt = planner.render_system_prompt();
        assert!(prompt.contains("item_lookup"));
        assert!(!prompt.contains("{time}"));
        assert!(prompt.contains("Current time: 20"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_plan_retries_rate_limit() {
        let llm = Arc::new(ScriptedLlmClient::new(vec![
            Err(LlmError::RateLimited { retry_after_ms: None }),
            Ok(Message::assistant("done")),
        ]));
        let planner = Planner::new(
            llm.clone(),
            "t={time}",
            RetryConfig::new(3, Duration::from_millis(10), Duration::from_millis(100)),
        );
        let reply = planner.plan(&[Message::user("hi")], &[]).await.unwrap();
        assert_eq!(reply.content, "done");
        assert_eq!(llm.call_count(), 2);
        assert!(llm.calls()[0].system_prompt.starts_with("t="));
    }
}
