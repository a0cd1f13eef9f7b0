//! 离线 LLM 客户端
//!
//! - MockLlmClient：无需 API，收到用户消息就调用 item_lookup，收到工具结果就据此作答，
//!   便于本地跑通整条 reasoning -> tool_execution -> reasoning 流程。
//! - ScriptedLlmClient：按队列依次返回预设结果并记录每次调用，用于测试。

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role, ToolCallIntent};
use crate::tools::{ToolSpec, EMPTY_INVENTORY_ERROR, ITEM_LOOKUP};

/// Mock 客户端：用最后一条用户消息检索，再把结果念给用户
#[derive(Debug, Default)]
pub struct MockLlmClient {
    calls: AtomicU64,
}

impl MockLlmClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LlmClient for MockLlmClient {
    async fn invoke(
        &self,
        _system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, LlmError> {
        let n = self.calls.fetch_add(1, Ordering::Relaxed);
        let last = history
            .last()
            .ok_or_else(|| LlmError::InvalidResponse("empty history".to_string()))?;

        match last.role {
            Role::User if tools.iter().any(|t| t.name == ITEM_LOOKUP) => {
                Ok(Message::assistant_with_tools(
                    "",
                    vec![ToolCallIntent::new(
                        format!("mock_call_{n}"),
                        ITEM_LOOKUP,
                        serde_json::json!({ "query": last.content, "n": 5 }),
                    )],
                ))
            }
            Role::Tool => Ok(Message::assistant(summarize_tool_result(&last.content))),
            _ => Ok(Message::assistant(format!("Mock reply: {}", last.content))),
        }
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

fn summarize_tool_result(payload: &str) -> String {
    let Ok(value) = serde_json::from_str::<Value>(payload) else {
        return "I could not read the inventory results.".to_string();
    };
    match value.get("error").and_then(Value::as_str) {
        Some(EMPTY_INVENTORY_ERROR) => {
            return "Our inventory appears to be empty right now; it might be being updated. \
                    Please check back soon."
                .to_string()
        }
        Some(error) => return format!("Sorry, I could not search the inventory: {error}."),
        None => {}
    }
    let names: Vec<&str> = value
        .get("results")
        .and_then(Value::as_array)
        .map(|r| {
            r.iter()
                .filter_map(|hit| hit.get("item_name").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if names.is_empty() {
        "I could not find any matching items in our inventory.".to_string()
    } else {
        format!("Here is what I found: {}.", names.join(", "))
    }
}

/// 一次被记录的调用
#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub system_prompt: String,
    pub history: Vec<Message>,
    pub tool_names: Vec<String>,
}

/// 预设响应客户端：队列耗尽后重复 fallback（若设置），否则返回 InvalidResponse
#[derive(Default)]
pub struct ScriptedLlmClient {
    responses: Mutex<VecDeque<Result<Message, LlmError>>>,
    fallback: Option<Message>,
    calls: Mutex<Vec<RecordedCall>>,
}

impl ScriptedLlmClient {
    pub fn new(responses: Vec<Result<Message, LlmError>>) -> Self {
        Self {
            responses: Mutex::new(responses.into()),
            ..Self::default()
        }
    }

    /// 永远返回同一条消息（例如一直要求调用工具的模型）
    pub fn always(message: Message) -> Self {
        Self {
            fallback: Some(message),
            ..Self::default()
        }
    }

    pub fn push(&self, response: Result<Message, LlmError>) {
        if let Ok(mut q) = self.responses.lock() {
            q.push_back(response);
        }
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().map(|c| c.len()).unwrap_or_default()
    }
}

#[async_trait]
impl LlmClient for ScriptedLlmClient {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, LlmError> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(RecordedCall {
                system_prompt: system_prompt.to_string(),
                history: history.to_vec(),
                tool_names: tools.iter().map(|t| t.name.clone()).collect(),
            });
        }
        let next = self.responses.lock().ok().and_then(|mut q| q.pop_front());
        match (next, &self.fallback) {
            (Some(response), _) => response,
            (None, Some(fallback)) => Ok(fallback.clone()),
            (None, None) => Err(LlmError::InvalidResponse(
                "scripted responses exhausted".to_string(),
            )),
        }
    }

    fn model_name(&self) -> &str {
        "scripted"
    }
}
