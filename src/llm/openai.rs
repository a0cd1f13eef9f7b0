//! OpenAI 兼容 API 客户端
//!
//! 通过 async_openai 调用任意 OpenAI 兼容端点（可配置 base_url）；Gemini、OpenAI、自建代理都走这里。
//! 请求先按 chat-completions 线格式拼成 JSON，再反序列化为 async_openai 的请求类型，
//! 这样 tool_calls / tool 消息的编码与解析集中在一处。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::types::chat::CreateChatCompletionRequest;
use async_openai::Client;
use async_trait::async_trait;
use backoff::ExponentialBackoff;
use serde_json::{json, Value};

use crate::llm::{LlmClient, LlmError};
use crate::memory::{Message, Role, ToolCallIntent};
use crate::tools::ToolSpec;

/// Token 使用统计（累计值）
#[derive(Debug, Clone, Default)]
pub struct TokenUsage {
    pub prompt_tokens: Arc<AtomicU64>,
    pub completion_tokens: Arc<AtomicU64>,
    pub total_tokens: Arc<AtomicU64>,
}

impl TokenUsage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, prompt: u64, completion: u64) {
        self.prompt_tokens.fetch_add(prompt, Ordering::Relaxed);
        self.completion_tokens.fetch_add(completion, Ordering::Relaxed);
        self.total_tokens.fetch_add(prompt + completion, Ordering::Relaxed);
    }

    pub fn get(&self) -> (u64, u64, u64) {
        (
            self.prompt_tokens.load(Ordering::Relaxed),
            self.completion_tokens.load(Ordering::Relaxed),
            self.total_tokens.load(Ordering::Relaxed),
        )
    }
}

/// OpenAI 兼容客户端：持有 Client、model 名、温度与单次请求超时
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    model: String,
    temperature: f32,
    request_timeout: Duration,
    /// 累计 token 使用统计
    pub usage: TokenUsage,
}

/// 单次尝试的 async-openai Client：内置 backoff 的 max_elapsed_time 置零，
/// 429 直接以错误返回，由 core::retry 按自己的退避表处理
pub(crate) fn single_attempt_client(base_url: Option<&str>, api_key: &str) -> Client<OpenAIConfig> {
    let config = match base_url {
        Some(url) => OpenAIConfig::new().with_api_base(url).with_api_key(api_key),
        None => OpenAIConfig::new().with_api_key(api_key),
    };
    let no_retry = ExponentialBackoff {
        max_elapsed_time: Some(Duration::ZERO),
        ..Default::default()
    };
    Client::with_config(config).with_backoff(no_retry)
}

impl OpenAiClient {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        Self {
            client: single_attempt_client(base_url, api_key),
            model: model.to_string(),
            temperature: 0.0,
            request_timeout: Duration::from_secs(60),
            usage: TokenUsage::new(),
        }
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// 拼装 chat-completions 请求体（JSON 线格式）
    pub fn build_request(&self, system_prompt: &str, history: &[Message], tools: &[ToolSpec]) -> Value {
        let mut messages = Vec::with_capacity(history.len() + 1);
        if !system_prompt.is_empty() {
            messages.push(json!({ "role": "system", "content": system_prompt }));
        }
        messages.extend(history.iter().map(message_to_wire));

        let mut body = json!({
            "model": self.model,
            "messages": messages,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            body["tools"] = Value::Array(tools.iter().map(ToolSpec::to_openai_json).collect());
        }
        body
    }
}

fn message_to_wire(m: &Message) -> Value {
    match m.role {
        Role::System => json!({ "role": "system", "content": m.content }),
        Role::User => json!({ "role": "user", "content": m.content }),
        Role::Assistant => {
            let mut v = json!({ "role": "assistant" });
            if !m.content.is_empty() || m.tool_calls.is_empty() {
                v["content"] = Value::String(m.content.clone());
            }
            if !m.tool_calls.is_empty() {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .map(|c| {
                        let arguments = match &c.arguments {
                            Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": { "name": c.name, "arguments": arguments },
                        })
                    })
                    .collect();
                v["tool_calls"] = Value::Array(calls);
            }
            v
        }
        Role::Tool => json!({
            "role": "tool",
            "content": m.content,
            "tool_call_id": m.tool_call_id.clone().unwrap_or_default(),
        }),
    }
}

/// 从响应 JSON 中取首个 choice 的 assistant 消息
pub fn parse_response(response: &Value) -> Result<Message, LlmError> {
    let message = response
        .pointer("/choices/0/message")
        .ok_or_else(|| LlmError::InvalidResponse("response has no choices".to_string()))?;
    let content = message
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let calls: Vec<ToolCallIntent> = message
        .get("tool_calls")
        .and_then(Value::as_array)
        .map(|calls| {
            calls
                .iter()
                .enumerate()
                .filter_map(|(i, c)| {
                    let name = c.pointer("/function/name")?.as_str()?;
                    let id = c
                        .get("id")
                        .and_then(Value::as_str)
                        .filter(|s| !s.is_empty())
                        .map(String::from)
                        .unwrap_or_else(|| format!("call_{i}"));
                    let raw = c
                        .pointer("/function/arguments")
                        .cloned()
                        .unwrap_or(Value::Null);
                    let arguments = match raw {
                        Value::String(s) => serde_json::from_str(&s).unwrap_or(Value::String(s)),
                        other => other,
                    };
                    Some(ToolCallIntent::new(id, name, arguments))
                })
                .collect()
        })
        .unwrap_or_default();

    if calls.is_empty() {
        Ok(Message::assistant(content))
    } else {
        Ok(Message::assistant_with_tools(content, calls))
    }
}

#[async_trait]
impl LlmClient for OpenAiClient {
    async fn invoke(
        &self,
        system_prompt: &str,
        history: &[Message],
        tools: &[ToolSpec],
    ) -> Result<Message, LlmError> {
        let body = self.build_request(system_prompt, history, tools);
        let request: CreateChatCompletionRequest = serde_json::from_value(body)
            .map_err(|e| LlmError::InvalidResponse(format!("failed to build request: {e}")))?;

        let response = tokio::time::timeout(self.request_timeout, self.client.chat().create(request))
            .await
            .map_err(|_| {
                LlmError::Network(format!(
                    "request timed out after {}s",
                    self.request_timeout.as_secs()
                ))
            })?
            .map_err(|e| LlmError::classify(None, format!("{e} {e:?}")))?;

        let response = serde_json::to_value(&response)
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        if let Some(usage) = response.get("usage") {
            let prompt = usage.get("prompt_tokens").and_then(Value::as_u64).unwrap_or(0);
            let completion = usage
                .get("completion_tokens")
                .and_then(Value::as_u64)
                .unwrap_or(0);
            self.usage.add(prompt, completion);
        }

        parse_response(&response)
    }

    fn model_name(&self) -> &str {
        &self.model
    }

    fn token_usage(&self) -> (u64, u64, u64) {
        self.usage.get()
    }
}


#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::test_support::{serve_status, BAD_KEY_BODY, RATE_LIMIT_BODY};
    use super::*;
    use crate::core::{retry_with_backoff, AgentError, ChatError, RetryConfig};
    use crate::tools::ItemLookupTool;

    #[tokio::test]
    async fn test_http_429_surfaces_as_rate_limited_after_one_attempt() {
        let (base, hits) = serve_status("429 Too Many Requests", RATE_LIMIT_BODY).await;
        let client = OpenAiClient::new(Some(&base), "m", "key").with_request_timeout(Duration::from_secs(10));

        let err = client
            .invoke("sys", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(err.is_rate_limited(), "got {err:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_http_429_drives_retry_policy_to_exhaustion() {
        let (base, hits) = serve_status("429 Too Many Requests", RATE_LIMIT_BODY).await;
        let client = OpenAiClient::new(Some(&base), "m", "key").with_request_timeout(Duration::from_secs(10));
        let retry = RetryConfig::new(3, Duration::from_millis(1), Duration::from_millis(5));
        let history = [Message::user("hi")];

        let err = retry_with_backoff(&retry, || client.invoke("sys", &history, &[]))
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::RetriesExhausted { attempts: 3 }));
        assert_eq!(hits.load(Ordering::SeqCst), 3);
        assert_eq!(ChatError::from(AgentError::Llm(err)), ChatError::ServiceUnavailable);
    }

    #[tokio::test]
    async fn test_http_401_surfaces_as_authentication_failure() {
        let (base, hits) = serve_status("401 Unauthorized", BAD_KEY_BODY).await;
        let client = OpenAiClient::new(Some(&base), "m", "sk-bad").with_request_timeout(Duration::from_secs(10));

        let err = client
            .invoke("sys", &[Message::user("hi")], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, LlmError::Unauthorized(_)), "got {err:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert_eq!(ChatError::from(AgentError::Llm(err)), ChatError::AuthenticationFailed);
    }

    #[test]
    fn test_build_request_wire_format() {
        let client = OpenAiClient::new(None, "gemini-2.5-flash", "key");
        let history = vec![
            Message::user("sofa?"),
            Message::assistant_with_tools(
                "",
                vec![ToolCallIntent::new("c1", "item_lookup", json!({"query": "sofa"}))],
            ),
            Message::tool("c1", r#"{"count":0}"#),
        ];
        let body = client.build_request("be helpful", &history, &[ItemLookupTool::spec()]);
        let msgs = body["messages"].as_array().unwrap();
        assert_eq!(msgs.len(), 4);
        assert_eq!(msgs[0]["role"], "system");
        assert!(msgs[2].get("content").is_none());
        assert_eq!(msgs[2]["tool_calls"][0]["function"]["arguments"], r#"{"query":"sofa"}"#);
        assert_eq!(msgs[3]["tool_call_id"], "c1");
        assert_eq!(body["tools"][0]["function"]["name"], "item_lookup");
        assert_eq!(body["temperature"], 0.0);

        let typed: Result<CreateChatCompletionRequest, _> = serde_json::from_value(body);
        assert!(typed.is_ok());
    }

    #[test]
    fn test_parse_tool_call_response() {
        let response = json!({
            "choices": [{
                "index": 0,
                "message": {
                    "role": "assistant",
                    "content": null,
                    "tool_calls": [{
                        "id": "call_9",
                        "type": "function",
                        "function": { "name": "item_lookup", "arguments": "{\"query\":\"oak table\"}" }
                    }]
                }
            }]
        });
        let msg = parse_response(&response).unwrap();
        assert!(msg.has_tool_calls());
        assert_eq!(msg.tool_calls[0].id, "call_9");
        assert_eq!(msg.tool_calls[0].arguments["query"], "oak table");
    }

    #[test]
    fn test_parse_final_answer() {
        let response = json!({
            "choices": [{ "message": { "role": "assistant", "content": "We have 2 sofas." } }]
        });
        let msg = parse_response(&response).unwrap();
        assert!(!msg.has_tool_calls());
        assert_eq!(msg.content, "We have 2 sofas.");
        assert!(parse_response(&json!({ "choices": [] })).is_err());
    }
}
