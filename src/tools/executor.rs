//! 工具执行器
//!
//! 持有 item_lookup 工具与全局超时，execute(intent) 解析参数并在超时内执行，
//! 结果（包括参数错误 / 超时）一律序列化为 tool 消息返回给模型，不会让图中止；
//! 每次调用输出结构化审计日志（JSON）。

use std::time::{Duration, Instant};

use tokio::time::timeout;

use crate::memory::{Message, ToolCallIntent};
use crate::tools::{ItemLookupTool, SearchOutcome, ToolCall, ToolOutput, ToolSpec};

/// 工具执行器：对每次调用施加超时，并把结果映射为 tool 消息
pub struct ToolExecutor {
    item_lookup: ItemLookupTool,
    timeout: Duration,
}

impl ToolExecutor {
    pub fn new(item_lookup: ItemLookupTool, timeout_secs: u64) -> Self {
        Self {
            item_lookup,
            timeout: Duration::from_secs(timeout_secs.max(1)),
        }
    }

    /// 随推理调用一起发送的工具描述
    pub fn specs(&self) -> Vec<ToolSpec> {
        vec![ItemLookupTool::spec()]
    }

    /// 执行一次工具调用意图；返回携带 call id 的 tool 消息
    pub async fn execute(&self, intent: &ToolCallIntent) -> Message {
        let start = Instant::now();
        let args_preview = args_preview(&intent.arguments);

        let (output, outcome) = match ToolCall::parse(intent) {
            Ok(call) => self.run(call).await,
            Err(reason) => {
                tracing::warn!(tool = %intent.name, reason = %reason, "tool call rejected");
                (ToolOutput::Rejected { error: reason }, "rejected")
            }
        };

        let duration_ms = start.elapsed().as_millis() as u64;
        let audit = serde_json::json!({
            "event": "tool_audit",
            "tool": intent.name,
            "call_id": intent.id,
            "ok": outcome == "ok",
            "outcome": outcome,
            "duration_ms": duration_ms,
            "args_preview": args_preview,
        });
        tracing::info!(audit = %audit.to_string(), "tool");

        let payload = serde_json::to_string(&output).unwrap_or_else(|e| {
            serde_json::json!({ "error": format!("failed to encode tool result: {e}") }).to_string()
        });
        Message::tool(intent.id.clone(), payload)
    }

    async fn run(&self, call: ToolCall) -> (ToolOutput, &'static str) {
        match call {
            ToolCall::ItemLookup(args) => {
                match timeout(self.timeout, self.item_lookup.lookup_args(&args)).await {
                    Ok(outcome) => {
                        let label = match outcome.failure_kind() {
                            None => "ok",
                            Some(_) => "error",
                        };
                        (ToolOutput::Search(outcome), label)
                    }
                    Err(_) => {
                        let outcome = SearchOutcome::search_failed(
                            &args.query,
                            format!("timed out after {}s", self.timeout.as_secs()),
                        );
                        (ToolOutput::Search(outcome), "timeout")
                    }
                }
            }
        }
    }
}

fn args_preview(args: &serde_json::Value) -> String {
    let s = args.to_string();
    if s.chars().count() > 200 {
        format!("{}...", s.chars().take(200).collect::<String>())
    } else {
        s
    }
}
