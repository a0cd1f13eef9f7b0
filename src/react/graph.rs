//! Agent 图：reasoning <-> tool_execution 状态机
//!
//! reasoning 调用模型；回复带工具调用意图则进入 tool_execution，否则结束。
//! tool_execution 按顺序执行所有意图、把结果作为 tool 消息追加后回到 reasoning。
//! 每执行一个节点计一步，达到 recursion_limit 仍未结束则返回 RecursionLimitExceeded。

use crate::core::AgentError;
use crate::memory::Message;
use crate::react::Planner;
use crate::tools::ToolExecutor;

/// 默认步数上限
pub const DEFAULT_RECURSION_LIMIT: usize = 15;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    Reasoning,
    ToolExecution,
    Done,
}

/// 一次图执行的结果
#[derive(Debug, Clone, PartialEq)]
pub struct GraphRun {
    pub answer: String,
    pub steps: usize,
}

pub struct AgentGraph {
    planner: Planner,
    executor: ToolExecutor,
    recursion_limit: usize,
}

impl AgentGraph {
    pub fn new(planner: Planner, executor: ToolExecutor) -> Self {
        Self {
            planner,
            executor,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
        }
    }

    pub fn with_recursion_limit(mut self, limit: usize) -> Self {
        self.recursion_limit = limit.max(1);
        self
    }

    /// 从 reasoning 开始执行，直到模型给出最终回复；
    /// 新产生的 assistant / tool 消息依次追加到 messages。出错时 messages 可能只追加了一部分，由调用方丢弃。
    pub async fn run(&self, messages: &mut Vec<Message>) -> Result<GraphRun, AgentError> {
        let tools = self.executor.specs();
        let mut state = GraphState::Reasoning;
        let mut steps = 0usize;

        while state != GraphState::Done {
            if steps >= self.recursion_limit {
                tracing::warn!(limit = self.recursion_limit, "recursion limit reached");
                return Err(AgentError::RecursionLimitExceeded {
                    limit: self.recursion_limit,
                });
            }
            steps += 1;

            state = match state {
                GraphState::Reasoning => {
                    let reply = self.planner.plan(messages, &tools).await?;
                    let next = if reply.has_tool_calls() {
                        GraphState::ToolExecution
                    } else {
                        GraphState::Done
                    };
                    tracing::debug!(step = steps, next = ?next, "reasoning");
                    messages.push(reply);
                    next
                }
                GraphState::ToolExecution => {
                    let intents = messages
                        .last()
                        .map(|m| m.tool_calls.clone())
                        .unwrap_or_default();
                    for intent in &intents {
                        let result = self.executor.execute(intent).await;
                        messages.push(result);
                    }
                    tracing::debug!(step = steps, calls = intents.len(), "tool execution");
                    GraphState::Reasoning
                }
                GraphState::Done => GraphState::Done,
            };
        }

        let answer = messages
            .last()
            .map(|m| m.content.clone())
            .unwrap_or_default();
        let (_, _, total_tokens) = self.planner.token_usage();
        tracing::info!(
            steps,
            answer_len = answer.len(),
            model = %self.planner.model_name(),
            total_tokens,
            "graph finished"
        );
        Ok(GraphRun { answer, steps })
    }
}
