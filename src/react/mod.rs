//! 认知层：Planner（reasoning 节点）与 reasoning <-> tool_execution 状态机

pub mod graph;
pub mod planner;

pub use graph::{AgentGraph, GraphRun, GraphState, DEFAULT_RECURSION_LIMIT};
pub use planner::{Planner, DEFAULT_SYSTEM_PROMPT};
