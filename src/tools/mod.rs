//! 工具层：item_lookup 混合检索、参数 schema、带超时与审计日志的执行器
//!
//! 工具集合是封闭的：模型给出的调用意图先解析为 ToolCall 枚举，未知工具名或参数不合法
//! 都会变成返回给模型的错误结果，而不是中止对话。

pub mod executor;
pub mod item_lookup;
pub mod schema;

use serde::{Deserialize, Serialize};

use crate::memory::ToolCallIntent;

pub use executor::ToolExecutor;
pub use item_lookup::{
    FailureKind, ItemLookupArgs, ItemLookupTool, SearchFailure, SearchHit, SearchOutcome,
    SearchResults, SearchType, DEFAULT_LOOKUP_LIMIT, EMPTY_INVENTORY_ERROR, ITEM_LOOKUP,
    SEARCH_FAILED_ERROR,
};
pub use schema::ToolSpec;

/// 已解析的工具调用
#[derive(Debug, Clone, PartialEq)]
pub enum ToolCall {
    ItemLookup(ItemLookupArgs),
}

impl ToolCall {
    /// 解析调用意图；arguments 可以是 JSON 对象，也可以是 JSON 字符串（OpenAI 风格）
    pub fn parse(intent: &ToolCallIntent) -> Result<Self, String> {
        let arguments = match &intent.arguments {
            serde_json::Value::String(raw) => serde_json::from_str(raw)
                .map_err(|e| format!("Invalid arguments for {}: {e}", intent.name))?,
            other => other.clone(),
        };
        match intent.name.as_str() {
            ITEM_LOOKUP => serde_json::from_value::<ItemLookupArgs>(arguments)
                .map(ToolCall::ItemLookup)
                .map_err(|e| format!("Invalid arguments for {}: {e}", intent.name)),
            other => Err(format!("Unknown tool: {other}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolCall::ItemLookup(_) => ITEM_LOOKUP,
        }
    }
}

/// 工具执行结果（序列化后作为 tool 消息内容）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Search(SearchOutcome),
    Rejected { error: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_string_arguments() {
        let intent = ToolCallIntent::new(
            "c1",
            "item_lookup",
            serde_json::Value::String(r#"{"query":"lamp","n":3}"#.into()),
        );
        let call = ToolCall::parse(&intent).unwrap();
        assert_eq!(call.name(), "item_lookup");
        let ToolCall::ItemLookup(args) = call;
        assert_eq!(args.query, "lamp");
        assert_eq!(args.n, Some(3));
    }

    #[test]
    fn test_parse_unknown_tool() {
        let intent = ToolCallIntent::new("c1", "delete_everything", serde_json::json!({}));
        let err = ToolCall::parse(&intent).unwrap_err();
        assert_eq!(err, "Unknown tool: delete_everything");
    }
}
