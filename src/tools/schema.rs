//! 工具 Schema 生成（schemars 从参数类型自动生成 JSON Schema）
//!
//! 生成的 ToolSpec 随每次推理调用一起发送给模型，保证参数格式与解析端一致。

use schemars::{schema_for, JsonSchema};
use serde::Serialize;
use serde_json::Value;

/// 发给模型的工具描述：名称、用途、参数 JSON Schema
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

impl ToolSpec {
    /// 由参数类型生成 ToolSpec；去掉 `$schema` / `title` 等模型端不需要的键
    pub fn for_args<T: JsonSchema>(name: &str, description: &str) -> Self {
        let mut parameters =
            serde_json::to_value(schema_for!(T)).unwrap_or_else(|_| serde_json::json!({}));
        if let Some(obj) = parameters.as_object_mut() {
            obj.remove("$schema");
            obj.remove("title");
            obj.remove("definitions");
        }
        Self {
            name: name.to_string(),
            description: description.to_string(),
            parameters,
        }
    }

    /// OpenAI 兼容的 `tools` 数组元素
    pub fn to_openai_json(&self) -> Value {
        serde_json::json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters,
            }
        })
    }
}
