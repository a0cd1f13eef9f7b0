//! shopbee - 商品目录对话 Agent
//!
//! 模块划分：
//! - **agent**: 按配置组装 LLM / 商品库 / 检查点存储 / 会话管理
//! - **catalog**: 商品记录与商品库（内存 / JSON 文件 / SQLite）
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 错误分类、限流重试、会话管理
//! - **llm**: LLM 客户端抽象与实现（OpenAI 兼容 / Gemini / Mock）、查询向量化
//! - **memory**: 消息与对话模型、检查点持久化
//! - **react**: Planner 与 reasoning <-> tool_execution 状态机
//! - **server**: axum HTTP 接口（feature `web`）
//! - **tools**: item_lookup 混合检索与执行器

pub mod agent;
pub mod catalog;
pub mod config;
pub mod core;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod react;
#[cfg(feature = "web")]
pub mod server;
pub mod tools;
