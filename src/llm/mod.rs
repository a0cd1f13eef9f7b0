//! LLM 层：客户端抽象与实现（OpenAI 兼容 / Gemini / Mock / Scripted）与查询向量化

pub mod embedding;
pub mod gemini;
pub mod mock;
pub mod openai;
pub mod traits;

pub use embedding::{create_embedder_from_config, Embedder, OpenAiEmbedder};
pub use gemini::{create_gemini_client, gemini_api_key_from_env, GEMINI_BASE_URL, GEMINI_FLASH};
pub use mock::{MockLlmClient, RecordedCall, ScriptedLlmClient};
pub use openai::{OpenAiClient, TokenUsage};
pub use traits::{LlmClient, LlmError};
