//! Gemini 客户端（OpenAI 兼容端点）
//!
//! - Base URL: https://generativelanguage.googleapis.com/v1beta/openai
//! - 默认模型: gemini-2.5-flash，温度 0

use crate::llm::OpenAiClient;

pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const GEMINI_FLASH: &str = "gemini-2.5-flash";

/// 查找 Gemini API Key：优先 `GEMINI_API_KEY`，其次 `GOOGLE_API_KEY`
pub fn gemini_api_key_from_env() -> Option<String> {
    std::env::var("GEMINI_API_KEY")
        .ok()
        .or_else(|| std::env::var("GOOGLE_API_KEY").ok())
        .filter(|k| !k.trim().is_empty())
}

/// 创建 Gemini 客户端；base_url 为 None 时使用官方端点
pub fn create_gemini_client(base_url: Option<&str>, model: Option<&str>, api_key: &str) -> OpenAiClient {
    let model = model
        .filter(|m| !m.trim().is_empty())
        .unwrap_or(GEMINI_FLASH);
    OpenAiClient::new(Some(base_url.unwrap_or(GEMINI_BASE_URL)), model, api_key).with_temperature(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmClient;

    #[test]
    fn test_default_model() {
        let client = create_gemini_client(None, None, "key");
        assert_eq!(client.model_name(), GEMINI_FLASH);
        let client = create_gemini_client(None, Some("gemini-2.5-pro"), "key");
        assert_eq!(client.model_name(), "gemini-2.5-pro");
    }
}
