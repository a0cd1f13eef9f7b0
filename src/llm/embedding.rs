//! 嵌入 API：供商品向量检索使用，调用 OpenAI 兼容的 /embeddings 端点

use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::types::embeddings::{CreateEmbeddingRequestArgs, EmbeddingInput};
use async_openai::Client;
use async_trait::async_trait;

use crate::llm::openai::single_attempt_client;
use crate::llm::LlmError;

/// 文本向量化
#[async_trait]
pub trait Embedder: Send + Sync {
    /// 空文本返回空向量（调用方视为“无向量可比”）
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError>;
}

/// 使用 async-openai 调用 OpenAI 兼容的 embeddings API
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client<OpenAIConfig>,
    model: String,
}

impl OpenAiEmbedder {
    pub fn new(base_url: Option<&str>, model: &str, api_key: &str) -> Self {
        Self {
            client: single_attempt_client(base_url, api_key),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(vec![]);
        }
        let request = CreateEmbeddingRequestArgs::default()
            .model(&self.model)
            .input(EmbeddingInput::String(text.to_string()))
            .build()
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let response = self
            .client
            .embeddings()
            .create(request)
            .await
            .map_err(|e| LlmError::classify(None, format!("{e} {e:?}")))?;
        let vec = response
            .data
            .first()
            .map(|e| e.embedding.clone())
            .unwrap_or_default();
        tracing::debug!(model = %self.model, dims = vec.len(), "embedded query");
        Ok(vec)
    }
}

/// 按配置创建 embedder；没有可用 API Key 时返回 None（检索直接走文本回退）
pub fn create_embedder_from_config(
    base_url: Option<&str>,
    model: &str,
    api_key: Option<&str>,
) -> Option<Arc<dyn Embedder>> {
    let key = api_key.map(str::trim).filter(|k| !k.is_empty())?;
    if model.trim().is_empty() {
        tracing::debug!("embedding skipped: no model configured");
        return None;
    }
    Some(Arc::new(OpenAiEmbedder::new(base_url, model, key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_key_no_embedder() {
        assert!(create_embedder_from_config(None, "text-embedding-004", None).is_none());
        assert!(create_embedder_from_config(None, "text-embedding-004", Some("  ")).is_none());
        assert!(create_embedder_from_config(None, "", Some("key")).is_none());
    }

    #[tokio::test]
    async fn test_http_429_is_not_retried_inside_the_client() {
        use crate::llm::openai::test_support::{serve_status, RATE_LIMIT_BODY};
        use std::sync::atomic::Ordering;

        let (base, hits) = serve_status("429 Too Many Requests", RATE_LIMIT_BODY).await;
        let embedder = OpenAiEmbedder::new(Some(&base), "text-embedding-004", "key");
        let err = embedder.embed("oak table").await.unwrap_err();
        assert!(err.is_rate_limited(), "got {err:?}");
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_empty_text_short_circuits() {
        let embedder = OpenAiEmbedder::new(Some("http://127.0.0.1:9"), "m", "key");
        assert!(embedder.embed("   ").await.unwrap().is_empty());
    }
}
