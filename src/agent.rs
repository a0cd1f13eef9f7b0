//! Agent 组装
//!
//! 按 AppConfig 构建 LLM、embedder、商品库、检查点存储，组装成 AgentGraph 与 SessionManager，
//! 供 HTTP 服务与测试共用。没有 API Key 时退回离线 MockLlmClient。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use crate::catalog::{CatalogStore, InMemoryCatalog};
use crate::config::{AppConfig, LlmProvider, StoreBackend};
use crate::core::{AgentError, SessionManager};
use crate::llm::{
    create_embedder_from_config, create_gemini_client, gemini_api_key_from_env, Embedder,
    LlmClient, MockLlmClient, OpenAiClient, GEMINI_BASE_URL,
};
use crate::memory::{CheckpointStore, FileCheckpointStore, MemoryCheckpointStore};
use crate::react::{AgentGraph, Planner, DEFAULT_SYSTEM_PROMPT};
use crate::tools::{ItemLookupTool, ToolExecutor};

fn openai_api_key_from_env() -> Option<String> {
    std::env::var("OPENAI_API_KEY")
        .ok()
        .filter(|k| !k.trim().is_empty())
}

/// 当前 provider 的 API Key；mock 没有 Key
fn provider_api_key(cfg: &AppConfig) -> Option<String> {
    match cfg.llm.provider {
        LlmProvider::Gemini => gemini_api_key_from_env(),
        LlmProvider::Openai => openai_api_key_from_env(),
        LlmProvider::Mock => None,
    }
}

/// 按配置创建 LLM 客户端；选中的 provider 没有 API Key 时使用 Mock
pub fn create_llm_from_config(cfg: &AppConfig) -> Arc<dyn LlmClient> {
    let timeout = Duration::from_secs(cfg.llm.timeouts.request.max(1));
    match (cfg.llm.provider, provider_api_key(cfg)) {
        (LlmProvider::Gemini, Some(key)) => {
            tracing::info!("Using Gemini LLM ({})", cfg.llm.model);
            Arc::new(
                create_gemini_client(cfg.llm.base_url.as_deref(), Some(&cfg.llm.model), &key)
                    .with_temperature(cfg.llm.temperature)
                    .with_request_timeout(timeout),
            )
        }
        (LlmProvider::Openai, Some(key)) => {
            tracing::info!("Using OpenAI LLM ({})", cfg.llm.model);
            Arc::new(
                OpenAiClient::new(cfg.llm.base_url.as_deref(), &cfg.llm.model, &key)
                    .with_temperature(cfg.llm.temperature)
                    .with_request_timeout(timeout),
            )
        }
        (LlmProvider::Mock, _) => {
            tracing::info!("Using Mock LLM");
            Arc::new(MockLlmClient::new())
        }
        (_, None) => {
            tracing::warn!("No API key set for {:?}, using Mock LLM", cfg.llm.provider);
            Arc::new(MockLlmClient::new())
        }
    }
}

/// 查询向量化；未启用、mock 或没有 Key 时为 None（检索只走文本回退）
pub fn create_embedder(cfg: &AppConfig) -> Option<Arc<dyn Embedder>> {
    if !cfg.embedding.enabled {
        return None;
    }
    let key = provider_api_key(cfg)?;
    let base_url = cfg
        .embedding
        .base_url
        .clone()
        .or_else(|| cfg.llm.base_url.clone())
        .or_else(|| (cfg.llm.provider == LlmProvider::Gemini).then(|| GEMINI_BASE_URL.to_string()));
    let embedder = create_embedder_from_config(base_url.as_deref(), &cfg.embedding.model, Some(&key));
    if embedder.is_some() {
        tracing::info!("Query embedding enabled ({})", cfg.embedding.model);
    }
    embedder
}

fn store_path(path: &Option<PathBuf>, fallback: &str) -> PathBuf {
    path.clone().unwrap_or_else(|| PathBuf::from(fallback))
}

/// 按配置打开商品库
pub async fn create_catalog(cfg: &AppConfig) -> Result<Arc<dyn CatalogStore>, AgentError> {
    match cfg.catalog.backend {
        StoreBackend::Memory => Ok(Arc::new(InMemoryCatalog::default())),
        StoreBackend::File => {
            let path = store_path(&cfg.catalog.path, "data/catalog.json");
            tracing::info!(path = %path.display(), "loading catalog");
            Ok(Arc::new(InMemoryCatalog::from_json_file(&path).await?))
        }
        #[cfg(feature = "async-sqlite")]
        StoreBackend::Sqlite => {
            let path = store_path(&cfg.catalog.path, "data/catalog.db");
            tracing::info!(path = %path.display(), "opening sqlite catalog");
            Ok(Arc::new(crate::catalog::SqliteCatalog::new(&path).await?))
        }
        #[cfg(not(feature = "async-sqlite"))]
        StoreBackend::Sqlite => Err(AgentError::ConfigError(
            "catalog backend \"sqlite\" requires the async-sqlite feature".to_string(),
        )),
    }
}

/// 按配置打开对话检查点存储
pub async fn create_checkpoint_store(cfg: &AppConfig) -> Result<Arc<dyn CheckpointStore>, AgentError> {
    match cfg.checkpoint.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryCheckpointStore::new())),
        StoreBackend::File => {
            let dir = store_path(&cfg.checkpoint.path, "data/threads");
            tracing::info!(dir = %dir.display(), "using file checkpoints");
            Ok(Arc::new(FileCheckpointStore::new(dir)))
        }
        #[cfg(feature = "async-sqlite")]
        StoreBackend::Sqlite => {
            let path = store_path(&cfg.checkpoint.path, "data/threads.db");
            tracing::info!(path = %path.display(), "using sqlite checkpoints");
            let store = crate::memory::SqliteCheckpointStore::new(&path)
                .await
                .map_err(crate::memory::PersistenceError::from)?;
            Ok(Arc::new(store))
        }
        #[cfg(not(feature = "async-sqlite"))]
        StoreBackend::Sqlite => Err(AgentError::ConfigError(
            "checkpoint backend \"sqlite\" requires the async-sqlite feature".to_string(),
        )),
    }
}

/// system prompt 模板：配置了路径且可读时用文件内容，否则用内置模板
pub fn load_system_prompt(cfg: &AppConfig) -> String {
    match &cfg.agent.system_prompt_path {
        Some(path) => match std::fs::read_to_string(path) {
            Ok(prompt) if !prompt.trim().is_empty() => prompt,
            Ok(_) => DEFAULT_SYSTEM_PROMPT.to_string(),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "system prompt unreadable, using built-in");
                DEFAULT_SYSTEM_PROMPT.to_string()
            }
        },
        None => DEFAULT_SYSTEM_PROMPT.to_string(),
    }
}

/// 用已构建的依赖组装 SessionManager（测试可注入内存实现）
pub fn build_session_manager(
    cfg: &AppConfig,
    llm: Arc<dyn LlmClient>,
    embedder: Option<Arc<dyn Embedder>>,
    catalog: Arc<dyn CatalogStore>,
    store: Arc<dyn CheckpointStore>,
) -> SessionManager {
    let lookup = ItemLookupTool::new(catalog, embedder)
        .with_limits(cfg.catalog.default_limit, cfg.catalog.max_limit);
    let executor = ToolExecutor::new(lookup, cfg.agent.tool_timeout_secs);
    let planner = Planner::new(llm, load_system_prompt(cfg), cfg.retry.to_retry_config());
    let graph = AgentGraph::new(planner, executor).with_recursion_limit(cfg.agent.recursion_limit);
    SessionManager::new(Arc::new(graph), store)
}

/// 从配置构建完整的 SessionManager
pub async fn create_session_manager(cfg: &AppConfig) -> Result<Arc<SessionManager>, AgentError> {
    let llm = create_llm_from_config(cfg);
    let embedder = create_embedder(cfg);
    let catalog = create_catalog(cfg).await?;
    let store = create_checkpoint_store(cfg).await?;
    Ok(Arc::new(build_session_manager(cfg, llm, embedder, catalog, store)))
}
