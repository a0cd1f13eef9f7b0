//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `SHOPBEE__*` 覆盖（双下划线表示嵌套，如 `SHOPBEE__LLM__PROVIDER=openai`）。
//! API Key 只从环境变量读取，不写进配置文件。

use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::core::RetryConfig;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub server: ServerSection,
    pub llm: LlmSection,
    pub embedding: EmbeddingSection,
    pub agent: AgentSection,
    pub retry: RetrySection,
    pub catalog: CatalogSection,
    pub checkpoint: CheckpointSection,
}

/// [app] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub name: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            name: "shopbee".to_string(),
        }
    }
}

/// [server] 段：监听地址
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerSection {
    pub host: String,
    pub port: u16,
}

impl Default for ServerSection {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8000,
        }
    }
}

impl ServerSection {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    Gemini,
    Openai,
    Mock,
}

/// [llm] 段：后端选择、模型与超时
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    pub provider: LlmProvider,
    pub model: String,
    pub base_url: Option<String>,
    pub temperature: f32,
    pub timeouts: LlmTimeoutsSection,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: LlmProvider::Gemini,
            model: "gemini-2.5-flash".to_string(),
            base_url: None,
            temperature: 0.0,
            timeouts: LlmTimeoutsSection::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmTimeoutsSection {
    /// 单次推理请求超时（秒）
    pub request: u64,
}

impl Default for LlmTimeoutsSection {
    fn default() -> Self {
        Self { request: 60 }
    }
}

/// [embedding] 段：查询向量化
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EmbeddingSection {
    pub enabled: bool,
    pub model: String,
    /// 未设置时与 LLM 使用同一端点
    pub base_url: Option<String>,
}

impl Default for EmbeddingSection {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gemini-embedding-001".to_string(),
            base_url: None,
        }
    }
}

/// [agent] 段：步数上限、工具超时、system prompt 覆盖
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    pub recursion_limit: usize,
    pub tool_timeout_secs: u64,
    pub system_prompt_path: Option<PathBuf>,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            recursion_limit: 15,
            tool_timeout_secs: 30,
            system_prompt_path: None,
        }
    }
}

/// [retry] 段：限流退避
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RetrySection {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySection {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1000,
            max_delay_ms: 30_000,
        }
    }
}

impl RetrySection {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.max_attempts,
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    Memory,
    File,
    Sqlite,
}

/// [catalog] 段：商品库后端与检索条数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CatalogSection {
    pub backend: StoreBackend,
    /// file：JSON 数组文件；sqlite：数据库文件
    pub path: Option<PathBuf>,
    pub default_limit: usize,
    pub max_limit: usize,
}

impl Default for CatalogSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: Some(PathBuf::from("data/catalog.json")),
            default_limit: 16,
            max_limit: 50,
        }
    }
}

/// [checkpoint] 段：对话历史存储
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CheckpointSection {
    pub backend: StoreBackend,
    /// file：目录；sqlite：数据库文件
    pub path: Option<PathBuf>,
}

impl Default for CheckpointSection {
    fn default() -> Self {
        Self {
            backend: StoreBackend::File,
            path: Some(PathBuf::from("data/threads")),
        }
    }
}

/// 从 config 目录加载配置，环境变量 SHOPBEE__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 叠加环境变量 SHOPBEE__*（双下划线表示嵌套键）
/// 4. 未设置 SHOPBEE__SERVER__PORT 时，PORT 环境变量决定监听端口
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();
    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }
    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }
    builder = builder.add_source(
        config::Environment::with_prefix("SHOPBEE")
            .separator("__")
            .try_parsing(true),
    );
    let mut cfg: AppConfig = builder.build()?.try_deserialize()?;

    if std::env::var("SHOPBEE__SERVER__PORT").is_err() {
        if let Some(port) = std::env::var("PORT").ok().and_then(|p| p.trim().parse().ok()) {
            cfg.server.port = port;
        }
    }
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.server.port, 8000);
        assert_eq!(cfg.llm.provider, LlmProvider::Gemini);
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.agent.recursion_limit, 15);
        assert_eq!(cfg.catalog.default_limit, 16);
        assert_eq!(cfg.retry.to_retry_config(), RetryConfig::default());
    }

    #[test]
    fn test_explicit_file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[llm]
provider = "mock"

[agent]
recursion_limit = 7

[catalog]
backend = "memory"
"#
        )
        .unwrap();
        let cfg = load_config(Some(file.path().to_path_buf())).unwrap();
        assert_eq!(cfg.llm.provider, LlmProvider::Mock);
        assert_eq!(cfg.llm.model, "gemini-2.5-flash");
        assert_eq!(cfg.agent.recursion_limit, 7);
        assert_eq!(cfg.agent.tool_timeout_secs, 30);
        assert_eq!(cfg.catalog.backend, StoreBackend::Memory);
    }
}
