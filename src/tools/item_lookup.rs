//! item_lookup 工具：混合检索（向量优先，文本回退）
//!
//! 1. 商品库为空 -> 返回 EmptyInventory 结果（不是错误，模型需要据此回复）
//! 2. 向量检索：query 向量化后按相似度取 top-n
//! 3. 向量检索无结果（无 embedder / 无向量 / 索引不可用 / 确实不相关）-> 文本检索，最多 n 条
//! 4. 任何存储或网络错误 -> SearchFailed 结果，错误永不越过工具边界

use std::sync::Arc;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::catalog::{CatalogError, CatalogItem, CatalogStore, TextFilter};
use crate::llm::Embedder;
use crate::tools::ToolSpec;

pub const ITEM_LOOKUP: &str = "item_lookup";
pub const ITEM_LOOKUP_DESCRIPTION: &str =
    "Gather furniture item details from the inventory database";

pub const EMPTY_INVENTORY_ERROR: &str = "No items found in the inventory";
pub const EMPTY_INVENTORY_MESSAGE: &str = "The inventory database appears to be empty";
pub const SEARCH_FAILED_ERROR: &str = "Failed to search inventory";

pub const DEFAULT_LOOKUP_LIMIT: usize = 16;

/// item_lookup 的参数
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ItemLookupArgs {
    /// The search query
    pub query: String,
    /// Number of results to return (defaults to 16)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(with = "usize")]
    pub n: Option<usize>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchType {
    Vector,
    Text,
}

/// 一条命中；向量检索带相似度分数
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    #[serde(flatten)]
    pub item: CatalogItem,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchResults {
    pub results: Vec<SearchHit>,
    #[serde(rename = "searchType", alias = "search_type")]
    pub search_type: SearchType,
    pub query: String,
    pub count: usize,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchFailure {
    pub error: String,
    pub message: String,
    #[serde(default)]
    pub query: String,
    #[serde(default)]
    pub count: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    EmptyInventory,
    SearchFailed,
}

impl SearchFailure {
    pub fn kind(&self) -> FailureKind {
        if self.error == EMPTY_INVENTORY_ERROR {
            FailureKind::EmptyInventory
        } else {
            FailureKind::SearchFailed
        }
    }
}

/// 检索结果：命中集合（可为空）或失败，二者互斥
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SearchOutcome {
    Found(SearchResults),
    Failed(SearchFailure),
}

impl SearchOutcome {
    pub fn empty_inventory(query: &str) -> Self {
        SearchOutcome::Failed(SearchFailure {
            error: EMPTY_INVENTORY_ERROR.to_string(),
            message: EMPTY_INVENTORY_MESSAGE.to_string(),
            query: query.to_string(),
            count: 0,
        })
    }

    pub fn search_failed(query: &str, message: impl Into<String>) -> Self {
        SearchOutcome::Failed(SearchFailure {
            error: SEARCH_FAILED_ERROR.to_string(),
            message: message.into(),
            query: query.to_string(),
            count: 0,
        })
    }

    fn found(query: &str, search_type: SearchType, results: Vec<SearchHit>) -> Self {
        SearchOutcome::Found(SearchResults {
            count: results.len(),
            results,
            search_type,
            query: query.to_string(),
        })
    }

    pub fn count(&self) -> usize {
        match self {
            SearchOutcome::Found(r) => r.count,
            SearchOutcome::Failed(_) => 0,
        }
    }

    pub fn search_type(&self) -> Option<SearchType> {
        match self {
            SearchOutcome::Found(r) => Some(r.search_type),
            SearchOutcome::Failed(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            SearchOutcome::Found(_) => None,
            SearchOutcome::Failed(f) => Some(f.kind()),
        }
    }

    pub fn is_empty_inventory(&self) -> bool {
        self.failure_kind() == Some(FailureKind::EmptyInventory)
    }
}

/// 混合检索工具：持有商品库与可选的 embedder（未配置时直接走文本检索）
pub struct ItemLookupTool {
    catalog: Arc<dyn CatalogStore>,
    embedder: Option<Arc<dyn Embedder>>,
    default_results: usize,
    max_results: usize,
}

impl ItemLookupTool {
    pub fn new(catalog: Arc<dyn CatalogStore>, embedder: Option<Arc<dyn Embedder>>) -> Self {
        Self {
            catalog,
            embedder,
            default_results: DEFAULT_LOOKUP_LIMIT,
            max_results: 50,
        }
    }

    /// 模型未给 n 时的条数，与单次检索条数上限（模型传入的 n 会被截到 1..=max）
    pub fn with_limits(mut self, default_results: usize, max_results: usize) -> Self {
        self.max_results = max_results.max(1);
        self.default_results = default_results.clamp(1, self.max_results);
        self
    }

    pub fn spec() -> ToolSpec {
        ToolSpec::for_args::<ItemLookupArgs>(ITEM_LOOKUP, ITEM_LOOKUP_DESCRIPTION)
    }

    /// 按解析后的参数检索；未给 n 时使用默认条数
    pub async fn lookup_args(&self, args: &ItemLookupArgs) -> SearchOutcome {
        self.lookup(&args.query, args.n.unwrap_or(self.default_results)).await
    }

    pub async fn lookup(&self, query: &str, n: usize) -> SearchOutcome {
        let n = n.clamp(1, self.max_results);
        tracing::info!(query = %query, n, "item lookup");

        let total = match self.catalog.count().await {
            Ok(total) => total,
            Err(e) => return self.fail(query, e),
        };
        tracing::info!(total, "catalog size");
        if total == 0 {
            tracing::warn!("catalog is empty");
            return SearchOutcome::empty_inventory(query);
        }

        let hits = match self.vector_search(query, n).await {
            Ok(hits) => hits,
            Err(e) => return self.fail(query, e),
        };
        tracing::info!(count = hits.len(), "vector search returned");
        if !hits.is_empty() {
            return SearchOutcome::found(query, SearchType::Vector, hits);
        }

        tracing::info!("vector search returned no results, trying text search");
        match self.catalog.find(&TextFilter::new(query), n).await {
            Ok(items) => {
                tracing::info!(count = items.len(), "text search returned");
                let hits = items
                    .into_iter()
                    .map(|item| SearchHit { item, score: None })
                    .collect();
                SearchOutcome::found(query, SearchType::Text, hits)
            }
            Err(e) => self.fail(query, e),
        }
    }

    /// 向量路径；索引不可用视为零结果，其余错误向上返回
    async fn vector_search(&self, query: &str, n: usize) -> Result<Vec<SearchHit>, String> {
        let Some(embedder) = &self.embedder else {
            tracing::debug!("no embedder configured, skipping vector search");
            return Ok(Vec::new());
        };
        let vector = embedder.embed(query).await.map_err(|e| e.to_string())?;
        if vector.is_empty() {
            return Ok(Vec::new());
        }
        match self.catalog.vector_search(&vector, n).await {
            Ok(scored) => Ok(scored
                .into_iter()
                .take(n)
                .map(|(item, score)| SearchHit {
                    item,
                    score: Some(score),
                })
                .collect()),
            Err(CatalogError::IndexUnavailable(reason)) => {
                tracing::warn!(reason = %reason, "vector index unavailable");
                Ok(Vec::new())
            }
            Err(e) => Err(e.to_string()),
        }
    }

    fn fail(&self, query: &str, e: impl std::fmt::Display) -> SearchOutcome {
        tracing::error!(query = %query, error = %e, "error in item lookup");
        SearchOutcome::search_failed(query, e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::InMemoryCatalog;
    use crate::llm::LlmError;
    use async_trait::async_trait;

    struct FixedEmbedder(Vec<f32>);

    #[async_trait]
    impl Embedder for FixedEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Ok(self.0.clone())
        }
    }

    struct DownEmbedder;

    #[async_trait]
    impl Embedder for DownEmbedder {
        async fn embed(&self, _text: &str) -> Result<Vec<f32>, LlmError> {
            Err(LlmError::Network("connection refused".into()))
        }
    }

    fn furniture() -> Vec<CatalogItem> {
        vec![
            CatalogItem::new("1", "Velvet Sofa").with_embedding(vec![1.0, 0.0, 0.0]),
            CatalogItem::new("2", "Oak Dining Table").with_embedding(vec![0.0, 1.0, 0.0]),
            CatalogItem::new("3", "Corner Sofa").with_embedding(vec![0.9, 0.1, 0.0]),
        ]
    }

    #[tokio::test]
    async fn test_empty_catalog() {
        let tool = ItemLookupTool::new(
            Arc::new(InMemoryCatalog::default()),
            Some(Arc::new(DownEmbedder)),
        );
        let outcome = tool.lookup("sofa", 16).await;
        assert!(outcome.is_empty_inventory());
        assert_eq!(outcome.count(), 0);
        // embedder 未被调用，否则会变成 SearchFailed
        assert_eq!(outcome.failure_kind(), Some(FailureKind::EmptyInventory));
    }

    #[tokio::test]
    async fn test_vector_path_sorted_and_capped() {
        let tool = ItemLookupTool::new(
            Arc::new(InMemoryCatalog::new(furniture())),
            Some(Arc::new(FixedEmbedder(vec![1.0, 0.0, 0.0]))),
        );
        let outcome = tool.lookup("sofa", 2).await;
        let SearchOutcome::Found(r) = outcome else {
            panic!("expected results");
        };
        assert_eq!(r.search_type, SearchType::Vector);
        assert_eq!(r.count, 2);
        assert_eq!(r.results[0].item.item_id, "1");
        assert_eq!(r.results[1].item.item_id, "3");
        assert!(r.results[0].score >= r.results[1].score);
    }

    #[tokio::test]
    async fn test_text_fallback_without_embedder() {
        let tool = ItemLookupTool::new(Arc::new(InMemoryCatalog::new(furniture())), None);
        let outcome = tool.lookup("SOFA", 16).await;
        assert_eq!(outcome.search_type(), Some(SearchType::Text));
        let SearchOutcome::Found(r) = outcome else {
            panic!("expected results");
        };
        let ids: Vec<_> = r.results.iter().map(|h| h.item.item_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
        assert!(r.results.iter().all(|h| h.score.is_none()));
    }

    #[tokio::test]
    async fn test_text_fallback_genuine_empty_is_not_error() {
        let tool = ItemLookupTool::new(Arc::new(InMemoryCatalog::new(furniture())), None);
        let outcome = tool.lookup("wardrobe", 16).await;
        assert_eq!(outcome.search_type(), Some(SearchType::Text));
        assert_eq!(outcome.count(), 0);
        assert!(outcome.failure_kind().is_none());
    }

    #[tokio::test]
    async fn test_embedding_failure_becomes_outcome() {
        let tool = ItemLookupTool::new(
            Arc::new(InMemoryCatalog::new(furniture())),
            Some(Arc::new(DownEmbedder)),
        );
        let outcome = tool.lookup("sofa", 16).await;
        let SearchOutcome::Failed(f) = outcome else {
            panic!("expected failure");
        };
        assert_eq!(f.kind(), FailureKind::SearchFailed);
        assert_eq!(f.query, "sofa");
        assert!(f.message.contains("connection refused"));
    }

    #[test]
    fn test_outcome_wire_format() {
        let json = serde_json::to_value(SearchOutcome::empty_inventory("sofa")).unwrap();
        assert_eq!(json["error"], EMPTY_INVENTORY_ERROR);
        assert_eq!(json["count"], 0);

        let found = SearchOutcome::found(
            "oak",
            SearchType::Text,
            vec![SearchHit {
                item: CatalogItem::new("2", "Oak Dining Table"),
                score: None,
            }],
        );
        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["searchType"], "text");
        assert_eq!(json["results"][0]["item_name"], "Oak Dining Table");
        assert!(json.get("error").is_none());

        let back: SearchOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back.search_type(), Some(SearchType::Text));
    }

    #[tokio::test]
    async fn test_limits_apply_to_args() {
        let items = (0..30)
            .map(|i| CatalogItem::new(i.to_string(), format!("Chair {i}")))
            .collect();
        let tool = ItemLookupTool::new(Arc::new(InMemoryCatalog::new(items)), None).with_limits(4, 10);

        let args = ItemLookupArgs {
            query: "chair".into(),
            n: None,
        };
        assert_eq!(tool.lookup_args(&args).await.count(), 4);

        let args = ItemLookupArgs {
            query: "chair".into(),
            n: Some(25),
        };
        assert_eq!(tool.lookup_args(&args).await.count(), 10);
    }

    #[test]
    fn test_args_default_n() {
        let args: ItemLookupArgs = serde_json::from_str(r#"{"query":"lamp"}"#).unwrap();
        assert_eq!(args.n, None);
    }
}
