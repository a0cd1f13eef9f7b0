//! 内存商品库
//!
//! 可直接构造，也可从 JSON 文件（商品数组）加载；向量检索为全量余弦相似度扫描。

use std::path::Path;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::catalog::{
    cosine_similarity, rank_by_score, CatalogError, CatalogItem, CatalogStore, TextFilter,
};

#[derive(Default)]
pub struct InMemoryCatalog {
    items: RwLock<Vec<CatalogItem>>,
}

impl InMemoryCatalog {
    pub fn new(items: Vec<CatalogItem>) -> Self {
        Self {
            items: RwLock::new(items),
        }
    }

    /// 从 JSON 文件加载；文件不存在时得到空商品库（等待导入）
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let items: Vec<CatalogItem> = match tokio::fs::read_to_string(path).await {
            Ok(data) => serde_json::from_str(&data)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "catalog file not found, starting empty");
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };
        tracing::info!(path = %path.display(), items = items.len(), "catalog loaded");
        Ok(Self::new(items))
    }

    pub async fn insert(&self, item: CatalogItem) {
        self.items.write().await.push(item);
    }
}

#[async_trait]
impl CatalogStore for InMemoryCatalog {
    async fn count(&self) -> Result<usize, CatalogError> {
        Ok(self.items.read().await.len())
    }

    async fn find(&self, filter: &TextFilter, limit: usize) -> Result<Vec<CatalogItem>, CatalogError> {
        let items = self.items.read().await;
        Ok(filter.apply(items.iter(), limit))
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(CatalogItem, f32)>, CatalogError> {
        let items = self.items.read().await;
        let scored = items
            .iter()
            .filter_map(|item| {
                let embedding = item.embedding.as_deref()?;
                cosine_similarity(vector, embedding).map(|s| (item.clone(), s))
            })
            .collect();
        Ok(rank_by_score(scored, limit))
    }
}
