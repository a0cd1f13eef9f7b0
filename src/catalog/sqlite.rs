//! SQLite 商品库（需 `async-sqlite` feature）
//!
//! items 表：body 为商品 JSON，embedding 为向量 JSON（可空）。
//! 文本检索与向量检索在 Rust 侧完成，按 rowid 顺序扫描。

use std::path::Path;

use async_trait::async_trait;
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use sqlx::Row;

use crate::catalog::{
    cosine_similarity, rank_by_score, CatalogError, CatalogItem, CatalogStore, TextFilter,
};

pub struct SqliteCatalog {
    pool: SqlitePool,
}

impl SqliteCatalog {
    pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, CatalogError> {
        let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(&db_url)
            .await?;
        let catalog = Self { pool };
        catalog.init_tables().await?;
        Ok(catalog)
    }

    async fn init_tables(&self) -> Result<(), CatalogError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS items (
                id TEXT PRIMARY KEY,
                body TEXT NOT NULL,
                embedding TEXT
            )",
        )
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// 写入或覆盖一个商品（导入流程使用）
    pub async fn upsert(&self, item: &CatalogItem) -> Result<(), CatalogError> {
        let embedding = match &item.embedding {
            Some(e) if !e.is_empty() => Some(serde_json::to_string(e)?),
            _ => None,
        };
        sqlx::query("INSERT OR REPLACE INTO items (id, body, embedding) VALUES (?, ?, ?)")
            .bind(&item.item_id)
            .bind(serde_json::to_string(item)?)
            .bind(embedding)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    fn decode(body: &str, embedding: Option<String>) -> Result<CatalogItem, CatalogError> {
        let mut item: CatalogItem = serde_json::from_str(body)?;
        item.embedding = match embedding {
            Some(e) => Some(serde_json::from_str(&e)?),
            None => None,
        };
        Ok(item)
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn count(&self) -> Result<usize, CatalogError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM items")
            .fetch_one(&self.pool)
            .await?;
        let n: i64 = row.get("n");
        Ok(n.max(0) as usize)
    }

    async fn find(&self, filter: &TextFilter, limit: usize) -> Result<Vec<CatalogItem>, CatalogError> {
        let rows = sqlx::query("SELECT body FROM items ORDER BY rowid ASC")
            .fetch_all(&self.pool)
            .await?;
        let mut items = Vec::with_capacity(rows.len());
        for row in rows {
            let body: String = row.get("body");
            items.push(Self::decode(&body, None)?);
        }
        Ok(filter.apply(items.iter(), limit))
    }

    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(CatalogItem, f32)>, CatalogError> {
        let rows = sqlx::query(
            "SELECT body, embedding FROM items WHERE embedding IS NOT NULL ORDER BY rowid ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        let mut scored = Vec::new();
        for row in rows {
            let body: String = row.get("body");
            let embedding: Option<String> = row.get("embedding");
            let item = Self::decode(&body, embedding)?;
            if let Some(score) = item.embedding.as_deref().and_then(|e| cosine_similarity(vector, e)) {
                scored.push((item, score));
            }
        }
        Ok(rank_by_score(scored, limit))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_catalog_search_paths() {
        let dir = TempDir::new().unwrap();
        let catalog = SqliteCatalog::new(dir.path().join("catalog.db")).await.unwrap();
        assert_eq!(catalog.count().await.unwrap(), 0);

        catalog
            .upsert(&CatalogItem::new("1", "Oak Dining Table").with_embedding(vec![1.0, 0.0]))
            .await
            .unwrap();
        catalog
            .upsert(&CatalogItem::new("2", "Velvet Sofa").with_embedding(vec![0.0, 1.0]))
            .await
            .unwrap();
        catalog.upsert(&CatalogItem::new("3", "Oak Stool")).await.unwrap();

        assert_eq!(catalog.count().await.unwrap(), 3);

        let hits = catalog.vector_search(&[0.1, 0.9], 5).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].0.item_id, "2");

        let found = catalog.find(&TextFilter::new("oak"), 5).await.unwrap();
        let ids: Vec<_> = found.iter().map(|i| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["1", "3"]);
    }
}
