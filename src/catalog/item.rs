//! 商品记录
//!
//! 核心只要求记录可检索、可序列化；名称/描述/分类/检索文本之外的字段原样保留在 attributes 中。

use serde::{Deserialize, Serialize};

/// 单个商品（家具）记录
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    pub item_id: String,
    pub item_name: String,
    #[serde(default)]
    pub item_description: String,
    #[serde(default)]
    pub categories: Vec<String>,
    /// 预拼接的检索文本（名称 + 描述 + 属性摘要），也是向量化的原文
    #[serde(default)]
    pub embedding_text: String,
    /// 预计算的向量；不出现在工具返回给模型的 JSON 中
    #[serde(default, skip_serializing)]
    pub embedding: Option<Vec<f32>>,
    /// 品牌、价格、库存等其余字段
    #[serde(flatten)]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

impl CatalogItem {
    pub fn new(item_id: impl Into<String>, item_name: impl Into<String>) -> Self {
        Self {
            item_id: item_id.into(),
            item_name: item_name.into(),
            item_description: String::new(),
            categories: Vec::new(),
            embedding_text: String::new(),
            embedding: None,
            attributes: serde_json::Map::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.item_description = description.into();
        self
    }

    pub fn with_categories(mut self, categories: Vec<String>) -> Self {
        self.categories = categories;
        self
    }

    pub fn with_embedding_text(mut self, text: impl Into<String>) -> Self {
        self.embedding_text = text.into();
        self
    }

    pub fn with_embedding(mut self, embedding: Vec<f32>) -> Self {
        self.embedding = Some(embedding);
        self
    }

    /// 文本回退检索所覆盖的字段
    pub fn searchable_fields(&self) -> impl Iterator<Item = &str> {
        [
            self.item_name.as_str(),
            self.item_description.as_str(),
            self.embedding_text.as_str(),
        ]
        .into_iter()
        .chain(self.categories.iter().map(String::as_str))
    }

    pub fn has_embedding(&self) -> bool {
        self.embedding.as_ref().is_some_and(|e| !e.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extra_fields_are_kept() {
        let json = r#"{
            "item_id": "t-1",
            "item_name": "Oak Dining Table",
            "categories": ["Tables"],
            "prices": {"full_price": 899.0},
            "embedding": [0.1, 0.2]
        }"#;
        let item: CatalogItem = serde_json::from_str(json).unwrap();
        assert_eq!(item.item_name, "Oak Dining Table");
        assert!(item.has_embedding());
        assert!(item.attributes.contains_key("prices"));

        let out = serde_json::to_value(&item).unwrap();
        assert!(out.get("embedding").is_none());
        assert_eq!(out["prices"]["full_price"], 899.0);
    }
}
