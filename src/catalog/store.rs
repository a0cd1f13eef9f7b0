//! 商品库抽象
//!
//! CatalogStore 提供三种操作：count（总数）、find（按文本过滤，保留存储顺序）、
//! vector_search（按向量相似度，降序）。向量索引缺失时返回 IndexUnavailable，由检索工具降级为文本检索。

use async_trait::async_trait;
use regex::{Regex, RegexBuilder};
use thiserror::Error;

use crate::catalog::CatalogItem;

/// 商品库错误
#[derive(Error, Debug)]
pub enum CatalogError {
    /// 向量索引不可用（未建索引 / 维度不匹配），可降级为文本检索
    #[error("Vector index unavailable: {0}")]
    IndexUnavailable(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Catalog JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[cfg(feature = "async-sqlite")]
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// 文本过滤：大小写不敏感，匹配 名称 / 描述 / 检索文本 / 分类 任一字段
#[derive(Debug, Clone)]
pub struct TextFilter {
    query: String,
    phrase: Option<Regex>,
    terms: Vec<Regex>,
}

impl TextFilter {
    pub fn new(query: &str) -> Self {
        let query = query.trim().to_string();
        let phrase = case_insensitive(&query);
        let terms = query
            .split_whitespace()
            .filter_map(case_insensitive)
            .collect();
        Self {
            query,
            phrase,
            terms,
        }
    }

    pub fn query(&self) -> &str {
        &self.query
    }

    /// 整句出现在任一字段中
    pub fn matches_phrase(&self, item: &CatalogItem) -> bool {
        match &self.phrase {
            Some(phrase) if !self.query.is_empty() => {
                item.searchable_fields().any(|f| phrase.is_match(f))
            }
            _ => false,
        }
    }

    /// 每个词都至少出现在某一字段中
    pub fn matches_all_terms(&self, item: &CatalogItem) -> bool {
        !self.terms.is_empty()
            && self
                .terms
                .iter()
                .all(|t| item.searchable_fields().any(|f| t.is_match(f)))
    }

    /// 先按整句过滤；整句无结果时退化为「全部词命中」，两者都保留输入顺序并截断到 limit
    pub fn apply<'a, I>(&self, items: I, limit: usize) -> Vec<CatalogItem>
    where
        I: IntoIterator<Item = &'a CatalogItem>,
        I::IntoIter: Clone,
    {
        let iter = items.into_iter();
        let phrase_hits: Vec<CatalogItem> = iter
            .clone()
            .filter(|i| self.matches_phrase(i))
            .take(limit)
            .cloned()
            .collect();
        if !phrase_hits.is_empty() || self.terms.len() < 2 {
            return phrase_hits;
        }
        iter.filter(|i| self.matches_all_terms(i))
            .take(limit)
            .cloned()
            .collect()
    }
}

fn case_insensitive(literal: &str) -> Option<Regex> {
    RegexBuilder::new(&regex::escape(literal))
        .case_insensitive(true)
        .build()
        .ok()
}

/// 余弦相似度；维度不一致或零向量返回 None
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    if a.is_empty() || a.len() != b.len() {
        return None;
    }
    let (mut dot, mut na, mut nb) = (0.0f32, 0.0f32, 0.0f32);
    for (x, y) in a.iter().zip(b) {
        dot += x * y;
        na += x * x;
        nb += y * y;
    }
    if na == 0.0 || nb == 0.0 {
        return None;
    }
    Some(dot / (na.sqrt() * nb.sqrt()))
}

/// 按相似度降序排列并截断（稳定排序，同分保持原顺序）
pub fn rank_by_score(mut scored: Vec<(CatalogItem, f32)>, limit: usize) -> Vec<(CatalogItem, f32)> {
    scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
    scored.truncate(limit);
    scored
}

/// 商品库接口（文档集合）
#[async_trait]
pub trait CatalogStore: Send + Sync {
    /// 商品总数
    async fn count(&self) -> Result<usize, CatalogError>;

    /// 文本过滤，保留存储迭代顺序，最多 limit 条
    async fn find(&self, filter: &TextFilter, limit: usize) -> Result<Vec<CatalogItem>, CatalogError>;

    /// 向量相似度检索，按分数降序，最多 limit 条；没有向量的商品不参与
    async fn vector_search(
        &self,
        vector: &[f32],
        limit: usize,
    ) -> Result<Vec<(CatalogItem, f32)>, CatalogError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> CatalogItem {
        CatalogItem::new("1", "Oak Dining Table")
            .with_description("Solid oak, seats six")
            .with_categories(vec!["Dining Room".into()])
    }

    #[test]
    fn test_phrase_match_is_case_insensitive() {
        let f = TextFilter::new("OAK dining");
        assert!(f.matches_phrase(&table()));
        assert!(TextFilter::new("dining room").matches_phrase(&table()));
        assert!(!TextFilter::new("walnut").matches_phrase(&table()));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let item = CatalogItem::new("2", "Chair (v2)");
        assert!(TextFilter::new("(v2)").matches_phrase(&item));
        assert!(!TextFilter::new("Chair.*").matches_phrase(&item));
    }

    #[test]
    fn test_apply_falls_back_to_terms() {
        let items = vec![table(), CatalogItem::new("2", "Oak Bookshelf")];
        let hits = TextFilter::new("oak table").apply(&items, 10);
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].item_id, "1");

        let phrase_hits = TextFilter::new("oak").apply(&items, 10);
        assert_eq!(phrase_hits.len(), 2);
        assert_eq!(TextFilter::new("oak").apply(&items, 1).len(), 1);
    }

    #[test]
    fn test_cosine_similarity() {
        assert!((cosine_similarity(&[1.0, 0.0], &[1.0, 0.0]).unwrap() - 1.0).abs() < 1e-6);
        assert!(cosine_similarity(&[1.0, 0.0], &[0.0, 1.0]).unwrap().abs() < 1e-6);
        assert!(cosine_similarity(&[1.0], &[1.0, 2.0]).is_none());
        assert!(cosine_similarity(&[0.0, 0.0], &[1.0, 2.0]).is_none());
    }

    #[test]
    fn test_rank_by_score_desc() {
        let ranked = rank_by_score(
            vec![
                (CatalogItem::new("a", "A"), 0.2),
                (CatalogItem::new("b", "B"), 0.9),
                (CatalogItem::new("c", "C"), 0.5),
            ],
            2,
        );
        let ids: Vec<_> = ranked.iter().map(|(i, _)| i.item_id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c"]);
    }
}
