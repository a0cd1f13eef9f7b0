//! 商品库：商品记录、文本过滤 / 向量相似度、内存与 SQLite 实现

pub mod item;
pub mod memory;
#[cfg(feature = "async-sqlite")]
pub mod sqlite;
pub mod store;

pub use item::CatalogItem;
pub use memory::InMemoryCatalog;
#[cfg(feature = "async-sqlite")]
pub use sqlite::SqliteCatalog;
pub use store::{cosine_similarity, rank_by_score, CatalogError, CatalogStore, TextFilter};
