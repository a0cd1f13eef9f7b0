//! 对话检查点持久化
//!
//! CheckpointStore 按 thread_id 读写整段对话。提供内存实现与「每线程一个 JSON 文件」实现；
//! SQLite 实现见 async_persistence（需 `async-sqlite` feature）。
//! 所有实现都拒绝非追加式写入：新对话必须以已存储对话为前缀。

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::RwLock;

use crate::memory::Conversation;

/// 检查点存储错误
#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid thread id: {0}")]
    InvalidThreadId(String),

    /// 写入的对话不是已存储对话的追加
    #[error("Conversation for thread {0} is not an append of the stored one")]
    NotAppendOnly(String),

    #[cfg(feature = "async-sqlite")]
    #[error("SQLite error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

/// 检查点存储接口
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    /// 加载线程对话；不存在时返回 None
    async fn load(&self, thread_id: &str) -> Result<Option<Conversation>, PersistenceError>;

    /// 保存线程对话（整段），必须是已存储对话的追加
    async fn save(&self, conversation: &Conversation) -> Result<(), PersistenceError>;
}

/// thread_id 只允许字母、数字、`-`、`_`，避免文件名逃逸
pub fn validate_thread_id(thread_id: &str) -> Result<(), PersistenceError> {
    let ok = !thread_id.is_empty()
        && thread_id.len() <= 128
        && thread_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
    if ok {
        Ok(())
    } else {
        Err(PersistenceError::InvalidThreadId(thread_id.to_string()))
    }
}

fn ensure_append(
    previous: Option<&Conversation>,
    next: &Conversation,
) -> Result<(), PersistenceError> {
    match previous {
        Some(prev) if !prev.is_prefix_of(next) => {
            Err(PersistenceError::NotAppendOnly(next.thread_id.clone()))
        }
        _ => Ok(()),
    }
}

/// 内存检查点存储：进程内有效，适合测试与单机开发
#[derive(Default)]
pub struct MemoryCheckpointStore {
    threads: RwLock<HashMap<String, Conversation>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn thread_count(&self) -> usize {
        self.threads.read().await.len()
    }
}

#[async_trait]
impl CheckpointStore for MemoryCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Conversation>, PersistenceError> {
        Ok(self.threads.read().await.get(thread_id).cloned())
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        let mut threads = self.threads.write().await;
        ensure_append(threads.get(&conversation.thread_id), conversation)?;
        threads.insert(conversation.thread_id.clone(), conversation.clone());
        Ok(())
    }
}

/// 文件检查点存储：`<dir>/<thread_id>.json`，先写临时文件再 rename，保证不会留下半截文件
#[derive(Debug)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            dir: dir.as_ref().to_path_buf(),
        }
    }

    pub fn thread_path(&self, thread_id: &str) -> Result<PathBuf, PersistenceError> {
        validate_thread_id(thread_id)?;
        Ok(self.dir.join(format!("{}.json", thread_id)))
    }

    async fn read(&self, path: &Path) -> Result<Option<Conversation>, PersistenceError> {
        match tokio::fs::read_to_string(path).await {
            Ok(data) => Ok(Some(serde_json::from_str(&data)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl CheckpointStore for FileCheckpointStore {
    async fn load(&self, thread_id: &str) -> Result<Option<Conversation>, PersistenceError> {
        let path = self.thread_path(thread_id)?;
        self.read(&path).await
    }

    async fn save(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
        let path = self.thread_path(&conversation.thread_id)?;
        let previous = self.read(&path).await?;
        ensure_append(previous.as_ref(), conversation)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension(format!("json.{}.tmp", uuid::Uuid::new_v4().simple()));
        tokio::fs::write(&tmp, serde_json::to_string_pretty(conversation)?).await?;
        if let Err(e) = tokio::fs::rename(&tmp, &path).await {
            let _ = tokio::fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::Message;
    use tempfile::TempDir;

    fn conversation(thread_id: &str, contents: &[&str]) -> Conversation {
        Conversation::with_messages(
            thread_id,
            contents.iter().map(|c| Message::user(*c)).collect(),
        )
    }

    #[test]
    fn test_validate_thread_id() {
        assert!(validate_thread_id("1718000000000").is_ok());
        assert!(validate_thread_id("a1b2-c3_d4").is_ok());
        assert!(validate_thread_id("").is_err());
        assert!(validate_thread_id("../etc/passwd").is_err());
        assert!(validate_thread_id("a/b").is_err());
    }

    #[tokio::test]
    async fn test_memory_store_roundtrip() {
        let store = MemoryCheckpointStore::new();
        assert!(store.load("t1").await.unwrap().is_none());

        store.save(&conversation("t1", &["a"])).await.unwrap();
        store.save(&conversation("t1", &["a", "b"])).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.len(), 2);
        assert_eq!(store.thread_count().await, 1);
    }

    #[tokio::test]
    async fn test_memory_store_rejects_rewrite() {
        let store = MemoryCheckpointStore::new();
        store.save(&conversation("t1", &["a", "b"])).await.unwrap();

        let err = store.save(&conversation("t1", &["x"])).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotAppendOnly(_)));
        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.messages()[0].content, "a");
    }

    #[tokio::test]
    async fn test_file_store_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path().join("threads"));

        assert!(store.load("t1").await.unwrap().is_none());
        store.save(&conversation("t1", &["hello"])).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded.thread_id, "t1");
        assert_eq!(loaded.messages()[0].content, "hello");
        assert!(dir.path().join("threads/t1.json").exists());
    }

    #[tokio::test]
    async fn test_file_store_rejects_path_escape() {
        let dir = TempDir::new().unwrap();
        let store = FileCheckpointStore::new(dir.path());
        let err = store.load("../outside").await.unwrap_err();
        assert!(matches!(err, PersistenceError::InvalidThreadId(_)));
    }
}
