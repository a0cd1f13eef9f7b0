//! 异步 SQLite 检查点存储
//!
//! 使用 sqlx 提供完全异步的数据库操作，避免在 async 上下文中阻塞。
//! 需要启用 `async-sqlite` feature。消息表只 INSERT，不 UPDATE / DELETE。

#[cfg(feature = "async-sqlite")]
mod sqlx_impl {
    use std::path::Path;

    use async_trait::async_trait;
    use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
    use sqlx::Row;

    use crate::memory::{CheckpointStore, Conversation, Message, PersistenceError};

    /// 异步 SQLite 检查点存储
    pub struct SqliteCheckpointStore {
        pool: SqlitePool,
    }

    impl SqliteCheckpointStore {
        /// 打开（或创建）数据库文件并建表
        pub async fn new(db_path: impl AsRef<Path>) -> Result<Self, sqlx::Error> {
            let db_url = format!("sqlite:{}?mode=rwc", db_path.as_ref().display());

            let pool = SqlitePoolOptions::new()
                .max_connections(5)
                .connect(&db_url)
                .await?;

            Self::from_pool(pool).await
        }

        /// 从连接池创建
        pub async fn from_pool(pool: SqlitePool) -> Result<Self, sqlx::Error> {
            let store = Self { pool };
            store.init_tables().await?;
            Ok(store)
        }

        async fn init_tables(&self) -> Result<(), sqlx::Error> {
            sqlx::query(
                "CREATE TABLE IF NOT EXISTS threads (
                    id TEXT PRIMARY KEY,
                    created_at TEXT NOT NULL,
                    updated_at TEXT NOT NULL
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE TABLE IF NOT EXISTS thread_messages (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    thread_id TEXT NOT NULL,
                    seq INTEGER NOT NULL,
                    role TEXT NOT NULL,
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL,
                    UNIQUE (thread_id, seq),
                    FOREIGN KEY (thread_id) REFERENCES threads(id) ON DELETE CASCADE
                )",
            )
            .execute(&self.pool)
            .await?;

            sqlx::query(
                "CREATE INDEX IF NOT EXISTS idx_thread_messages_thread ON thread_messages(thread_id)",
            )
            .execute(&self.pool)
            .await?;

            Ok(())
        }
    }

    #[async_trait]
    impl CheckpointStore for SqliteCheckpointStore {
        async fn load(&self, thread_id: &str) -> Result<Option<Conversation>, PersistenceError> {
            let exists = sqlx::query("SELECT id FROM threads WHERE id = ?")
                .bind(thread_id)
                .fetch_optional(&self.pool)
                .await?;
            if exists.is_none() {
                return Ok(None);
            }

            let rows = sqlx::query(
                "SELECT body FROM thread_messages WHERE thread_id = ? ORDER BY seq ASC",
            )
            .bind(thread_id)
            .fetch_all(&self.pool)
            .await?;

            let mut messages = Vec::with_capacity(rows.len());
            for row in rows {
                let body: String = row.get("body");
                messages.push(serde_json::from_str::<Message>(&body)?);
            }
            Ok(Some(Conversation::with_messages(thread_id, messages)))
        }

        async fn save(&self, conversation: &Conversation) -> Result<(), PersistenceError> {
            let thread_id = conversation.thread_id.as_str();
            let now = chrono::Utc::now().to_rfc3339();
            let mut tx = self.pool.begin().await?;

            sqlx::query(
                "INSERT OR IGNORE INTO threads (id, created_at, updated_at) VALUES (?, ?, ?)",
            )
            .bind(thread_id)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await?;

            let rows = sqlx::query(
                "SELECT body FROM thread_messages WHERE thread_id = ? ORDER BY seq ASC",
            )
            .bind(thread_id)
            .fetch_all(&mut *tx)
            .await?;

            let incoming = conversation.messages();
            if rows.len() > incoming.len() {
                return Err(PersistenceError::NotAppendOnly(thread_id.to_string()));
            }
            for (row, msg) in rows.iter().zip(incoming) {
                let body: String = row.get("body");
                let stored: Message = serde_json::from_str(&body)?;
                if &stored != msg {
                    return Err(PersistenceError::NotAppendOnly(thread_id.to_string()));
                }
            }

            for (seq, msg) in incoming.iter().enumerate().skip(rows.len()) {
                sqlx::query(
                    "INSERT INTO thread_messages (thread_id, seq, role, body, created_at) VALUES (?, ?, ?, ?, ?)",
                )
                .bind(thread_id)
                .bind(seq as i64)
                .bind(msg.role.as_str())
                .bind(serde_json::to_string(msg)?)
                .bind(&now)
                .execute(&mut *tx)
                .await?;
            }

            sqlx::query("UPDATE threads SET updated_at = ? WHERE id = ?")
                .bind(&now)
                .bind(thread_id)
                .execute(&mut *tx)
                .await?;

            tx.commit().await?;
            Ok(())
        }
    }
}

#[cfg(feature = "async-sqlite")]
pub use sqlx_impl::SqliteCheckpointStore;

#[cfg(all(test, feature = "async-sqlite"))]
mod tests {
    use super::*;
    use crate::memory::{CheckpointStore, Conversation, Message, PersistenceError, Role, ToolCallIntent};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_sqlite_checkpoint_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCheckpointStore::new(dir.path().join("threads.db")).await.unwrap();

        assert!(store.load("t1").await.unwrap().is_none());

        let mut conv = Conversation::new("t1");
        conv.push(Message::user("sofa?"));
        conv.push(Message::assistant_with_tools(
            "",
            vec![ToolCallIntent::new("c1", "item_lookup", serde_json::json!({"query": "sofa"}))],
        ));
        conv.push(Message::tool("c1", r#"{"count":0}"#));
        conv.push(Message::assistant("No sofas right now."));
        store.save(&conv).await.unwrap();

        let loaded = store.load("t1").await.unwrap().unwrap();
        assert_eq!(loaded, conv);
        assert_eq!(loaded.messages()[2].role, Role::Tool);
    }

    #[tokio::test]
    async fn test_sqlite_checkpoint_append_only() {
        let dir = TempDir::new().unwrap();
        let store = SqliteCheckpointStore::new(dir.path().join("threads.db")).await.unwrap();

        let first = Conversation::with_messages("t1", vec![Message::user("Q1"), Message::assistant("A1")]);
        store.save(&first).await.unwrap();

        let mut second = first.clone();
        second.push(Message::user("Q2"));
        second.push(Message::assistant("A2"));
        store.save(&second).await.unwrap();
        assert_eq!(store.load("t1").await.unwrap().unwrap().len(), 4);

        let rewrite = Conversation::with_messages("t1", vec![Message::user("other")]);
        let err = store.save(&rewrite).await.unwrap_err();
        assert!(matches!(err, PersistenceError::NotAppendOnly(_)));
        assert_eq!(store.load("t1").await.unwrap().unwrap(), second);
    }
}
