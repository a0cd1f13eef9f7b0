//! 记忆层：对话数据模型（短期）与按线程的检查点持久化

pub mod async_persistence;
pub mod conversation;
pub mod persistence;

#[cfg(feature = "async-sqlite")]
pub use async_persistence::SqliteCheckpointStore;
pub use conversation::{Conversation, Message, Role, ToolCallIntent};
pub use persistence::{
    validate_thread_id, CheckpointStore, FileCheckpointStore, MemoryCheckpointStore,
    PersistenceError,
};
