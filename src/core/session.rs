//! 会话管理：thread id -> 只追加的对话历史
//!
//! resume 加载历史、追加用户消息、在副本上跑完 AgentGraph，成功后才整体持久化；
//! 失败时已存储的历史保持不变。同一 thread id 的请求通过每线程一把的异步锁串行化。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use uuid::Uuid;

use crate::core::AgentError;
use crate::memory::{validate_thread_id, CheckpointStore, Conversation, Message};
use crate::react::AgentGraph;

/// 一次对话轮次的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    pub thread_id: String,
    pub answer: String,
}

type ThreadLocks = Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>;

pub struct SessionManager {
    graph: Arc<AgentGraph>,
    store: Arc<dyn CheckpointStore>,
    thread_locks: ThreadLocks,
}

/// 某个 thread 的锁占位；Drop 时若已无其他请求引用则从表中移除，
/// 请求 future 被丢弃（客户端断开、超时中止）时同样生效
struct ThreadSlot<'a> {
    locks: &'a ThreadLocks,
    thread_id: String,
    lock: Arc<tokio::sync::Mutex<()>>,
}

impl Drop for ThreadSlot<'_> {
    fn drop(&mut self) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // 克隆只发生在持有表锁时：表与本 slot 各一份即无人等待
        let idle = locks
            .get(&self.thread_id)
            .is_some_and(|lock| Arc::ptr_eq(lock, &self.lock) && Arc::strong_count(lock) == 2);
        if idle {
            locks.remove(&self.thread_id);
        }
    }
}

impl SessionManager {
    pub fn new(graph: Arc<AgentGraph>, store: Arc<dyn CheckpointStore>) -> Self {
        Self {
            graph,
            store,
            thread_locks: Mutex::new(HashMap::new()),
        }
    }

    /// 新 thread id（uuid v4）
    pub fn new_thread_id() -> String {
        Uuid::new_v4().to_string()
    }

    /// 继续（或开始）一个对话；thread_id 为 None 时分配新的
    pub async fn resume(&self, thread_id: Option<&str>, message: &str) -> Result<ChatReply, AgentError> {
        if message.trim().is_empty() {
            return Err(AgentError::InvalidInput("message is required".to_string()));
        }
        let thread_id = match thread_id {
            Some(id) => {
                validate_thread_id(id)?;
                id.to_string()
            }
            None => Self::new_thread_id(),
        };

        let slot = self.thread_slot(&thread_id);
        let result = {
            let _guard = slot.lock.lock().await;
            self.run_turn(&thread_id, message).await
        };
        drop(slot);

        result.map(|answer| ChatReply { thread_id, answer })
    }

    async fn run_turn(&self, thread_id: &str, message: &str) -> Result<String, AgentError> {
        let previous = self.store.load(thread_id).await?;
        let prior_len = previous.as_ref().map(Conversation::len).unwrap_or(0);
        tracing::info!(thread_id = %thread_id, prior_messages = prior_len, "resuming thread");

        let mut messages = previous.map(Conversation::into_messages).unwrap_or_default();
        messages.push(Message::user(message));

        let run = match self.graph.run(&mut messages).await {
            Ok(run) => run,
            Err(e) => {
                tracing::error!(thread_id = %thread_id, error = %e, "agent run failed, history left untouched");
                return Err(e);
            }
        };

        let conversation = Conversation::with_messages(thread_id, messages);
        self.store.save(&conversation).await?;
        tracing::info!(
            thread_id = %thread_id,
            steps = run.steps,
            messages = conversation.len(),
            "thread saved"
        );
        Ok(run.answer)
    }

    /// 读取已持久化的对话
    pub async fn history(&self, thread_id: &str) -> Result<Option<Conversation>, AgentError> {
        validate_thread_id(thread_id)?;
        Ok(self.store.load(thread_id).await?)
    }

    fn thread_slot(&self, thread_id: &str) -> ThreadSlot<'_> {
        let mut locks = self
            .thread_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let lock = locks
            .entry(thread_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        ThreadSlot {
            locks: &self.thread_locks,
            thread_id: thread_id.to_string(),
            lock,
        }
    }

    pub fn active_threads(&self) -> usize {
        self.thread_locks.lock().map(|l| l.len()).unwrap_or_default()
    }
}
