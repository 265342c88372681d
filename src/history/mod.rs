mod memory;
mod redis;

pub use memory::MemoryHistoryStore;
pub use self::redis::RedisHistoryStore;

use async_trait::async_trait;
use log::info;
use std::error::Error;
use std::sync::Arc;
use thiserror::Error;
use crate::cli::Args;
use crate::models::chat::{ ChatMessage, Conversation };

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("redis error: {0}")]
    Redis(#[from] ::redis::RedisError),

    #[error("stored message could not be encoded or decoded: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("corrupt conversation record for '{session_id}': {reason}")]
    Corrupt {
        session_id: String,
        reason: String,
    },
}

/// Persistence for conversation documents keyed by `session_id`.
///
/// Implementations must be safe to share across request tasks. Appends upsert
/// the document, so the first message of an unseen session creates it.
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Appends one message, creating the conversation with `created_at = now` if absent.
    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage
    ) -> Result<(), StoreError>;

    /// Returns at most `limit` of the newest messages, oldest first.
    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError>;

    /// Returns the full conversation, seeding an unseen session with a single
    /// assistant `greeting`.
    async fn get_or_create(
        &self,
        session_id: &str,
        greeting: &str
    ) -> Result<Conversation, StoreError>;

    /// Deletes the whole conversation. Deleting a missing one is not an error.
    async fn delete_conversation(&self, session_id: &str) -> Result<(), StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

pub fn create_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    match args.history_type.to_lowercase().as_str() {
        "redis" => {
            let store = RedisHistoryStore::new(&args.history_host, &args.history_redis_prefix)?;
            Ok(Arc::new(store))
        }
        "memory" => Ok(Arc::new(MemoryHistoryStore::new())),
        _ =>
            Err(
                Box::new(
                    std::io::Error::new(
                        std::io::ErrorKind::InvalidInput,
                        format!("Unsupported history store type: {}", args.history_type)
                    )
                )
            ),
    }
}

pub fn initialize_history_store(
    args: &Args
) -> Result<Arc<dyn HistoryStore>, Box<dyn Error + Send + Sync>> {
    info!("Conversations will be stored in: {} at {}", args.history_type, args.history_host);
    create_history_store(args)
}

/// The newest `limit` messages of `messages`, in their original order.
pub fn context_window(messages: &[ChatMessage], limit: usize) -> &[ChatMessage] {
    let start = messages.len().saturating_sub(limit);
    &messages[start..]
}
