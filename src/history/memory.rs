use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use crate::history::{ context_window, HistoryStore, StoreError };
use crate::models::chat::{ ChatMessage, Conversation };

/// Process-local store. Conversations are lost on restart.
#[derive(Default)]
pub struct MemoryHistoryStore {
    conversations: RwLock<HashMap<String, Conversation>>,
}

impl MemoryHistoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.conversations.read().await.len()
    }

    pub async fn conversation(&self, session_id: &str) -> Option<Conversation> {
        self.conversations.read().await.get(session_id).cloned()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage
    ) -> Result<(), StoreError> {
        let mut conversations = self.conversations.write().await;
        conversations
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation::new(session_id))
            .messages.push(message.clone());
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        let conversations = self.conversations.read().await;
        Ok(
            conversations
                .get(session_id)
                .map(|c| context_window(&c.messages, limit).to_vec())
                .unwrap_or_default()
        )
    }

    async fn get_or_create(
        &self,
        session_id: &str,
        greeting: &str
    ) -> Result<Conversation, StoreError> {
        let mut conversations = self.conversations.write().await;
        let conversation = conversations
            .entry(session_id.to_string())
            .or_insert_with(|| Conversation::seeded(session_id, greeting));
        Ok(conversation.clone())
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<(), StoreError> {
        self.conversations.write().await.remove(session_id);
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
