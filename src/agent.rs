use crate::cli::{ Args, StoreFailurePolicy };
use crate::config::prompt::{ self, PromptConfig };
use crate::history::{ initialize_history_store, HistoryStore, StoreError };
use crate::llm::LlmConfig;
use crate::llm::chat::{ ChatClient, new_client as new_chat_client };
use crate::models::chat::{ ChatMessage, Conversation };

use dashmap::DashMap;
use log::{ info, warn, error };
use std::error::Error;
use std::sync::Arc;
use tokio::sync::{ Mutex, OwnedMutexGuard };

/// Number of stored messages handed to the model on each turn.
pub const CONTEXT_WINDOW_LEN: usize = 20;

/// Conversation gateway core: persists both sides of every exchange and
/// talks to the model. Shared by all request tasks behind an `Arc`.
pub struct ChatAgent {
    chat_client: Arc<dyn ChatClient>,
    history_store: Arc<dyn HistoryStore>,
    prompts: PromptConfig,
    policy: StoreFailurePolicy,
    serialize_sessions: bool,
    session_locks: DashMap<String, Arc<Mutex<()>>>,
}

/// Holds a session's turn lock and prunes the map entry once nobody waits on it.
struct SessionGuard<'a> {
    locks: &'a DashMap<String, Arc<Mutex<()>>>,
    session_id: String,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for SessionGuard<'_> {
    fn drop(&mut self) {
        // Release first so our own Arc is the only reference left when idle.
        drop(self.guard.take());
        self.locks.remove_if(&self.session_id, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl ChatAgent {
    pub fn new(
        chat_client: Arc<dyn ChatClient>,
        history_store: Arc<dyn HistoryStore>,
        prompts: PromptConfig,
        policy: StoreFailurePolicy,
        serialize_sessions: bool
    ) -> Self {
        Self {
            chat_client,
            history_store,
            prompts,
            policy,
            serialize_sessions,
            session_locks: DashMap::new(),
        }
    }

    pub async fn from_args(args: &Args) -> Result<Self, Box<dyn Error + Send + Sync>> {
        let chat_config = LlmConfig::from_args(args)?;
        let chat_client = new_chat_client(&chat_config)?;
        info!(
            "Chat client configured: Type={}, Model={}, BaseURL={:?}",
            chat_config.llm_type,
            chat_client.get_model(),
            chat_config.base_url.as_deref().unwrap_or("adapter default")
        );
        if !chat_client.is_configured() {
            warn!("Chat model has no API key; every reply will be the apology text.");
        }

        let history_store = initialize_history_store(args)?;
        if let Err(e) = history_store.ping().await {
            warn!("Conversation store not reachable at startup: {}", e);
        }

        let prompts = prompt::resolve_prompts(args.prompts_path.as_deref())?;

        Ok(
            Self::new(
                chat_client,
                history_store,
                prompts,
                args.store_failure_policy,
                args.serialize_sessions
            )
        )
    }

    pub fn chat_client(&self) -> &Arc<dyn ChatClient> {
        &self.chat_client
    }

    pub fn history_store(&self) -> &Arc<dyn HistoryStore> {
        &self.history_store
    }

    async fn lock_session(&self, session_id: &str) -> Option<SessionGuard<'_>> {
        if !self.serialize_sessions {
            return None;
        }
        let lock = self.session_locks
            .entry(session_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        let guard = lock.lock_owned().await;
        Some(SessionGuard {
            locks: &self.session_locks,
            session_id: session_id.to_string(),
            guard: Some(guard),
        })
    }

    /// Applies the store failure policy: under best-effort the error is logged
    /// and `Ok(None)` lets the caller fall back.
    fn tolerate<T>(&self, what: &str, result: Result<T, StoreError>) -> Result<Option<T>, StoreError> {
        match result {
            Ok(v) => Ok(Some(v)),
            Err(e) =>
                match self.policy {
                    StoreFailurePolicy::BestEffort => {
                        warn!("[DB] Failed to {}: {}", what, e);
                        Ok(None)
                    }
                    StoreFailurePolicy::Strict => {
                        error!("[DB] Failed to {}: {}", what, e);
                        Err(e)
                    }
                }
        }
    }

    /// Asks the model for the next turn. Never fails: errors and blank answers
    /// turn into the apology text.
    async fn generate_reply(&self, session_id: &str, context: &[ChatMessage]) -> String {
        info!(
            "[AI] Invoking model with {} messages. Session={}",
            context.len() + 1,
            session_id
        );
        match self.chat_client.complete_chat(&self.prompts.identity_preamble, context).await {
            Ok(resp) if !resp.response.trim().is_empty() => resp.response,
            Ok(_) => {
                error!("GenAI invocation returned an empty reply. Session={}", session_id);
                self.prompts.apology.clone()
            }
            Err(e) => {
                error!("GenAI invocation error: {}", e);
                self.prompts.apology.clone()
            }
        }
    }

    /// Stores the user's message, asks the model with the last
    /// [`CONTEXT_WINDOW_LEN`] messages as context and stores the reply.
    pub async fn send_message(&self, session_id: &str, message: &str) -> Result<String, StoreError> {
        let _turn = self.lock_session(session_id).await;

        let user_msg = ChatMessage::user(message);
        let appended = self
            .tolerate(
                "save user message",
                self.history_store.append_message(session_id, &user_msg).await
            )?
            .is_some();

        let recent = self.tolerate(
            "fetch conversation history",
            self.history_store.recent_messages(session_id, CONTEXT_WINDOW_LEN).await
        )?;
        let mut context = match recent {
            Some(messages) if appended => messages,
            Some(mut messages) => {
                messages.push(user_msg);
                messages
            }
            None => vec![user_msg],
        };
        let excess = context.len().saturating_sub(CONTEXT_WINDOW_LEN);
        context.drain(..excess);

        let reply = self.generate_reply(session_id, &context).await;

        self.tolerate(
            "save AI response",
            self.history_store.append_message(session_id, &ChatMessage::assistant(&reply)).await
        )?;

        Ok(reply)
    }

    /// Returns the conversation, creating it with the greeting on first visit.
    pub async fn get_history(&self, session_id: &str) -> Result<Conversation, StoreError> {
        let conversation = self.tolerate(
            "get messages",
            self.history_store.get_or_create(session_id, &self.prompts.greeting).await
        )?;
        Ok(conversation.unwrap_or_else(|| Conversation::new(session_id)))
    }

    pub async fn clear_history(&self, session_id: &str) -> Result<(), StoreError> {
        let _turn = self.lock_session(session_id).await;
        self.tolerate("clear session", self.history_store.delete_conversation(session_id).await)?;
        info!("Session {} cleared", session_id);
        Ok(())
    }

    #[cfg(test)]
    fn tracked_sessions(&self) -> usize {
        self.session_locks.len()
    }
}
