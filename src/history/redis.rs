use async_trait::async_trait;
use crate::models::chat::{ ChatMessage, Conversation };
use crate::history::{ HistoryStore, StoreError };
use chrono::{ DateTime, Utc };
use log::{ error, info };
use redis::aio::ConnectionManager;
use redis::{ AsyncCommands, Client, RedisError, Script };
use tokio::sync::OnceCell;

/// Creates the document and pushes the greeting in one step, only when the
/// meta key did not exist yet. Returns 1 when it seeded.
const SEED_SCRIPT: &str = r"
if redis.call('SET', KEYS[1], ARGV[1], 'NX') then
    redis.call('RPUSH', KEYS[2], ARGV[2])
    return 1
end
return 0
";

/// Conversation store on Redis.
///
/// Each session uses two keys: `{prefix}{id}:meta` holds `created_at` and marks
/// that the document exists, `{prefix}{id}:messages` is a list of JSON messages
/// in append order. All calls share one reconnecting connection.
pub struct RedisHistoryStore {
    client: Client,
    manager: OnceCell<ConnectionManager>,
    seed_script: Script,
    key_prefix: String,
}

impl RedisHistoryStore {
    pub fn new(host: &str, key_prefix: &str) -> Result<Self, StoreError> {
        Ok(Self {
            client: Client::open(host)?,
            manager: OnceCell::new(),
            seed_script: Script::new(SEED_SCRIPT),
            key_prefix: key_prefix.to_string(),
        })
    }

    /// Connects on first use; later calls clone the shared manager.
    async fn get_connection(&self) -> Result<ConnectionManager, RedisError> {
        self.manager
            .get_or_try_init(|| async {
                let manager = ConnectionManager::new(self.client.clone()).await?;
                info!("Connected to Redis conversation store");
                Ok::<_, RedisError>(manager)
            }).await
            .cloned()
    }

    fn meta_key(&self, session_id: &str) -> String {
        format!("{}{}:meta", self.key_prefix, session_id)
    }

    fn messages_key(&self, session_id: &str) -> String {
        format!("{}{}:messages", self.key_prefix, session_id)
    }

    fn decode_messages(json_entries: &[String]) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(json_entries.len());
        for json_entry in json_entries {
            match serde_json::from_str::<ChatMessage>(json_entry) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    error!("Error parsing conversation entry: {}", e);
                }
            }
        }
        messages
    }
}

#[async_trait]
impl HistoryStore for RedisHistoryStore {
    async fn append_message(
        &self,
        session_id: &str,
        message: &ChatMessage
    ) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let json_msg = serde_json::to_string(message)?;

        redis::pipe()
            .atomic()
            .cmd("SET")
            .arg(self.meta_key(session_id))
            .arg(Utc::now().to_rfc3339())
            .arg("NX")
            .ignore()
            .rpush(self.messages_key(session_id), json_msg)
            .ignore()
            .query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn recent_messages(
        &self,
        session_id: &str,
        limit: usize
    ) -> Result<Vec<ChatMessage>, StoreError> {
        if limit == 0 {
            return Ok(Vec::new());
        }
        let mut conn = self.get_connection().await?;
        let json_entries: Vec<String> = conn
            .lrange(self.messages_key(session_id), -(limit as isize), -1).await?;
        Ok(Self::decode_messages(&json_entries))
    }

    async fn get_or_create(
        &self,
        session_id: &str,
        greeting: &str
    ) -> Result<Conversation, StoreError> {
        let mut conn = self.get_connection().await?;
        let meta_key = self.meta_key(session_id);
        let messages_key = self.messages_key(session_id);

        let seeded = Conversation::seeded(session_id, greeting);
        let json_greeting = serde_json::to_string(&seeded.messages[0])?;
        let created: i64 = self.seed_script
            .key(&meta_key)
            .key(&messages_key)
            .arg(seeded.created_at.to_rfc3339())
            .arg(json_greeting)
            .invoke_async(&mut conn).await?;
        if created == 1 {
            return Ok(seeded);
        }

        let (created_at, json_entries): (Option<String>, Vec<String>) = redis::pipe()
            .atomic()
            .get(&meta_key)
            .lrange(&messages_key, 0, -1)
            .query_async(&mut conn).await?;
        let created_at = match created_at {
            Some(raw) =>
                DateTime::parse_from_rfc3339(&raw)
                    .map_err(|e| StoreError::Corrupt {
                        session_id: session_id.to_string(),
                        reason: format!("bad created_at '{}': {}", raw, e),
                    })?
                    .with_timezone(&Utc),
            // Cleared between the seed check and the read.
            None => Utc::now(),
        };

        Ok(Conversation {
            session_id: session_id.to_string(),
            created_at,
            messages: Self::decode_messages(&json_entries),
        })
    }

    async fn delete_conversation(&self, session_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let keys = vec![self.meta_key(session_id), self.messages_key(session_id)];
        let _: i64 = conn.del(keys).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::chat::Role;

    /// Store on the server named by `REDIS_URL` under a fresh key prefix, or
    /// `None` when no server is configured.
    fn live_store(name: &str) -> Option<RedisHistoryStore> {
        let url = std::env::var("REDIS_URL").ok()?;
        let prefix = format!(
            "gateway-test:{}:{}:",
            name,
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        );
        Some(RedisHistoryStore::new(&url, &prefix).unwrap())
    }

    #[test]
    fn keys_are_prefixed_per_session() {
        let store = RedisHistoryStore::new("redis://127.0.0.1:6379", "conversation:").unwrap();
        assert_eq!(store.meta_key("abc"), "conversation:abc:meta");
        assert_eq!(store.messages_key("abc"), "conversation:abc:messages");
    }

    #[test]
    fn decode_skips_malformed_entries() {
        let good = serde_json::to_string(&ChatMessage::user("hi")).unwrap();
        let entries = vec![good, "not json".to_string()];
        let messages = RedisHistoryStore::decode_messages(&entries);
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "hi");
    }

    #[test]
    fn rejects_invalid_connection_string() {
        assert!(RedisHistoryStore::new("not a url", "p:").is_err());
    }

    #[tokio::test]
    async fn append_upserts_and_keeps_created_at() {
        let Some(store) = live_store("append") else {
            return;
        };
        store.append_message("s1", &ChatMessage::user("one")).await.unwrap();
        let first = store.get_or_create("s1", "hello").await.unwrap();
        assert_eq!(first.messages.len(), 1);
        assert_eq!(first.messages[0].role, Role::User);

        store.append_message("s1", &ChatMessage::assistant("two")).await.unwrap();
        let second = store.get_or_create("s1", "hello").await.unwrap();
        assert_eq!(second.created_at, first.created_at);
        assert_eq!(second.messages.len(), 2);
        assert_eq!(second.messages[1].role, Role::Assistant);

        store.delete_conversation("s1").await.unwrap();
    }

    #[tokio::test]
    async fn recent_messages_returns_tail() {
        let Some(store) = live_store("tail") else {
            return;
        };
        for i in 0..30 {
            store.append_message("s1", &ChatMessage::user(format!("m{}", i))).await.unwrap();
        }
        let recent = store.recent_messages("s1", 20).await.unwrap();
        assert_eq!(recent.len(), 20);
        assert_eq!(recent[0].content, "m10");
        assert_eq!(recent[19].content, "m29");

        assert!(store.recent_messages("missing", 20).await.unwrap().is_empty());
        store.delete_conversation("s1").await.unwrap();
    }

    #[tokio::test]
    async fn get_or_create_seeds_once() {
        let Some(store) = live_store("seed") else {
            return;
        };
        let first = store.get_or_create("s1", "hello").await.unwrap();
        let second = store.get_or_create("s1", "hello").await.unwrap();
        assert_eq!(second.messages.len(), 1);
        assert_eq!(second.messages[0].role, Role::Assistant);
        assert_eq!(second.messages[0].content, "hello");
        assert_eq!(
            second.created_at.timestamp_millis(),
            first.created_at.timestamp_millis()
        );

        store.delete_conversation("s1").await.unwrap();
    }

    #[tokio::test]
    async fn get_or_create_does_not_seed_existing_chat() {
        let Some(store) = live_store("noseed") else {
            return;
        };
        store.append_message("s1", &ChatMessage::user("hi")).await.unwrap();
        let conversation = store.get_or_create("s1", "hello").await.unwrap();
        assert_eq!(conversation.messages.len(), 1);
        assert_eq!(conversation.messages[0].role, Role::User);

        store.delete_conversation("s1").await.unwrap();
    }

    #[tokio::test]
    async fn greeting_never_lands_after_a_concurrent_append() {
        let Some(store) = live_store("race") else {
            return;
        };
        for i in 0..20 {
            let session = format!("s{}", i);
            let user = ChatMessage::user("hi");
            let (seed, append) = tokio::join!(
                store.get_or_create(&session, "hello"),
                store.append_message(&session, &user)
            );
            seed.unwrap();
            append.unwrap();

            let messages = store.get_or_create(&session, "hello").await.unwrap().messages;
            match messages.len() {
                1 => assert_eq!(messages[0].role, Role::User),
                2 => {
                    assert_eq!(messages[0].role, Role::Assistant);
                    assert_eq!(messages[1].role, Role::User);
                }
                n => panic!("unexpected message count {}", n),
            }
            store.delete_conversation(&session).await.unwrap();
        }
    }

    #[tokio::test]
    async fn delete_is_idempotent() {
        let Some(store) = live_store("delete") else {
            return;
        };
        store.append_message("s1", &ChatMessage::user("hi")).await.unwrap();
        store.delete_conversation("s1").await.unwrap();
        store.delete_conversation("s1").await.unwrap();
        assert!(store.recent_messages("s1", 20).await.unwrap().is_empty());

        // A cleared session is seeded again on the next visit.
        let reseeded = store.get_or_create("s1", "hello").await.unwrap();
        assert_eq!(reseeded.messages.len(), 1);
        assert_eq!(reseeded.messages[0].content, "hello");
        store.delete_conversation("s1").await.unwrap();
    }
}
