pub mod backend;
pub mod gemini;

use async_trait::async_trait;
use serde::Deserialize;
use std::error::Error as StdError;
use std::sync::Arc;
use super::{ LlmConfig, LlmType };
use self::backend::HostedChatClient;
use self::gemini::GeminiChatClient;
use crate::models::chat::ChatMessage;

#[derive(Deserialize, Debug, Clone)]
pub struct CompletionResponse {
    pub response: String,
}

#[async_trait]
pub trait ChatClient: Send + Sync {
    /// Generates the next assistant turn for `history`, with `preamble` as the
    /// system instruction. `history` is ordered oldest first.
    async fn complete_chat(
        &self,
        preamble: &str,
        history: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>>;

    fn get_model(&self) -> String;
    fn get_llm_type(&self) -> LlmType;

    /// False when the client cannot possibly succeed, e.g. a hosted provider
    /// without an API key.
    fn is_configured(&self) -> bool;
}

pub fn new_client(
    config: &LlmConfig
) -> Result<Arc<dyn ChatClient>, Box<dyn StdError + Send + Sync>> {
    let client: Arc<dyn ChatClient> = match config.llm_type {
        LlmType::Gemini => {
            let specific_client = GeminiChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
        LlmType::OpenAI |
        LlmType::Anthropic |
        LlmType::Ollama |
        LlmType::DeepSeek |
        LlmType::XAI |
        LlmType::Groq => {
            let specific_client = HostedChatClient::from_config(config)?;
            Arc::new(specific_client)
        }
    };
    Ok(client)
}
