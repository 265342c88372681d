use async_trait::async_trait;
use std::error::Error as StdError;
use std::time::Duration;
use log::info;

use super::{ ChatClient, CompletionResponse };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ ChatMessage, Role };
use rllm::builder::{ LLMBackend, LLMBuilder };
use rllm::chat::{ ChatMessage as RllmMessage, ChatRole, MessageType };

fn default_model(llm_type: LlmType) -> &'static str {
    match llm_type {
        LlmType::OpenAI => "gpt-4o-mini",
        LlmType::Anthropic => "claude-3-5-haiku-latest",
        LlmType::Ollama => "llama3",
        LlmType::DeepSeek => "deepseek-chat",
        LlmType::XAI => "grok-2-latest",
        LlmType::Groq => "llama-3.1-8b-instant",
        LlmType::Gemini => "gemini-1.5-flash",
    }
}

fn backend_for(llm_type: LlmType) -> LLMBackend {
    match llm_type {
        LlmType::OpenAI => LLMBackend::OpenAI,
        LlmType::Anthropic => LLMBackend::Anthropic,
        LlmType::Ollama => LLMBackend::Ollama,
        LlmType::DeepSeek => LLMBackend::DeepSeek,
        LlmType::XAI => LLMBackend::XAI,
        LlmType::Groq => LLMBackend::Groq,
        LlmType::Gemini => LLMBackend::Google,
    }
}

fn to_rllm_messages(history: &[ChatMessage]) -> Vec<RllmMessage> {
    history
        .iter()
        .map(|msg| RllmMessage {
            role: match msg.role {
                Role::User => ChatRole::User,
                Role::Assistant => ChatRole::Assistant,
            },
            content: msg.content.clone(),
            message_type: MessageType::Text,
        })
        .collect()
}

/// Chat client for the hosted providers rllm speaks to. The provider is built
/// per call so the preamble travels as the system prompt.
pub struct HostedChatClient {
    llm_type: LlmType,
    api_key: String,
    model: String,
    base_url: Option<String>,
    temperature: Option<f32>,
    timeout: Option<Duration>,
}

impl HostedChatClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        Ok(Self {
            llm_type: config.llm_type,
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.completion_model
                .clone()
                .unwrap_or_else(|| default_model(config.llm_type).to_string()),
            base_url: config.base_url.clone(),
            temperature: config.temperature,
            timeout: config.timeout_secs.map(Duration::from_secs),
        })
    }

    async fn chat_once(
        &self,
        preamble: &str,
        history: &[ChatMessage]
    ) -> Result<String, Box<dyn StdError + Send + Sync>> {
        let mut builder = LLMBuilder::new()
            .backend(backend_for(self.llm_type))
            .api_key(self.api_key.clone())
            .model(&self.model)
            .system(preamble)
            .stream(false);

        if let Some(url) = &self.base_url {
            builder = builder.base_url(url);
        }
        if let Some(temp) = self.temperature {
            builder = builder.temperature(temp);
        }

        let provider = builder.build()?;
        let messages = to_rllm_messages(history);
        let resp = provider.chat(&messages).await?;
        Ok(
            resp
                .text()
                .map(|s| s.to_string())
                .unwrap_or_else(|| resp.to_string())
        )
    }
}

#[async_trait]
impl ChatClient for HostedChatClient {
    async fn complete_chat(
        &self,
        preamble: &str,
        history: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        if !self.is_configured() {
            return Err(format!("API key for {} is not configured (CHAT_API_KEY)", self.llm_type).into());
        }
        info!(
            "HostedChatClient::complete_chat() → provider={} model={} base_url={:?} turns={}",
            self.llm_type,
            self.model,
            self.base_url,
            history.len()
        );

        let text = match self.timeout {
            Some(limit) =>
                tokio::time
                    ::timeout(limit, self.chat_once(preamble, history)).await
                    .map_err(|_| format!("{} call timed out after {:?}", self.llm_type, limit))??,
            None => self.chat_once(preamble, history).await?,
        };

        if text.trim().is_empty() {
            return Err(format!("{} returned an empty response", self.llm_type).into());
        }
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        self.llm_type
    }

    fn is_configured(&self) -> bool {
        !self.llm_type.requires_api_key() || !self.api_key.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn converts_roles_in_order() {
        let history = vec![ChatMessage::assistant("hello"), ChatMessage::user("hi")];
        let converted = to_rllm_messages(&history);
        assert_eq!(converted.len(), 2);
        assert!(matches!(converted[0].role, ChatRole::Assistant));
        assert!(matches!(converted[1].role, ChatRole::User));
        assert_eq!(converted[1].content, "hi");
    }

    #[test]
    fn falls_back_to_provider_model() {
        let client = HostedChatClient::from_config(&LlmConfig {
            llm_type: LlmType::Groq,
            api_key: Some("k".into()),
            ..Default::default()
        }).unwrap();
        assert_eq!(client.get_model(), "llama-3.1-8b-instant");
        assert!(client.is_configured());
    }

    #[tokio::test]
    async fn unconfigured_provider_fails_fast() {
        let client = HostedChatClient::from_config(&LlmConfig {
            llm_type: LlmType::Anthropic,
            ..Default::default()
        }).unwrap();
        let err = client.complete_chat("p", &[ChatMessage::user("hi")]).await.unwrap_err();
        assert!(err.to_string().contains("anthropic"));
    }
}
