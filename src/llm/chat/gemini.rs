use async_trait::async_trait;
use reqwest::Client as HttpClient;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::time::Duration;
use log::{ debug, info };

use super::{ ChatClient, CompletionResponse };
use crate::llm::{ LlmConfig, LlmType };
use crate::models::chat::{ ChatMessage, Role };

const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";
const DEFAULT_MODEL: &str = "gemini-1.5-flash";

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    system_instruction: GeminiContent,
    contents: Vec<GeminiContent>,
    generation_config: GenerationConfig,
}

#[derive(Serialize)]
struct GeminiContent {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<GeminiPart>,
}

#[derive(Serialize)]
struct GeminiPart {
    text: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct GoogleResponse {
    #[serde(default)]
    candidates: Vec<GoogleCandidate>,
}

#[derive(Deserialize)]
struct GoogleCandidate {
    content: Option<GoogleContent>,
}

#[derive(Deserialize)]
struct GoogleContent {
    #[serde(default)]
    parts: Vec<GooglePart>,
}

#[derive(Deserialize)]
struct GooglePart {
    text: Option<String>,
}

fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::User => "user",
        Role::Assistant => "model",
    }
}

fn build_request(
    preamble: &str,
    history: &[ChatMessage],
    temperature: Option<f32>
) -> GenerateContentRequest {
    GenerateContentRequest {
        system_instruction: GeminiContent {
            role: None,
            parts: vec![GeminiPart { text: preamble.to_string() }],
        },
        contents: history
            .iter()
            .map(|msg| GeminiContent {
                role: Some(gemini_role(msg.role)),
                parts: vec![GeminiPart { text: msg.content.clone() }],
            })
            .collect(),
        generation_config: GenerationConfig { temperature },
    }
}

/// Joins the text parts of the first candidate. A blocked or empty answer
/// yields `None`.
fn extract_text(resp: GoogleResponse) -> Option<String> {
    let content = resp.candidates.into_iter().next()?.content?;
    let text: String = content.parts
        .into_iter()
        .filter_map(|p| p.text)
        .collect::<Vec<_>>()
        .join("");
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Client for the Gemini `generateContent` REST endpoint.
pub struct GeminiChatClient {
    http: HttpClient,
    api_key: String,
    model: String,
    base_url: String,
    temperature: Option<f32>,
}

impl GeminiChatClient {
    pub fn new(
        api_key: String,
        model: Option<String>,
        base_url: Option<String>,
        temperature: Option<f32>,
        timeout_secs: Option<u64>
    ) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        let chat_model = model.unwrap_or_else(|| DEFAULT_MODEL.to_string());
        let url = base_url.unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let mut builder = HttpClient::builder();
        if let Some(secs) = timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            api_key,
            model: chat_model,
            base_url: url.trim_end_matches('/').to_string(),
            temperature,
        })
    }

    pub fn from_config(config: &LlmConfig) -> Result<Self, Box<dyn StdError + Send + Sync>> {
        if config.llm_type != LlmType::Gemini {
            return Err("Invalid config type for GeminiChatClient".into());
        }
        Self::new(
            config.api_key.clone().unwrap_or_default(),
            config.completion_model.clone(),
            config.base_url.clone(),
            config.temperature,
            config.timeout_secs
        )
    }

    fn endpoint(&self) -> String {
        format!("{}/models/{}:generateContent", self.base_url, self.model)
    }
}

#[async_trait]
impl ChatClient for GeminiChatClient {
    async fn complete_chat(
        &self,
        preamble: &str,
        history: &[ChatMessage]
    ) -> Result<CompletionResponse, Box<dyn StdError + Send + Sync>> {
        if self.api_key.is_empty() {
            return Err("Google API key is not configured (CHAT_API_KEY)".into());
        }
        info!(
            "GeminiChatClient::complete_chat() → model={} turns={}",
            self.model,
            history.len()
        );
        let payload = build_request(preamble, history, self.temperature);
        let resp = self.http
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&payload)
            .send().await?
            .error_for_status()?;
        let data = resp.json::<GoogleResponse>().await?;
        let text = extract_text(data).ok_or("Gemini returned no text")?;
        debug!("Gemini answered with {} chars", text.len());
        Ok(CompletionResponse { response: text })
    }

    fn get_model(&self) -> String {
        self.model.clone()
    }

    fn get_llm_type(&self) -> LlmType {
        LlmType::Gemini
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }
}
