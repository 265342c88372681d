pub mod chat;
use std::str::FromStr;
use std::fmt;
use crate::cli::Args;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LlmType {
    Gemini,
    OpenAI,
    Anthropic,
    Ollama,
    DeepSeek,
    XAI,
    Groq,
}

impl LlmType {
    /// Ollama runs locally and takes no key; every hosted provider needs one.
    pub fn requires_api_key(&self) -> bool {
        !matches!(self, LlmType::Ollama)
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LlmType::Gemini => "gemini",
            LlmType::OpenAI => "openai",
            LlmType::Anthropic => "anthropic",
            LlmType::Ollama => "ollama",
            LlmType::DeepSeek => "deepseek",
            LlmType::XAI => "xai",
            LlmType::Groq => "groq",
        };
        f.write_str(name)
    }
}

#[derive(Debug, PartialEq, Eq)]
pub struct ParseLlmTypeError {
    message: String,
}

impl fmt::Display for ParseLlmTypeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for ParseLlmTypeError {}
impl FromStr for LlmType {
    type Err = ParseLlmTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "gemini" | "google" => Ok(LlmType::Gemini),
            "openai" => Ok(LlmType::OpenAI),
            "anthropic" => Ok(LlmType::Anthropic),
            "ollama" => Ok(LlmType::Ollama),
            "deepseek" => Ok(LlmType::DeepSeek),
            "xai" => Ok(LlmType::XAI),
            "groq" => Ok(LlmType::Groq),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub completion_model: Option<String>,
    pub base_url: Option<String>,
    pub temperature: Option<f32>,
    pub timeout_secs: Option<u64>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::Gemini,
            api_key: None,
            completion_model: None,
            base_url: None,
            temperature: None,
            timeout_secs: None,
        }
    }
}

impl LlmConfig {
    pub fn from_args(args: &Args) -> Result<Self, ParseLlmTypeError> {
        let api_key = if !args.chat_api_key.trim().is_empty() {
            Some(args.chat_api_key.clone())
        } else {
            None
        };
        Ok(Self {
            llm_type: args.chat_llm_type.parse()?,
            api_key,
            completion_model: Some(args.chat_model.clone()).filter(|m| !m.trim().is_empty()),
            base_url: args.chat_base_url.clone().filter(|u| !u.trim().is_empty()),
            temperature: Some(args.chat_temperature),
            timeout_secs: args.chat_timeout_secs,
        })
    }
}
