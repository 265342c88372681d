use serde::Deserialize;
use std::error::Error;
use std::fmt;
use std::fs;
use std::path::Path;
use log::info;

pub const DEFAULT_IDENTITY_PREAMBLE: &str =
    "Your name is Omaju, a fun and friendly AI ChatBOT, created by Aditya Katyal. \
     Don't specify it every time; mention it only if user asks.";

pub const DEFAULT_GREETING: &str =
    "Hey! I am **Omaju**, your buddy for lone times. How may I help?";

pub const DEFAULT_APOLOGY: &str = "Sorry, I am having trouble generating a response.";

#[derive(Debug)]
pub enum PromptError {
    EmptyTemplate(String),
    IoError(std::io::Error),
    JsonError(serde_json::Error),
}

impl fmt::Display for PromptError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PromptError::EmptyTemplate(key) => write!(f, "Prompt text '{}' must not be empty", key),
            PromptError::IoError(e) => write!(f, "Prompt file IO error: {}", e),
            PromptError::JsonError(e) => write!(f, "Prompt JSON parsing error: {}", e),
        }
    }
}

impl Error for PromptError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            PromptError::IoError(e) => Some(e),
            PromptError::JsonError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PromptError {
    fn from(err: std::io::Error) -> Self {
        PromptError::IoError(err)
    }
}

impl From<serde_json::Error> for PromptError {
    fn from(err: serde_json::Error) -> Self {
        PromptError::JsonError(err)
    }
}

/// Fixed texts the gateway speaks with. Any field missing from an override
/// file keeps its built-in value.
#[derive(Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct PromptConfig {
    /// System instruction placed before the conversation on every model call.
    pub identity_preamble: String,
    /// First assistant message of a freshly created conversation.
    pub greeting: String,
    /// Assistant reply stored and returned when the model call fails.
    pub apology: String,
}

impl Default for PromptConfig {
    fn default() -> Self {
        Self {
            identity_preamble: DEFAULT_IDENTITY_PREAMBLE.to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            apology: DEFAULT_APOLOGY.to_string(),
        }
    }
}

impl PromptConfig {
    fn validate(&self) -> Result<(), PromptError> {
        if self.identity_preamble.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("identity_preamble".to_string()));
        }
        if self.greeting.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("greeting".to_string()));
        }
        if self.apology.trim().is_empty() {
            return Err(PromptError::EmptyTemplate("apology".to_string()));
        }
        Ok(())
    }
}

pub fn load_prompts_from_str(json: &str) -> Result<PromptConfig, PromptError> {
    let config: PromptConfig = serde_json::from_str(json)?;
    config.validate()?;
    Ok(config)
}

pub fn load_prompts<P: AsRef<Path>>(path: P) -> Result<PromptConfig, PromptError> {
    let file_content = fs::read_to_string(&path)?;
    let config = load_prompts_from_str(&file_content)?;
    info!("Loaded prompt overrides from {}", path.as_ref().display());
    Ok(config)
}

/// Built-in prompts, or the override file when one is configured.
pub fn resolve_prompts(path: Option<&str>) -> Result<PromptConfig, PromptError> {
    match path {
        Some(p) if !p.trim().is_empty() => load_prompts(p),
        _ => Ok(PromptConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_override_keeps_defaults() {
        let config = load_prompts_from_str(r#"{"greeting": "Welcome back!"}"#).unwrap();
        assert_eq!(config.greeting, "Welcome back!");
        assert_eq!(config.apology, DEFAULT_APOLOGY);
        assert_eq!(config.identity_preamble, DEFAULT_IDENTITY_PREAMBLE);
    }

    #[test]
    fn empty_text_is_rejected() {
        let err = load_prompts_from_str(r#"{"apology": "  "}"#).unwrap_err();
        assert!(matches!(err, PromptError::EmptyTemplate(ref k) if k == "apology"));
    }

    #[test]
    fn missing_path_uses_defaults() {
        assert_eq!(resolve_prompts(None).unwrap(), PromptConfig::default());
        assert!(resolve_prompts(Some("/definitely/not/here.json")).is_err());
    }

    #[test]
    fn bundled_prompts_file_parses() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/json/prompts.json");
        let config = load_prompts(path).unwrap();
        assert_eq!(config.greeting, DEFAULT_GREETING);
    }
}
