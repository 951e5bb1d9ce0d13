pub mod chat;
use serde::{ Deserialize, Serialize };
use std::error::Error as StdError;
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmType {
    OpenAI,
    Ollama,
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
        match s.to_lowercase().as_str() {
            "openai" => Ok(LlmType::OpenAI),
            "ollama" => Ok(LlmType::Ollama),
            _ =>
                Err(ParseLlmTypeError {
                    message: format!("Invalid LLM type: '{}'", s),
                }),
        }
    }
}

impl fmt::Display for LlmType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LlmType::OpenAI => f.write_str("openai"),
            LlmType::Ollama => f.write_str("ollama"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub llm_type: LlmType,
    pub api_key: Option<String>,
    pub model: Option<String>,
    pub base_url: Option<String>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            llm_type: LlmType::OpenAI,
            api_key: None,
            model: None,
            base_url: None,
        }
    }
}

/// Failures talking to the inference backend.
///
/// Only [`ProviderError::Transport`] raised before a response arrived is worth retrying; a
/// provider that answered with an error status has already made up its mind.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("transport failure: {0}")]
    Transport(#[source] Box<dyn StdError + Send + Sync>),

    #[error("provider returned status {status}: {body}")]
    Status {
        status: u16,
        body: String,
    },

    #[error("provider response has no body")]
    EmptyBody,

    #[error("provider stream error: {0}")]
    Stream(String),

    #[error("request cancelled before the provider responded")]
    Cancelled,

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    pub fn is_transport(&self) -> bool {
        matches!(self, ProviderError::Transport(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        ProviderError::Transport(Box::new(err))
    }
}
