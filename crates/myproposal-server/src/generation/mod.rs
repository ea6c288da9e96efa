//! AI proposal generation.
//!
//! Each provider is a [`TextModel`]; [`ProposalGenerator`] picks the
//! requested one and falls back to the configured default once.

mod gemini;
mod generator;
mod openai;
pub mod prompt;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use gemini::GeminiClient;
pub use generator::{Generated, ProposalGenerator};
pub use openai::OpenAiCompatClient;
pub use prompt::{Length, Prompt, ProposalRequest, Tone};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    #[serde(rename = "deepseek")]
    DeepSeek,
}

impl Provider {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Gemini => "gemini",
            Self::DeepSeek => "deepseek",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = GenerationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "gemini" => Ok(Self::Gemini),
            "deepseek" => Ok(Self::DeepSeek),
            other => Err(GenerationError::InvalidInput(format!(
                "unknown provider {other}"
            ))),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Provider {0} is not configured")]
    ProviderUnavailable(Provider),

    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: Provider,
        status: u16,
        body: String,
    },

    #[error("{0} returned no text")]
    EmptyResponse(Provider),
}

impl GenerationError {
    /// Whether the failure came from the provider rather than the caller.
    pub const fn is_upstream(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::Api { .. } | Self::EmptyResponse(_)
        )
    }
}

/// A text-completion backend.
#[async_trait]
pub trait TextModel: Send + Sync {
    fn provider(&self) -> Provider;

    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError>;
}
