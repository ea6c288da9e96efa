//! OpenAI chat-completions client. DeepSeek exposes the same API and is
//! served by this client with a different base URL and model.

use std::time::Duration;

use async_trait::async_trait;
use myproposal_core::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, Prompt, Provider, TextModel};

const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 2],
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone)]
pub struct OpenAiCompatClient {
    http: reqwest::Client,
    provider: Provider,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl OpenAiCompatClient {
    pub fn openai(api_key: &str, config: &GenerationConfig) -> Result<Self, GenerationError> {
        Self::new(Provider::OpenAi, OPENAI_BASE_URL, api_key, &config.openai_model, config)
    }

    pub fn deepseek(api_key: &str, config: &GenerationConfig) -> Result<Self, GenerationError> {
        Self::new(Provider::DeepSeek, DEEPSEEK_BASE_URL, api_key, &config.deepseek_model, config)
    }

    fn new(
        provider: Provider,
        base_url: &str,
        api_key: &str,
        model: &str,
        config: &GenerationConfig,
    ) -> Result<Self, GenerationError> {
        let http = crate::http::build_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self {
            http,
            provider,
            base_url: base_url.to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        })
    }

    #[must_use]
    pub fn with_base_url(mut self, base_url: &str) -> Self {
        self.base_url = base_url.trim_end_matches('/').to_string();
        self
    }
}

#[async_trait]
impl TextModel for OpenAiCompatClient {
    fn provider(&self) -> Provider {
        self.provider
    }

    #[instrument(skip_all, fields(provider = %self.provider, model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = ChatRequest {
            model: &self.model,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &prompt.system,
                },
                ChatMessage {
                    role: "user",
                    content: &prompt.user,
                },
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        };

        let resp = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::error_body(resp).await;
            return Err(GenerationError::Api {
                provider: self.provider,
                status,
                body,
            });
        }

        let parsed: ChatResponse = resp.json().await?;
        let text = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or(GenerationError::EmptyResponse(self.provider))?;

        debug!(chars = text.len(), "Completion received");
        Ok(text)
    }
}
