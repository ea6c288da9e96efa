//! Google Gemini `generateContent` client.

use std::time::Duration;

use async_trait::async_trait;
use myproposal_core::config::GenerationConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use super::{GenerationError, Prompt, Provider, TextModel};

const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateRequest<'a> {
    system_instruction: Content<'a>,
    contents: [Content<'a>; 1],
    generation_config: GenerationParams,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: [Part<'a>; 1],
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationParams {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

#[derive(Debug, Clone)]
pub struct GeminiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

impl GeminiClient {
    pub fn new(api_key: &str, config: &GenerationConfig) -> Result<Self, GenerationError> {
        let http = crate::http::build_client(Duration::from_secs(config.request_timeout_secs))?;
        Ok(Self {
            http,
            base_url: GEMINI_BASE_URL.to_string(),
            api_key: api_key.to_string(),
            model: config.gemini_model.clone(),
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
impl TextModel for GeminiClient {
    fn provider(&self) -> Provider {
        Provider::Gemini
    }

    #[instrument(skip_all, fields(provider = "gemini", model = %self.model))]
    async fn complete(&self, prompt: &Prompt) -> Result<String, GenerationError> {
        let body = GenerateRequest {
            system_instruction: Content {
                role: None,
                parts: [Part {
                    text: &prompt.system,
                }],
            },
            contents: [Content {
                role: Some("user"),
                parts: [Part { text: &prompt.user }],
            }],
            generation_config: GenerationParams {
                temperature: self.temperature,
                max_output_tokens: self.max_tokens,
            },
        };

        let resp = self
            .http
            .post(format!("{}/models/{}:generateContent", self.base_url, self.model))
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let (status, body) = crate::http::error_body(resp).await;
            return Err(GenerationError::Api {
                provider: Provider::Gemini,
                status,
                body,
            });
        }

        let parsed: GenerateResponse = resp.json().await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default();
        let text = text.trim();

        if text.is_empty() {
            return Err(GenerationError::EmptyResponse(Provider::Gemini));
        }
        debug!(chars = text.len(), "Completion received");
        Ok(text.to_string())
    }
}
