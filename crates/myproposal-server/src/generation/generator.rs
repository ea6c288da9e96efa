use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{info, instrument, warn};

use super::{GenerationError, Prompt, Provider, ProposalRequest, TextModel};

/// Generated proposal text and the provider that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Generated {
    pub text: String,
    pub provider: Provider,
}

/// Routes generation requests to the configured providers.
#[derive(Clone)]
pub struct ProposalGenerator {
    models: HashMap<Provider, Arc<dyn TextModel>>,
    default_provider: Provider,
}

impl ProposalGenerator {
    pub fn new(default_provider: Provider) -> Self {
        Self {
            models: HashMap::new(),
            default_provider,
        }
    }

    /// Register a backend under its own provider, replacing any previous one.
    #[must_use]
    pub fn with_model(mut self, model: Arc<dyn TextModel>) -> Self {
        self.models.insert(model.provider(), model);
        self
    }

    pub const fn default_provider(&self) -> Provider {
        self.default_provider
    }

    pub fn is_available(&self, provider: Provider) -> bool {
        self.models.contains_key(&provider)
    }

    /// Generate a proposal with `requested` (or the default provider).
    ///
    /// A failing non-default provider is retried once on the default.
    /// Input validation errors are returned without any provider call.
    #[instrument(skip(self, request))]
    pub async fn generate(
        &self,
        request: &ProposalRequest,
        requested: Option<Provider>,
    ) -> Result<Generated, GenerationError> {
        let prompt = request.build_prompt()?;
        let target = requested.unwrap_or(self.default_provider);

        match self.complete_with(target, &prompt).await {
            Ok(generated) => Ok(generated),
            Err(e) if target != self.default_provider => {
                warn!(
                    provider = %target,
                    fallback = %self.default_provider,
                    error = %e,
                    "Provider failed, falling back to default"
                );
                self.complete_with(self.default_provider, &prompt).await
            }
            Err(e) => Err(e),
        }
    }

    async fn complete_with(
        &self,
        provider: Provider,
        prompt: &Prompt,
    ) -> Result<Generated, GenerationError> {
        let model = self
            .models
            .get(&provider)
            .ok_or(GenerationError::ProviderUnavailable(provider))?;

        let text = model.complete(prompt).await?;
        if text.trim().is_empty() {
            return Err(GenerationError::EmptyResponse(provider));
        }

        info!(provider = %provider, "Proposal generated");
        Ok(Generated { text, provider })
    }
}

#[cfg(test)]
#[allow(clippy::panic, clippy::expect_used, clippy::unwrap_used)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;

    struct FakeModel {
        provider: Provider,
        reply: Option<&'static str>,
        calls: AtomicUsize,
    }

    impl FakeModel {
        fn ok(provider: Provider, reply: &'static str) -> Arc<Self> {
            Arc::new(Self {
                provider,
                reply: Some(reply),
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(provider: Provider) -> Arc<Self> {
            Arc::new(Self {
                provider,
                reply: None,
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl TextModel for FakeModel {
        fn provider(&self) -> Provider {
            self.provider
        }

        async fn complete(&self, _prompt: &Prompt) -> Result<String, GenerationError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.reply
                .map(str::to_string)
                .ok_or(GenerationError::Api {
                    provider: self.provider,
                    status: 500,
                    body: "boom".into(),
                })
        }
    }

    fn request() -> ProposalRequest {
        ProposalRequest {
            recipient_name: "Sam".into(),
            ..ProposalRequest::default()
        }
    }

    #[tokio::test]
    async fn uses_default_when_none_requested() {
        let openai = FakeModel::ok(Provider::OpenAi, "from openai");
        let generator = ProposalGenerator::new(Provider::OpenAi).with_model(openai.clone());

        let out = generator.generate(&request(), None).await.unwrap();
        assert_eq!(out.provider, Provider::OpenAi);
        assert_eq!(out.text, "from openai");
        assert_eq!(openai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn uses_requested_provider() {
        let generator = ProposalGenerator::new(Provider::OpenAi)
            .with_model(FakeModel::ok(Provider::OpenAi, "from openai"))
            .with_model(FakeModel::ok(Provider::Gemini, "from gemini"));

        let out = generator
            .generate(&request(), Some(Provider::Gemini))
            .await
            .unwrap();
        assert_eq!(out.provider, Provider::Gemini);
    }

    #[tokio::test]
    async fn failing_provider_falls_back_to_default() {
        let deepseek = FakeModel::failing(Provider::DeepSeek);
        let openai = FakeModel::ok(Provider::OpenAi, "from openai");
        let generator = ProposalGenerator::new(Provider::OpenAi)
            .with_model(deepseek.clone())
            .with_model(openai.clone());

        let out = generator
            .generate(&request(), Some(Provider::DeepSeek))
            .await
            .unwrap();
        assert_eq!(out.provider, Provider::OpenAi);
        assert_eq!(deepseek.calls.load(Ordering::SeqCst), 1);
        assert_eq!(openai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unconfigured_provider_falls_back_to_default() {
        let generator = ProposalGenerator::new(Provider::Gemini)
            .with_model(FakeModel::ok(Provider::Gemini, "from gemini"));

        let out = generator
            .generate(&request(), Some(Provider::OpenAi))
            .await
            .unwrap();
        assert_eq!(out.provider, Provider::Gemini);
    }

    #[tokio::test]
    async fn failing_default_is_not_retried() {
        let openai = FakeModel::failing(Provider::OpenAi);
        let generator = ProposalGenerator::new(Provider::OpenAi).with_model(openai.clone());

        let err = generator.generate(&request(), None).await.unwrap_err();
        assert!(err.is_upstream());
        assert_eq!(openai.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn invalid_input_skips_providers() {
        let openai = FakeModel::ok(Provider::OpenAi, "unused");
        let generator = ProposalGenerator::new(Provider::OpenAi).with_model(openai.clone());

        let err = generator
            .generate(&ProposalRequest::default(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, GenerationError::InvalidInput(_)));
        assert_eq!(openai.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn nothing_configured_is_unavailable() {
        let generator = ProposalGenerator::new(Provider::OpenAi);
        let err = generator.generate(&request(), None).await.unwrap_err();
        assert!(matches!(err, GenerationError::ProviderUnavailable(Provider::OpenAi)));
    }
}
