//! Language-model provider integrations

mod gemini;
mod ollama;
mod openai_compat;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::config::LlmSettings;

pub use gemini::GeminiProvider;
pub use ollama::OllamaProvider;
pub use openai_compat::{OpenAICompatConfig, OpenAICompatProvider};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Provider not configured: {0}")]
    NotConfigured(String),

    #[error("Request failed: {0}")]
    RequestFailed(reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ProviderError {
    /// Request URLs can carry credentials, so they are dropped before the
    /// error reaches a transcript or a log line
    fn from(err: reqwest::Error) -> Self {
        ProviderError::RequestFailed(err.without_url())
    }
}

/// A hosted model that turns a rendered prompt into reply text
#[async_trait]
pub trait LanguageModel: Send + Sync {
    /// Provider name, e.g. "gemini"
    fn name(&self) -> &str;

    /// Model identifier sent with each request
    fn model(&self) -> &str;

    /// Generate a free-text reply for a single prompt
    async fn generate(&self, prompt: &str) -> Result<String, ProviderError>;
}

/// Build the configured language model.
///
/// Returns `NotConfigured` when the provider needs a credential that isn't set;
/// callers may still start without a model and let sessions report it.
pub fn from_settings(settings: &LlmSettings) -> Result<Arc<dyn LanguageModel>, ProviderError> {
    match settings.provider.to_lowercase().as_str() {
        "gemini" | "google" => {
            let api_key = settings
                .gemini_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("GEMINI_API_KEY is not set".into()))?;
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| gemini::DEFAULT_MODEL.to_string());
            let mut provider = GeminiProvider::new(api_key, model, settings.timeout_secs)?;
            if let Some(ref url) = settings.gemini_url {
                provider = provider.with_base_url(url.clone());
            }
            Ok(Arc::new(provider))
        }
        "openai" => {
            let api_key = settings
                .openai_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("OPENAI_API_KEY is not set".into()))?;
            let mut config = OpenAICompatConfig::openai(api_key);
            if let Some(ref base_url) = settings.openai_base_url {
                config.base_url = base_url.clone();
            }
            if let Some(ref model) = settings.model {
                config.default_model = model.clone();
            }
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OpenAICompatProvider::new(config)?))
        }
        "groq" => {
            let api_key = settings
                .groq_api_key
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("GROQ_API_KEY is not set".into()))?;
            let mut config = OpenAICompatConfig::groq(api_key);
            if let Some(ref model) = settings.model {
                config.default_model = model.clone();
            }
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OpenAICompatProvider::new(config)?))
        }
        "local" => {
            let model = settings
                .model
                .clone()
                .ok_or_else(|| ProviderError::NotConfigured("LLM_MODEL is not set".into()))?;
            let base_url = settings
                .openai_base_url
                .clone()
                .unwrap_or_else(|| "http://localhost:8000/v1".into());
            let mut config = OpenAICompatConfig::local(base_url, model);
            config.timeout_secs = settings.timeout_secs;
            Ok(Arc::new(OpenAICompatProvider::new(config)?))
        }
        "ollama" => {
            let url = settings
                .ollama_url
                .clone()
                .unwrap_or_else(|| "http://localhost:11434".into());
            let model = settings
                .model
                .clone()
                .unwrap_or_else(|| ollama::DEFAULT_MODEL.to_string());
            Ok(Arc::new(OllamaProvider::new(url, model, settings.timeout_secs)?))
        }
        other => Err(ProviderError::UnknownProvider(other.to_string())),
    }
}
