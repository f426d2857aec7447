//! Deployment configuration loaded from TOML files
//!
//! Every section is optional; values present in the file override the
//! environment.
//!
//! ```toml
//! [server]
//! port = 8080
//!
//! [llm]
//! provider = "gemini"
//! model = "gemini-1.5-flash"
//! api_key_env = "MY_GEMINI_KEY"
//!
//! [speech]
//! language = "en"
//!
//! [session]
//! failure_policy = "apologize"
//!
//! [persona]
//! file = "personas/claude.toml"
//! ```

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::core::FailurePolicy;

use super::Config;

/// Root file configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerSection,

    #[serde(default)]
    pub llm: LlmSection,

    #[serde(default)]
    pub speech: SpeechSection,

    #[serde(default)]
    pub session: SessionSection,

    #[serde(default)]
    pub persona: PersonaSection,
}

impl FileConfig {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Load configuration from a TOML string
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: FileConfig = toml::from_str(content)?;
        Ok(config)
    }

    /// Overlay the file's values onto `config`.
    ///
    /// `lookup` resolves `api_key_env` to the credential it names.
    pub fn apply<F>(&self, config: &mut Config, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ref host) = self.server.host {
            config.host = host.clone();
        }
        if let Some(port) = self.server.port {
            config.port = port;
        }

        if let Some(ref provider) = self.llm.provider {
            config.llm.provider = provider.clone();
        }
        if let Some(ref model) = self.llm.model {
            config.llm.model = Some(model.clone());
        }
        if let Some(timeout) = self.llm.timeout_secs {
            config.llm.timeout_secs = timeout;
        }
        if let Some(ref endpoint) = self.llm.endpoint {
            match config.llm.provider.to_lowercase().as_str() {
                "ollama" => config.llm.ollama_url = Some(endpoint.clone()),
                "gemini" | "google" => config.llm.gemini_url = Some(endpoint.clone()),
                _ => config.llm.openai_base_url = Some(endpoint.clone()),
            }
        }
        if let Some(ref key_env) = self.llm.api_key_env {
            let key = lookup(key_env).filter(|k| !k.trim().is_empty());
            if key.is_none() {
                tracing::warn!("api_key_env names {} but it is not set", key_env);
            }
            match config.llm.provider.to_lowercase().as_str() {
                "gemini" | "google" => config.llm.gemini_api_key = key,
                "groq" => config.llm.groq_api_key = key,
                _ => config.llm.openai_api_key = key,
            }
        }

        if let Some(ref language) = self.speech.language {
            config.speech.language = language.clone();
        }
        if let Some(slow) = self.speech.slow {
            config.speech.slow = slow;
        }
        if let Some(ref url) = self.speech.tts_url {
            config.speech.tts_url = Some(url.clone());
        }
        if let Some(ref model) = self.speech.stt_model {
            config.speech.stt_model = model.clone();
        }
        if let Some(max) = self.speech.max_audio_bytes {
            config.speech.max_audio_bytes = max;
        }

        if let Some(policy) = self.session.failure_policy {
            config.failure_policy = policy;
        }

        if let Some(ref file) = self.persona.file {
            config.persona_file = Some(file.clone());
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerSection {
    #[serde(default)]
    pub host: Option<String>,

    #[serde(default)]
    pub port: Option<u16>,
}

/// LLM provider configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LlmSection {
    /// Provider name: "gemini", "openai", "groq", "local", "ollama"
    #[serde(default)]
    pub provider: Option<String>,

    #[serde(default)]
    pub model: Option<String>,

    /// Environment variable holding the API key
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Custom API endpoint
    #[serde(default)]
    pub endpoint: Option<String>,

    #[serde(default)]
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SpeechSection {
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default)]
    pub slow: Option<bool>,

    #[serde(default)]
    pub tts_url: Option<String>,

    #[serde(default)]
    pub stt_model: Option<String>,

    #[serde(default)]
    pub max_audio_bytes: Option<usize>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionSection {
    #[serde(default)]
    pub failure_policy: Option<FailurePolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersonaSection {
    /// Persona template file
    #[serde(default)]
    pub file: Option<PathBuf>,
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),
}
