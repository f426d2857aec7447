//! Application configuration
//!
//! Settings come from environment variables (a `.env` file is honoured) and
//! can be overridden by a TOML file named in `VOICEBOT_CONFIG`.

pub mod file;
pub mod prompts;

use std::env;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::FailurePolicy;

pub use file::{ConfigError, FileConfig};
pub use prompts::{PromptError, PromptTemplate};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub llm: LlmSettings,
    pub speech: SpeechSettings,
    pub failure_policy: FailurePolicy,
    pub persona_file: Option<PathBuf>,
}

/// Language-model provider settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmSettings {
    /// Provider name: "gemini", "openai", "groq", "local", "ollama"
    pub provider: String,
    /// Model override; each provider has its own default
    pub model: Option<String>,
    pub gemini_api_key: Option<String>,
    pub openai_api_key: Option<String>,
    pub groq_api_key: Option<String>,
    pub openai_base_url: Option<String>,
    pub gemini_url: Option<String>,
    pub ollama_url: Option<String>,
    pub timeout_secs: u64,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: None,
            gemini_api_key: None,
            openai_api_key: None,
            groq_api_key: None,
            openai_base_url: None,
            gemini_url: None,
            ollama_url: None,
            timeout_secs: 120,
        }
    }
}

/// Speech synthesis and recognition settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpeechSettings {
    /// Language code for synthesized speech
    pub language: String,
    /// Slower speech rate
    pub slow: bool,
    /// Override for the text-to-speech endpoint
    pub tts_url: Option<String>,
    /// Model used for server-side transcription
    pub stt_model: String,
    /// Largest audio body accepted for server-side transcription
    pub max_audio_bytes: usize,
    pub timeout_secs: u64,
}

impl Default for SpeechSettings {
    fn default() -> Self {
        Self {
            language: "en".to_string(),
            slow: false,
            tts_url: None,
            stt_model: "whisper-1".to_string(),
            // Whisper rejects uploads above 25 MB
            max_audio_bytes: 25 * 1024 * 1024,
            timeout_secs: 60,
        }
    }
}

impl Config {
    /// Read settings from the process environment, then apply the TOML file
    /// named by `VOICEBOT_CONFIG` if there is one
    pub fn load() -> Result<Self, ConfigError> {
        let lookup = |key: &str| env::var(key).ok();
        let mut config = Self::from_lookup(lookup)?;

        if let Some(path) = lookup("VOICEBOT_CONFIG") {
            let file = FileConfig::from_file(Path::new(&path))?;
            file.apply(&mut config, lookup);
            tracing::debug!("Applied configuration file {}", path);
        }

        Ok(config)
    }

    /// Build settings from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_defaults = LlmSettings::default();
        let speech_defaults = SpeechSettings::default();

        let failure_policy = match lookup("FAILURE_POLICY") {
            Some(value) => value.parse().map_err(ConfigError::Validation)?,
            None => FailurePolicy::default(),
        };

        Ok(Self {
            host: lookup("HOST").unwrap_or_else(|| "127.0.0.1".into()),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),
            llm: LlmSettings {
                provider: lookup("LLM_PROVIDER").unwrap_or(llm_defaults.provider),
                model: lookup("LLM_MODEL"),
                gemini_api_key: non_empty(lookup("GEMINI_API_KEY")),
                openai_api_key: non_empty(lookup("OPENAI_API_KEY")),
                groq_api_key: non_empty(lookup("GROQ_API_KEY")),
                openai_base_url: lookup("OPENAI_BASE_URL"),
                gemini_url: lookup("GEMINI_BASE_URL"),
                ollama_url: lookup("OLLAMA_URL"),
                timeout_secs: lookup("LLM_TIMEOUT_SECS")
                    .and_then(|t| t.parse().ok())
                    .unwrap_or(llm_defaults.timeout_secs),
            },
            speech: SpeechSettings {
                language: lookup("TTS_LANGUAGE").unwrap_or(speech_defaults.language),
                slow: lookup("TTS_SLOW")
                    .map(|v| matches!(v.to_lowercase().as_str(), "1" | "true" | "yes"))
                    .unwrap_or(speech_defaults.slow),
                tts_url: lookup("TTS_URL"),
                stt_model: lookup("STT_MODEL").unwrap_or(speech_defaults.stt_model),
                max_audio_bytes: lookup("MAX_AUDIO_BYTES")
                    .and_then(|b| b.parse().ok())
                    .unwrap_or(speech_defaults.max_audio_bytes),
                timeout_secs: speech_defaults.timeout_secs,
            },
            failure_policy,
            persona_file: lookup("PERSONA_FILE").map(PathBuf::from),
        })
    }
}

/// Treat an empty credential the same as a missing one
fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
