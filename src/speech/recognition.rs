//! Speech recognition
//!
//! Voice input arrives in one of three shapes: text already recognized by
//! the browser, a recorded clip, or a stream of audio chunks. Every mechanism
//! implements [`SpeechRecognizer`] and reports a [`Transcription`]; failures are
//! values, not errors, so callers can show them directly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::TryStreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::SpeechError;

/// Audio chunks as they arrive from the client
pub type AudioChunks = BoxStream<'static, Result<Vec<u8>, SpeechError>>;

/// Voice input handed to a recognizer
pub enum AudioInput {
    /// Text recognized on the client (browser speech recognition)
    Transcript(String),

    /// A complete recording
    Clip { bytes: Vec<u8>, mime_type: String },

    /// Audio streamed in chunks
    Stream {
        chunks: AudioChunks,
        mime_type: String,
    },
}

/// Outcome of a recognition attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum Transcription {
    Text(String),
    NoSpeechDetected,
    ServiceError(String),
}

impl Transcription {
    pub fn text(&self) -> Option<&str> {
        match self {
            Transcription::Text(text) => Some(text),
            _ => None,
        }
    }
}

#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    async fn transcribe(&self, input: AudioInput) -> Transcription;
}

/// Accepts text that the browser already recognized
#[derive(Debug, Clone, Copy, Default)]
pub struct ClientTranscript;

#[async_trait]
impl SpeechRecognizer for ClientTranscript {
    async fn transcribe(&self, input: AudioInput) -> Transcription {
        match input {
            AudioInput::Transcript(text) => {
                let text = text.trim();
                if text.is_empty() {
                    Transcription::NoSpeechDetected
                } else {
                    Transcription::Text(text.to_string())
                }
            }
            AudioInput::Clip { .. } | AudioInput::Stream { .. } => Transcription::ServiceError(
                "Client transcripts carry text, not audio".to_string(),
            ),
        }
    }
}

/// Server-side transcription settings
#[derive(Debug, Clone)]
pub struct WhisperConfig {
    /// Base URL of an OpenAI-compatible API
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

impl Default for WhisperConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            model: "whisper-1".to_string(),
            timeout_secs: 120,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    text: String,
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    error: ApiError,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    message: String,
}

/// Transcribes clips and streams through an OpenAI-compatible
/// `/audio/transcriptions` endpoint
pub struct WhisperRecognizer {
    config: WhisperConfig,
    client: Client,
}

impl WhisperRecognizer {
    pub fn new(config: WhisperConfig) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self { config, client })
    }

    async fn upload(&self, bytes: Vec<u8>, mime_type: &str) -> Result<String, SpeechError> {
        let file_name = format!("speech.{}", extension_for(mime_type));
        let part = Part::bytes(bytes)
            .file_name(file_name)
            .mime_str(mime_type)?;
        let form = Form::new()
            .text("model", self.config.model.clone())
            .part("file", part);

        let mut request = self
            .client
            .post(format!("{}/audio/transcriptions", self.config.base_url));
        if let Some(ref api_key) = self.config.api_key {
            request = request.bearer_auth(api_key);
        }

        let response = request.multipart(form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(SpeechError::Service(format!("HTTP {}: {}", status, message)));
        }

        let parsed: TranscriptionResponse = serde_json::from_str(&body)
            .map_err(|e| SpeechError::Service(format!("Failed to parse response: {}", e)))?;
        Ok(parsed.text)
    }

    async fn transcribe_bytes(&self, bytes: Vec<u8>, mime_type: &str) -> Transcription {
        if bytes.is_empty() {
            return Transcription::NoSpeechDetected;
        }

        tracing::debug!(bytes = bytes.len(), mime_type, "Uploading audio for transcription");

        match self.upload(bytes, mime_type).await {
            Ok(text) if text.trim().is_empty() => Transcription::NoSpeechDetected,
            Ok(text) => Transcription::Text(text.trim().to_string()),
            Err(e) => {
                tracing::warn!("Transcription failed: {}", e);
                Transcription::ServiceError(e.to_string())
            }
        }
    }
}

#[async_trait]
impl SpeechRecognizer for WhisperRecognizer {
    async fn transcribe(&self, input: AudioInput) -> Transcription {
        match input {
            AudioInput::Clip { bytes, mime_type } => self.transcribe_bytes(bytes, &mime_type).await,
            AudioInput::Stream { chunks, mime_type } => match collect_chunks(chunks).await {
                Ok(bytes) => self.transcribe_bytes(bytes, &mime_type).await,
                Err(e) => Transcription::ServiceError(e.to_string()),
            },
            AudioInput::Transcript(_) => Transcription::ServiceError(
                "Server-side recognition expects audio".to_string(),
            ),
        }
    }
}

/// Routes text to the client mechanism and audio to the server recognizer
pub struct RecognizerChain {
    client: ClientTranscript,
    server: Option<Arc<dyn SpeechRecognizer>>,
}

impl RecognizerChain {
    pub fn new(server: Option<Arc<dyn SpeechRecognizer>>) -> Self {
        Self {
            client: ClientTranscript,
            server,
        }
    }

    pub fn accepts_audio(&self) -> bool {
        self.server.is_some()
    }
}

#[async_trait]
impl SpeechRecognizer for RecognizerChain {
    async fn transcribe(&self, input: AudioInput) -> Transcription {
        match input {
            AudioInput::Transcript(_) => self.client.transcribe(input).await,
            audio => match self.server {
                Some(ref server) => server.transcribe(audio).await,
                None => Transcription::ServiceError(
                    "No server-side speech recognition is configured".to_string(),
                ),
            },
        }
    }
}

async fn collect_chunks(chunks: AudioChunks) -> Result<Vec<u8>, SpeechError> {
    chunks.try_concat().await
}

fn extension_for(mime_type: &str) -> &'static str {
    let essence = mime_type.split(';').next().unwrap_or("").trim();
    match essence {
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/mp4" | "audio/m4a" | "audio/x-m4a" => "m4a",
        "audio/webm" => "webm",
        "audio/ogg" => "ogg",
        "audio/flac" => "flac",
        _ => "wav",
    }
}
