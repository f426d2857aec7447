//! Conversation session
//!
//! A `Session` owns one transcript and turns each user utterance into exactly
//! one persona-constrained reply:
//! 1. Appends the user message
//! 2. Renders the persona template with the utterance
//! 3. Calls the language model
//! 4. Records the reply (or the failure, through the `FailurePolicy`)
//!
//! Collaborator failures never escape `submit` or `synthesize`. The only error
//! a caller sees is a missing language model.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::config::PromptTemplate;
use crate::conversation::{Message, Transcript};
use crate::providers::LanguageModel;
use crate::speech::SpeechSynthesizer;

/// Default language code for synthesized speech
pub const DEFAULT_LANGUAGE: &str = "en";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Ready for the next utterance
    Idle,
    /// A language-model call is in flight
    AwaitingReply,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Idle => write!(f, "idle"),
            SessionState::AwaitingReply => write!(f, "awaiting_reply"),
        }
    }
}

/// What the language model produced for one question
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", content = "text", rename_all = "lowercase")]
pub enum Reply {
    Success(String),
    Failure(String),
}

impl Reply {
    pub fn is_success(&self) -> bool {
        matches!(self, Reply::Success(_))
    }
}

/// How a failed reply is written into the transcript.
///
/// Either way the transcript gains one assistant message per question.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Apologize and embed the error text
    #[default]
    Apologize,
    /// Record the error text as-is
    Verbatim,
}

impl FailurePolicy {
    pub fn render(&self, reply: &Reply) -> String {
        match (self, reply) {
            (_, Reply::Success(text)) => text.clone(),
            (FailurePolicy::Apologize, Reply::Failure(reason)) => format!(
                "I apologize, but I'm having trouble processing that question right now. Error: {}",
                reason
            ),
            (FailurePolicy::Verbatim, Reply::Failure(reason)) => reason.clone(),
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "apologize" => Ok(FailurePolicy::Apologize),
            "verbatim" => Ok(FailurePolicy::Verbatim),
            other => Err(format!("Unknown failure policy: {}", other)),
        }
    }
}

/// One question and the answer recorded for it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Exchange {
    pub question: Message,
    pub answer: Message,
    pub reply: Reply,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("Language model is not configured: {0}")]
    NotConfigured(String),

    #[error("No message at index {0}")]
    NoSuchMessage(usize),
}

pub struct Session {
    id: Uuid,
    created_at: DateTime<Utc>,
    transcript: Transcript,
    state: SessionState,
    template: Arc<PromptTemplate>,
    model: Option<Arc<dyn LanguageModel>>,
    not_configured: String,
    synthesizer: Option<Arc<dyn SpeechSynthesizer>>,
    language: String,
    failure_policy: FailurePolicy,
}

impl Session {
    /// Create an empty session with no collaborators attached
    pub fn new(template: Arc<PromptTemplate>) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: Utc::now(),
            transcript: Transcript::new(),
            state: SessionState::Idle,
            template,
            model: None,
            not_configured: "no language model credential was provided".to_string(),
            synthesizer: None,
            language: DEFAULT_LANGUAGE.to_string(),
            failure_policy: FailurePolicy::default(),
        }
    }

    pub fn with_model(mut self, model: Arc<dyn LanguageModel>) -> Self {
        self.model = Some(model);
        self
    }

    /// Explain why no model is attached; reported by `submit`
    pub fn with_not_configured_reason(mut self, reason: impl Into<String>) -> Self {
        self.not_configured = reason.into();
        self
    }

    pub fn with_synthesizer(
        mut self,
        synthesizer: Arc<dyn SpeechSynthesizer>,
        language: impl Into<String>,
    ) -> Self {
        self.synthesizer = Some(synthesizer);
        self.language = language.into();
        self
    }

    pub fn with_failure_policy(mut self, policy: FailurePolicy) -> Self {
        self.failure_policy = policy;
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn is_configured(&self) -> bool {
        self.model.is_some()
    }

    /// Ask one question.
    ///
    /// Blank input is ignored and returns `Ok(None)`. Without a language model
    /// nothing is appended and `NotConfigured` is returned. Otherwise the
    /// transcript grows by exactly one user and one assistant message, even
    /// when the model call fails.
    pub async fn submit(&mut self, utterance: &str) -> Result<Option<Exchange>, SessionError> {
        if utterance.trim().is_empty() {
            tracing::debug!(session_id = %self.id, "Ignoring blank utterance");
            return Ok(None);
        }

        let model = self
            .model
            .clone()
            .ok_or_else(|| SessionError::NotConfigured(self.not_configured.clone()))?;

        let question = self.transcript.add_user(utterance).clone();
        self.state = SessionState::AwaitingReply;

        let prompt = self.template.render(utterance);
        tracing::debug!(
            session_id = %self.id,
            provider = model.name(),
            model = model.model(),
            "Requesting reply"
        );

        let reply = match model.generate(&prompt).await {
            Ok(text) => Reply::Success(text),
            Err(e) => {
                tracing::warn!(session_id = %self.id, "Language model call failed: {}", e);
                Reply::Failure(e.to_string())
            }
        };

        let content = self.failure_policy.render(&reply);
        let answer = self.transcript.add_assistant(&content).clone();
        self.state = SessionState::Idle;

        Ok(Some(Exchange {
            question,
            answer,
            reply,
        }))
    }

    /// Speak arbitrary text. Failures are logged and yield `None`.
    pub async fn synthesize(&self, text: &str) -> Option<Vec<u8>> {
        let Some(ref synthesizer) = self.synthesizer else {
            tracing::warn!(session_id = %self.id, "No speech synthesizer configured");
            return None;
        };

        match synthesizer.synthesize(text, &self.language).await {
            Ok(audio) => Some(audio),
            Err(e) => {
                tracing::warn!(session_id = %self.id, "Error generating speech: {}", e);
                None
            }
        }
    }

    /// Speak the transcript message at `index`
    pub async fn synthesize_message(&self, index: usize) -> Result<Option<Vec<u8>>, SessionError> {
        let message = self
            .transcript
            .get(index)
            .ok_or(SessionError::NoSuchMessage(index))?;
        Ok(self.synthesize(&message.content).await)
    }

    /// MIME type of synthesized audio
    pub fn audio_mime_type(&self) -> &str {
        self.synthesizer
            .as_ref()
            .map(|s| s.mime_type())
            .unwrap_or("audio/mpeg")
    }

    /// Clear the transcript, returning how many messages were removed
    pub fn reset(&mut self) -> usize {
        let cleared = self.transcript.clear();
        tracing::info!(session_id = %self.id, cleared, "Conversation cleared");
        cleared
    }
}
