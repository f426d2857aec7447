//! Speech collaborators
//!
//! Text-to-speech turns replies into playable audio; speech recognition turns
//! a user's voice into the text that gets submitted. Both sit behind traits so
//! sessions and routes never depend on a particular service.

mod recognition;
mod synthesis;

use thiserror::Error;

pub use recognition::{
    AudioChunks, AudioInput, ClientTranscript, RecognizerChain, SpeechRecognizer, Transcription,
    WhisperConfig, WhisperRecognizer,
};
pub use synthesis::{split_text, GoogleTranslateTts, SpeechSynthesizer, MAX_CHUNK_CHARS};

#[derive(Debug, Error)]
pub enum SpeechError {
    #[error("Nothing to speak")]
    EmptyText,

    #[error("Request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("Service error: {0}")]
    Service(String),

    #[error("Audio stream error: {0}")]
    Stream(String),
}
