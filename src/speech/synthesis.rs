//! Text-to-speech
//!
//! `GoogleTranslateTts` speaks through the public Google Translate TTS
//! endpoint. The endpoint only accepts short inputs, so text is split into
//! chunks of at most [`MAX_CHUNK_CHARS`] characters and the returned MP3
//! segments are concatenated in order.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::SpeechError;

/// Longest text the translate endpoint accepts per request
pub const MAX_CHUNK_CHARS: usize = 100;

const TTS_URL: &str = "https://translate.google.com/translate_tts";

/// A hosted voice that turns text into audio bytes
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// MIME type of the audio this synthesizer produces
    fn mime_type(&self) -> &str {
        "audio/mpeg"
    }

    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError>;
}

pub struct GoogleTranslateTts {
    client: Client,
    url: String,
    slow: bool,
}

impl GoogleTranslateTts {
    pub fn new(slow: bool, timeout_secs: u64) -> Result<Self, SpeechError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;

        Ok(Self {
            client,
            url: TTS_URL.to_string(),
            slow,
        })
    }

    /// Point at a different endpoint (mirrors, proxies)
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = url.into();
        self
    }

    async fn fetch_chunk(
        &self,
        chunk: &str,
        language: &str,
        idx: usize,
        total: usize,
    ) -> Result<Vec<u8>, SpeechError> {
        let speed = if self.slow { "0.3" } else { "1" };
        let idx_param = idx.to_string();
        let total_param = total.to_string();
        let textlen = chunk.chars().count().to_string();

        let response = self
            .client
            .get(&self.url)
            .query(&[
                ("ie", "UTF-8"),
                ("q", chunk),
                ("tl", language),
                ("client", "tw-ob"),
                ("ttsspeed", speed),
                ("idx", idx_param.as_str()),
                ("total", total_param.as_str()),
                ("textlen", textlen.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(chunk_failure(status, idx, total));
        }

        Ok(response.bytes().await?.to_vec())
    }
}

#[async_trait]
impl SpeechSynthesizer for GoogleTranslateTts {
    async fn synthesize(&self, text: &str, language: &str) -> Result<Vec<u8>, SpeechError> {
        let chunks = split_text(text, MAX_CHUNK_CHARS);
        if chunks.is_empty() {
            return Err(SpeechError::EmptyText);
        }

        tracing::debug!(chunks = chunks.len(), language, "Synthesizing speech");

        let mut audio = Vec::new();
        for (idx, chunk) in chunks.iter().enumerate() {
            let segment = self.fetch_chunk(chunk, language, idx, chunks.len()).await?;
            audio.extend_from_slice(&segment);
        }

        Ok(audio)
    }
}

/// Split text into chunks of at most `max_chars` characters.
///
/// Words are never broken unless a single word is longer than `max_chars`.
/// A chunk also ends after sentence punctuation so each request carries a
/// natural pause.
pub fn split_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for piece in text.split_whitespace().flat_map(|word| hard_wrap(word, max_chars)) {
        let piece_len = piece.chars().count();
        let needed = if current.is_empty() {
            piece_len
        } else {
            current_len + 1 + piece_len
        };

        if needed > max_chars && !current.is_empty() {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if !current.is_empty() {
            current.push(' ');
            current_len += 1;
        }
        current.push_str(&piece);
        current_len += piece_len;

        if piece.ends_with(['.', '!', '?', ';', ':']) {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

fn hard_wrap(word: &str, max_chars: usize) -> Vec<String> {
    let chars: Vec<char> = word.chars().collect();
    chars
        .chunks(max_chars)
        .map(|c| c.iter().collect())
        .collect()
}

/// `idx` is zero-based; the message counts from one
fn chunk_failure(status: reqwest::StatusCode, idx: usize, total: usize) -> SpeechError {
    SpeechError::Service(format!("HTTP {} for chunk {} of {}", status, idx + 1, total))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_failure_counts_from_one() {
        let err = chunk_failure(reqwest::StatusCode::TOO_MANY_REQUESTS, 2, 3);
        assert_eq!(
            err.to_string(),
            "Service error: HTTP 429 Too Many Requests for chunk 3 of 3"
        );
    }

    #[test]
    fn test_short_text_is_one_chunk() {
        assert_eq!(split_text("Hello there", 100), vec!["Hello there"]);
    }

    #[test]
    fn test_blank_text_has_no_chunks() {
        assert!(split_text("   \n\t ", 100).is_empty());
    }

    #[test]
    fn test_chunks_respect_limit_without_breaking_words() {
        let text = "I find myself genuinely curious about almost everything, which is probably \
                    the closest thing I have to a superpower and I try to use it well every day";
        let chunks = split_text(text, 40);

        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 40, "chunk too long: {chunk:?}");
        }
        assert_eq!(chunks.join(" "), text.split_whitespace().collect::<Vec<_>>().join(" "));
    }

    #[test]
    fn test_sentence_boundaries_end_chunks() {
        let chunks = split_text("Curiosity. Honesty! Warmth?", 100);
        assert_eq!(chunks, vec!["Curiosity.", "Honesty!", "Warmth?"]);
    }

    #[test]
    fn test_oversized_word_is_hard_wrapped() {
        let word = "a".repeat(25);
        let chunks = split_text(&word, 10);
        assert_eq!(chunks, vec!["a".repeat(10), "a".repeat(10), "a".repeat(5)]);
    }

    #[test]
    fn test_multibyte_characters_counted_as_chars() {
        let chunks = split_text("héllo wörld", 5);
        assert_eq!(chunks, vec!["héllo", "wörld"]);
    }

    #[tokio::test]
    async fn test_empty_text_is_an_error() {
        let tts = GoogleTranslateTts::new(false, 5).unwrap();
        let err = tts.synthesize("  ", "en").await.unwrap_err();
        assert!(matches!(err, SpeechError::EmptyText));
    }
}
