//! Persona Voice Bot API
//!
//! Ask personal questions and get answers in the voice of a fixed persona.
//! Replies come from a hosted language model, can be spoken back through a
//! text-to-speech service, and questions can be asked by voice.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;
mod conversation;
mod core;
mod providers;
mod routes;
mod speech;

use crate::config::{Config, PromptTemplate};
use crate::core::{SessionFactory, SessionStore};
use crate::speech::{GoogleTranslateTts, RecognizerChain, SpeechRecognizer, WhisperConfig, WhisperRecognizer};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub sessions: Arc<SessionStore>,
    pub recognizer: Arc<RecognizerChain>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "persona_voicebot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;

    let template = match config.persona_file {
        Some(ref path) => PromptTemplate::load_from_file(path).await?,
        None => PromptTemplate::builtin(),
    };
    tracing::info!("🎭 Persona: {}", template.name());

    let mut factory = SessionFactory::new(template).with_failure_policy(config.failure_policy);

    factory = match providers::from_settings(&config.llm) {
        Ok(model) => {
            tracing::info!("🧠 Language model: {} ({})", model.name(), model.model());
            factory.with_model(model)
        }
        Err(providers::ProviderError::NotConfigured(reason)) => {
            tracing::warn!("⚠️ Language model not configured: {}", reason);
            factory.with_not_configured_reason(reason)
        }
        Err(e) => return Err(e.into()),
    };

    let mut tts = GoogleTranslateTts::new(config.speech.slow, config.speech.timeout_secs)?;
    if let Some(ref url) = config.speech.tts_url {
        tts = tts.with_url(url.clone());
    }
    factory = factory.with_synthesizer(Arc::new(tts), config.speech.language.clone());

    let server_recognizer: Option<Arc<dyn SpeechRecognizer>> = match config.llm.openai_api_key {
        Some(ref api_key) => {
            let mut whisper = WhisperConfig {
                api_key: Some(api_key.clone()),
                model: config.speech.stt_model.clone(),
                timeout_secs: config.speech.timeout_secs,
                ..WhisperConfig::default()
            };
            if let Some(ref base_url) = config.llm.openai_base_url {
                whisper.base_url = base_url.clone();
            }
            Some(Arc::new(WhisperRecognizer::new(whisper)?))
        }
        None => {
            tracing::info!("Server-side transcription disabled (no OPENAI_API_KEY)");
            None
        }
    };

    let state = AppState {
        sessions: Arc::new(SessionStore::new(factory)),
        recognizer: Arc::new(RecognizerChain::new(server_recognizer)),
    };

    let app = Router::new()
        .merge(routes::router(config.speech.max_audio_bytes))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    tracing::info!("🔊 Voice bot API running at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
