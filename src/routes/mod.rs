//! API routes

mod error;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Json, Response},
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use tower_http::limit::RequestBodyLimitLayer;
use uuid::Uuid;

use crate::conversation::{Message, Role};
use crate::core::{Exchange, SessionHandle, SessionState};
use crate::speech::{AudioInput, SpeechError, SpeechRecognizer, Transcription};
use crate::AppState;

pub use error::{ApiError, ErrorBody};

#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub language_model_configured: bool,
    pub server_transcription: bool,
    /// Sessions not yet deleted by their clients
    pub open_sessions: usize,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PersonaResponse {
    pub name: String,
    pub description: String,
    pub sample_questions: Vec<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreatedSession {
    pub session_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageView {
    pub index: usize,
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// Time of day for display
    pub time: String,
}

impl MessageView {
    fn new(index: usize, message: &Message) -> Self {
        Self {
            index,
            role: message.role,
            content: message.content.clone(),
            timestamp: message.timestamp,
            time: message.display_time(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionView {
    pub session_id: Uuid,
    pub state: SessionState,
    pub created_at: DateTime<Utc>,
    pub messages: Vec<MessageView>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitRequest {
    pub message: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResetResponse {
    pub cleared: usize,
}

#[derive(Debug, Deserialize)]
pub struct SpeechRequest {
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub message_index: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct VoiceRequest {
    pub transcript: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceResponse {
    pub transcription: Transcription,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exchange: Option<Exchange>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        language_model_configured: state.sessions.factory().is_configured(),
        server_transcription: state.recognizer.accepts_audio(),
        open_sessions: state.sessions.len().await,
    })
}

async fn persona(State(state): State<AppState>) -> Json<PersonaResponse> {
    let template = state.sessions.factory().template();
    Json(PersonaResponse {
        name: template.persona.name.clone(),
        description: template.persona.description.clone(),
        sample_questions: template.examples.questions.clone(),
    })
}

async fn create_session(State(state): State<AppState>) -> (StatusCode, Json<CreatedSession>) {
    let (session_id, _) = state.sessions.create().await;
    (StatusCode::CREATED, Json(CreatedSession { session_id }))
}

async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionView>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;

    Ok(Json(SessionView {
        session_id: session.id(),
        state: session.state(),
        created_at: session.created_at(),
        messages: session
            .transcript()
            .messages()
            .iter()
            .enumerate()
            .map(|(i, m)| MessageView::new(i, m))
            .collect(),
    }))
}

async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    if state.sessions.remove(&id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(session_not_found(&id))
    }
}

async fn submit_message(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SubmitRequest>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, &id).await?;

    match submit(handle, request.message).await? {
        Some(exchange) => Ok(Json(exchange).into_response()),
        None => Ok(StatusCode::NO_CONTENT.into_response()),
    }
}

async fn reset_messages(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ResetResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let cleared = handle.lock().await.reset();
    Ok(Json(ResetResponse { cleared }))
}

async fn speech(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<SpeechRequest>,
) -> Result<Response, ApiError> {
    let handle = find_session(&state, &id).await?;
    let session = handle.lock().await;

    let audio = match (request.text, request.message_index) {
        (Some(text), None) => session.synthesize(&text).await,
        (None, Some(index)) => session.synthesize_message(index).await?,
        _ => {
            return Err(ApiError::BadRequest(
                "Provide exactly one of `text` or `message_index`".to_string(),
            ))
        }
    };

    match audio {
        Some(bytes) => Ok((
            [(header::CONTENT_TYPE, session.audio_mime_type().to_string())],
            bytes,
        )
            .into_response()),
        None => Err(ApiError::BadGateway("No audio was produced".to_string())),
    }
}

/// Text recognized in the browser, then submitted
async fn voice(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(request): Json<VoiceRequest>,
) -> Result<Json<VoiceResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;
    let transcription = state
        .recognizer
        .transcribe(AudioInput::Transcript(request.transcript))
        .await;

    respond_to_transcription(handle, transcription).await
}

/// Audio streamed in the request body, transcribed on the server, then submitted
async fn audio(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
    body: Body,
) -> Result<Json<VoiceResponse>, ApiError> {
    let handle = find_session(&state, &id).await?;

    if !state.recognizer.accepts_audio() {
        return Err(ApiError::ServiceUnavailable(
            "Server-side speech recognition is not configured".to_string(),
        ));
    }

    let mime_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    if !(mime_type.starts_with("audio/") || mime_type == "application/octet-stream") {
        return Err(ApiError::UnsupportedMedia(format!(
            "Expected an audio body, got {}",
            mime_type
        )));
    }

    let chunks = body
        .into_data_stream()
        .map_ok(|bytes| bytes.to_vec())
        .map_err(|e| SpeechError::Stream(e.to_string()))
        .boxed();

    let transcription = state
        .recognizer
        .transcribe(AudioInput::Stream { chunks, mime_type })
        .await;

    respond_to_transcription(handle, transcription).await
}

async fn respond_to_transcription(
    handle: SessionHandle,
    transcription: Transcription,
) -> Result<Json<VoiceResponse>, ApiError> {
    let exchange = match transcription.text() {
        Some(text) => submit(handle, text.to_string()).await?,
        None => {
            tracing::info!("No usable speech: {:?}", transcription);
            None
        }
    };

    Ok(Json(VoiceResponse {
        transcription,
        exchange,
    }))
}

/// Run `submit` to completion even if the client goes away, so the
/// transcript never keeps a question without its answer
async fn submit(handle: SessionHandle, utterance: String) -> Result<Option<Exchange>, ApiError> {
    let task = tokio::spawn(async move {
        let mut session = handle.lock().await;
        session.submit(&utterance).await
    });

    let result = task
        .await
        .map_err(|e| ApiError::Internal(format!("Submit task failed: {}", e)))?;
    Ok(result?)
}

async fn find_session(state: &AppState, id: &Uuid) -> Result<SessionHandle, ApiError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| session_not_found(id))
}

fn session_not_found(id: &Uuid) -> ApiError {
    ApiError::NotFound(format!("Session {} not found", id))
}

/// Build the API router.
///
/// Audio bodies above `max_audio_bytes` are refused with 413 when they declare
/// their length, and cut off mid-stream when they don't.
pub fn router(max_audio_bytes: usize) -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/v1/persona", get(persona))
        .route("/v1/sessions", post(create_session))
        .route("/v1/sessions/:id", get(get_session).delete(delete_session))
        .route(
            "/v1/sessions/:id/messages",
            post(submit_message).delete(reset_messages),
        )
        .route("/v1/sessions/:id/speech", post(speech))
        .route("/v1/sessions/:id/voice", post(voice))
        .route(
            "/v1/sessions/:id/audio",
            post(audio).layer(RequestBodyLimitLayer::new(max_audio_bytes)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use async_trait::async_trait;
    use axum::http::Request;
    use tower::ServiceExt;

    use crate::config::PromptTemplate;
    use crate::core::{SessionFactory, SessionStore};
    use crate::providers::{LanguageModel, ProviderError};
    use crate::speech::{RecognizerChain, SpeechSynthesizer};

    struct EchoModel;

    #[async_trait]
    impl LanguageModel for EchoModel {
        fn name(&self) -> &str {
            "echo"
        }

        fn model(&self) -> &str {
            "echo-1"
        }

        async fn generate(&self, _prompt: &str) -> Result<String, ProviderError> {
            Ok("Curiosity keeps me going.".to_string())
        }
    }

    struct FixedSynthesizer;

    #[async_trait]
    impl SpeechSynthesizer for FixedSynthesizer {
        async fn synthesize(&self, text: &str, _language: &str) -> Result<Vec<u8>, SpeechError> {
            if text.is_empty() {
                Err(SpeechError::EmptyText)
            } else {
                Ok(b"AUDIO".to_vec())
            }
        }
    }

    struct FixedRecognizer;

    #[async_trait]
    impl SpeechRecognizer for FixedRecognizer {
        async fn transcribe(&self, input: AudioInput) -> Transcription {
            match input {
                AudioInput::Stream { chunks, .. } => {
                    let bytes: Vec<u8> = chunks.try_concat().await.unwrap_or_default();
                    if bytes.is_empty() {
                        Transcription::NoSpeechDetected
                    } else {
                        Transcription::Text("What motivates you the most?".to_string())
                    }
                }
                _ => Transcription::ServiceError("unexpected input".to_string()),
            }
        }
    }

    fn make_state(configured: bool) -> AppState {
        let mut factory = SessionFactory::new(PromptTemplate::builtin())
            .with_synthesizer(Arc::new(FixedSynthesizer), "en");
        factory = if configured {
            factory.with_model(Arc::new(EchoModel))
        } else {
            factory.with_not_configured_reason("GEMINI_API_KEY is not set")
        };

        AppState {
            sessions: Arc::new(SessionStore::new(factory)),
            recognizer: Arc::new(RecognizerChain::new(Some(Arc::new(FixedRecognizer)))),
        }
    }

    const TEST_AUDIO_LIMIT: usize = 1024;

    fn make_app(state: AppState) -> Router {
        router(TEST_AUDIO_LIMIT).with_state(state)
    }

    async fn body_json<T: serde::de::DeserializeOwned>(response: Response) -> T {
        let body = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_json(uri: &str, json: serde_json::Value) -> Request<Body> {
        Request::post(uri)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap()
    }

    async fn new_session(state: &AppState) -> Uuid {
        state.sessions.create().await.0
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let state = make_state(true);
        new_session(&state).await;
        let app = make_app(state);
        let response = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let health: HealthResponse = body_json(response).await;
        assert_eq!(health.status, "ok");
        assert!(health.language_model_configured);
        assert!(health.server_transcription);
        assert_eq!(health.open_sessions, 1);
    }

    #[tokio::test]
    async fn test_persona_lists_sample_questions() {
        let app = make_app(make_state(true));
        let response = app
            .oneshot(Request::get("/v1/persona").body(Body::empty()).unwrap())
            .await
            .unwrap();

        let persona: PersonaResponse = body_json(response).await;
        assert_eq!(persona.name, "Claude");
        assert_eq!(persona.sample_questions.len(), 10);
    }

    #[tokio::test]
    async fn test_create_session() {
        let state = make_state(true);
        let app = make_app(state.clone());
        let response = app
            .oneshot(Request::post("/v1/sessions").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::CREATED);
        let created: CreatedSession = body_json(response).await;
        assert!(state.sessions.get(&created.session_id).await.is_some());
    }

    #[tokio::test]
    async fn test_submit_and_read_transcript() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state.clone())
            .oneshot(post_json(
                &format!("/v1/sessions/{}/messages", id),
                serde_json::json!({ "message": "What's your #1 superpower?" }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let exchange: Exchange = body_json(response).await;
        assert_eq!(exchange.answer.content, "Curiosity keeps me going.");

        let response = make_app(state)
            .oneshot(
                Request::get(format!("/v1/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        let view: SessionView = body_json(response).await;
        assert_eq!(view.messages.len(), 2);
        assert_eq!(view.messages[0].role, Role::User);
        assert_eq!(view.messages[1].role, Role::Assistant);
        assert_eq!(view.state, SessionState::Idle);
    }

    #[tokio::test]
    async fn test_blank_submit_is_no_content() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state.clone())
            .oneshot(post_json(
                &format!("/v1/sessions/{}/messages", id),
                serde_json::json!({ "message": "   " }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        let handle = state.sessions.get(&id).await.unwrap();
        assert!(handle.lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_submit_without_credentials_is_503() {
        let state = make_state(false);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(post_json(
                &format!("/v1/sessions/{}/messages", id),
                serde_json::json!({ "message": "hi" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
        let body: ErrorBody = body_json(response).await;
        assert_eq!(body.error, "not_configured");
        assert!(body.message.contains("GEMINI_API_KEY"));
    }

    #[tokio::test]
    async fn test_unknown_session_is_404() {
        let app = make_app(make_state(true));
        let response = app
            .oneshot(
                Request::get(format!("/v1/sessions/{}", Uuid::new_v4()))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_reset_clears_messages() {
        let state = make_state(true);
        let id = new_session(&state).await;
        {
            let handle = state.sessions.get(&id).await.unwrap();
            let mut session = handle.lock().await;
            session.submit("one").await.unwrap();
            session.submit("two").await.unwrap();
        }

        let response = make_app(state)
            .oneshot(
                Request::delete(format!("/v1/sessions/{}/messages", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let reset: ResetResponse = body_json(response).await;
        assert_eq!(reset.cleared, 4);
    }

    #[tokio::test]
    async fn test_speech_returns_audio() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(post_json(
                &format!("/v1/sessions/{}/speech", id),
                serde_json::json!({ "text": "hello" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "audio/mpeg");
        let body = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        assert_eq!(&body[..], b"AUDIO");
    }

    #[tokio::test]
    async fn test_speech_failure_is_502() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(post_json(
                &format!("/v1/sessions/{}/speech", id),
                serde_json::json!({ "text": "" }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }

    #[tokio::test]
    async fn test_speech_requires_one_source() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(post_json(
                &format!("/v1/sessions/{}/speech", id),
                serde_json::json!({ "text": "hello", "message_index": 0 }),
            ))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_voice_transcript_is_submitted() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(post_json(
                &format!("/v1/sessions/{}/voice", id),
                serde_json::json!({ "transcript": "  How do you handle challenging situations? " }),
            ))
            .await
            .unwrap();

        let voice: VoiceResponse = body_json(response).await;
        assert_eq!(
            voice.transcription,
            Transcription::Text("How do you handle challenging situations?".to_string())
        );
        let exchange = voice.exchange.unwrap();
        assert_eq!(
            exchange.question.content,
            "How do you handle challenging situations?"
        );
    }

    #[tokio::test]
    async fn test_blank_voice_transcript_submits_nothing() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state.clone())
            .oneshot(post_json(
                &format!("/v1/sessions/{}/voice", id),
                serde_json::json!({ "transcript": "" }),
            ))
            .await
            .unwrap();

        let voice: VoiceResponse = body_json(response).await;
        assert_eq!(voice.transcription, Transcription::NoSpeechDetected);
        assert!(voice.exchange.is_none());
        let handle = state.sessions.get(&id).await.unwrap();
        assert!(handle.lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_audio_upload_is_transcribed_and_submitted() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(
                Request::post(format!("/v1/sessions/{}/audio", id))
                    .header(header::CONTENT_TYPE, "audio/webm")
                    .body(Body::from(vec![1u8, 2, 3, 4]))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let voice: VoiceResponse = body_json(response).await;
        assert_eq!(voice.exchange.unwrap().answer.content, "Curiosity keeps me going.");
    }

    #[tokio::test]
    async fn test_audio_rejects_non_audio_body() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state)
            .oneshot(
                Request::post(format!("/v1/sessions/{}/audio", id))
                    .header(header::CONTENT_TYPE, "text/plain")
                    .body(Body::from("hello"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNSUPPORTED_MEDIA_TYPE);
    }

    #[tokio::test]
    async fn test_delete_session() {
        let state = make_state(true);
        let id = new_session(&state).await;

        let response = make_app(state.clone())
            .oneshot(
                Request::delete(format!("/v1/sessions/{}", id))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(state.sessions.len().await, 0);
    }

    #[tokio::test]
    async fn test_oversized_audio_is_refused() {
        let state = make_state(true);
        let id = new_session(&state).await;
        let audio = vec![0u8; TEST_AUDIO_LIMIT * 4];

        let response = make_app(state.clone())
            .oneshot(
                Request::post(format!("/v1/sessions/{}/audio", id))
                    .header(header::CONTENT_TYPE, "audio/webm")
                    .header(header::CONTENT_LENGTH, audio.len())
                    .body(Body::from(audio))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
        let handle = state.sessions.get(&id).await.unwrap();
        assert!(handle.lock().await.transcript().is_empty());
    }

    #[tokio::test]
    async fn test_oversized_audio_stream_is_cut_off() {
        let state = make_state(true);
        let id = new_session(&state).await;
        let chunks: Vec<Result<Vec<u8>, std::io::Error>> =
            (0..8).map(|_| Ok(vec![0u8; TEST_AUDIO_LIMIT / 2])).collect();

        let response = make_app(state.clone())
            .oneshot(
                Request::post(format!("/v1/sessions/{}/audio", id))
                    .header(header::CONTENT_TYPE, "audio/webm")
                    .body(Body::from_stream(futures::stream::iter(chunks)))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let voice: VoiceResponse = body_json(response).await;
        assert!(voice.exchange.is_none());
        let handle = state.sessions.get(&id).await.unwrap();
        assert!(handle.lock().await.transcript().is_empty());
    }
}
