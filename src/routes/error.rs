//! API error responses
//!
//! Every failure is returned as `{ "error": <code>, "message": <text> }` with a
//! matching status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::core::SessionError;

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
}

#[derive(Debug)]
pub enum ApiError {
    /// 400 - missing or invalid input
    BadRequest(String),
    /// 404 - unknown session or message
    NotFound(String),
    /// 415 - request body is not audio
    UnsupportedMedia(String),
    /// 500 - unexpected server error
    Internal(String),
    /// 502 - a collaborator produced nothing usable
    BadGateway(String),
    /// 503 - no language model credential configured
    NotConfigured(String),
    /// 503 - optional component missing
    ServiceUnavailable(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg),
            ApiError::UnsupportedMedia(msg) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "unsupported_media_type", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, "no_audio", msg),
            ApiError::NotConfigured(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "not_configured", msg)
            }
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "service_unavailable", msg)
            }
        };

        let body = ErrorBody {
            error: code.to_string(),
            message,
        };

        (status, Json(body)).into_response()
    }
}

impl From<SessionError> for ApiError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotConfigured(_) => ApiError::NotConfigured(format!(
                "{}. Set an API key for the language model to continue.",
                err
            )),
            SessionError::NoSuchMessage(_) => ApiError::NotFound(err.to_string()),
        }
    }
}
