use axum::http::StatusCode;
use axum::response::{ IntoResponse, Response };
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::agent::APOLOGY_REPLY;
use crate::llm::chat::BoxError;
use crate::models::chat::timestamp_now;

pub const CONFIGURATION_APOLOGY: &str =
    "I apologize, but I'm experiencing technical difficulties. Please contact us directly for assistance.";

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("request body is not a valid chat request")]
    InvalidBody,
    #[error("message is missing, empty or not a string")]
    MissingMessage,
    #[error("no chat provider is configured")]
    Configuration,
    #[error("chat request rate limit exceeded")]
    RateLimited,
    #[error("provider call failed: {0}")]
    Provider(BoxError),
}

impl IntoResponse for RelayError {
    fn into_response(self) -> Response {
        match self {
            RelayError::InvalidBody =>
                (StatusCode::BAD_REQUEST, Json(json!({ "error": "Invalid request body" }))).into_response(),
            RelayError::MissingMessage =>
                (
                    StatusCode::BAD_REQUEST,
                    Json(json!({ "error": "Message is required and must be a string" })),
                ).into_response(),
            RelayError::RateLimited =>
                (
                    StatusCode::TOO_MANY_REQUESTS,
                    Json(json!({ "error": "Too many requests. Please slow down." })),
                ).into_response(),
            RelayError::Configuration =>
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(
                        json!({
                            "error": "Server configuration error",
                            "reply": CONFIGURATION_APOLOGY,
                            "showDemoButton": false,
                            "timestamp": timestamp_now(),
                        })
                    ),
                ).into_response(),
            RelayError::Provider(_) =>
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(
                        json!({
                            "error": "Sorry, I encountered an issue. Please try again.",
                            "reply": APOLOGY_REPLY,
                            "showDemoButton": false,
                            "timestamp": timestamp_now(),
                        })
                    ),
                ).into_response(),
        }
    }
}
