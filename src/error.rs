use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("Stale bar: time {time} is older than last accepted bar {last}")]
    StaleBar { time: i64, last: i64 },

    #[error("Unknown indicator: {0}")]
    UnknownIndicator(String),

    #[error("Unknown resolution: {0}")]
    UnknownResolution(String),

    #[error("Insufficient data: need {required} bars, got {got}")]
    InsufficientData { required: usize, got: usize },

    #[error("Brick walk failed: {0}")]
    BrickWalk(String),

    #[error("Notifier error: {0}")]
    Notifier(String),

    #[error("External API error: {0}")]
    ExternalApi(String),

    #[error("WebSocket error: {0}")]
    WebSocket(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),

    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::UnknownIndicator(_)
            | AppError::UnknownResolution(_)
            | AppError::InvalidEvent(_)
            | AppError::InvalidTimestamp(_)
            | AppError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            AppError::StaleBar { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::ExternalApi(msg) => (StatusCode::BAD_GATEWAY, msg.clone()),
            AppError::Reqwest(e) => (StatusCode::BAD_GATEWAY, e.to_string()),
            AppError::SerdeJson(e) => (StatusCode::BAD_REQUEST, e.to_string()),
            _ => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": message,
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
