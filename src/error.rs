use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::providers::ProviderError;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Missing authentication token")]
    MissingToken,

    #[error("Invalid authentication token")]
    InvalidToken,

    #[error("Bad Request: {0}")]
    BadRequest(String),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Internal Server Error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::MissingToken => {
                tracing::warn!("Missing authentication token");
                (
                    StatusCode::UNAUTHORIZED,
                    "Missing authentication token".to_string(),
                )
            }
            AppError::InvalidToken => {
                tracing::warn!("Invalid authentication token");
                (
                    StatusCode::FORBIDDEN,
                    "Invalid authentication token".to_string(),
                )
            }
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Provider(err) => {
                // Full detail stays in the server log; the client only
                // sees the sanitized text.
                tracing::error!("Provider error: {:?}", err);
                let status = match &err {
                    ProviderError::Credentials => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::BAD_GATEWAY,
                };
                (status, err.public_message())
            }
            AppError::Internal(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "status": "failure",
            "message": message
        }));

        (status, body).into_response()
    }
}
