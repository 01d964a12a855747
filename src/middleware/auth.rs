use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use sha2::{Digest, Sha256};

use crate::AppState;
use crate::error::AppError;

pub const AUTH_HEADER: &str = "x-auth-token";

/// Gate for the upload route: requires `X-Auth-Token` to match the
/// configured shared secret. Missing header is 401, mismatch is 403;
/// neither reaches the handler.
pub async fn require_auth_token(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = req
        .headers()
        .get(AUTH_HEADER)
        .and_then(|value| value.to_str().ok());

    match token {
        None => Err(AppError::MissingToken),
        Some(token) if !token_matches(token, &state.settings.auth_token) => {
            Err(AppError::InvalidToken)
        }
        Some(_) => Ok(next.run(req).await),
    }
}

/// Digest equality instead of string equality, so the comparison does
/// not terminate early on the first differing byte.
pub fn token_matches(candidate: &str, expected: &str) -> bool {
    Sha256::digest(candidate.as_bytes()) == Sha256::digest(expected.as_bytes())
}
