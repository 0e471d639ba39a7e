use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use shared::AppError;
use tracing::warn;

use crate::api::AppState;

pub async fn require_admin(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "));

    match token {
        Some(token) if tokens_match(token.trim(), &state.admin_token) => Ok(next.run(request).await),
        Some(_) => {
            warn!("Rejected admin request with an invalid token");
            Err(AppError::Unauthorized)
        }
        None => Err(AppError::Unauthorized),
    }
}

// Compares every byte so the time taken does not reveal the matching prefix.
fn tokens_match(provided: &str, expected: &str) -> bool {
    if provided.len() != expected.len() || expected.is_empty() {
        return false;
    }
    provided
        .bytes()
        .zip(expected.bytes())
        .fold(0u8, |acc, (a, b)| acc | (a ^ b))
        == 0
}
