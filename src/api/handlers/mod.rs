//! Route handlers and the helpers they share.

pub mod error;
pub mod health;
pub mod login;
pub mod register;
pub mod reset;
pub mod session;
pub mod state;
pub mod types;

pub use error::{ApiError, ErrorBody};
pub use state::{spawn_janitor, AppState};

use axum::{
    http::{header::AUTHORIZATION, HeaderMap},
    Json,
};
use ulid::Ulid;

/// Unwrap an optional JSON body, rejecting a missing or malformed one.
pub(crate) fn require<T>(payload: Option<Json<T>>) -> Result<T, ApiError> {
    payload
        .map(|Json(payload)| payload)
        .ok_or_else(|| ApiError::BadRequest("Missing payload".to_string()))
}

pub(crate) fn parse_id(field: &str, value: &str) -> Result<Ulid, ApiError> {
    Ulid::from_string(value.trim()).map_err(|_| ApiError::BadRequest(format!("Invalid {field}")))
}

pub(crate) fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
