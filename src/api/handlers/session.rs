//! Bearer-token session endpoints.

use super::{
    extract_bearer_token, require,
    types::{LogoutResponse, SampleRequest},
    ApiError, AppState, ErrorBody,
};
use crate::{auth::SessionValidation, collaborators::BiometricSample};
use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::debug;

#[utoipa::path(
    get,
    path = "/v1/session",
    params(
        ("Authorization" = String, Header, description = "Bearer session token")
    ),
    responses(
        (status = 200, description = "Token state; `valid` is false for unknown or ended sessions", body = SessionValidation),
        (status = 401, description = "Missing bearer token", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn validate(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
) -> Result<Json<SessionValidation>, ApiError> {
    let token = extract_bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    Ok(Json(state.engine().validate(&token)))
}

#[utoipa::path(
    post,
    path = "/v1/session/sample",
    request_body = SampleRequest,
    params(
        ("Authorization" = String, Header, description = "Bearer session token")
    ),
    responses(
        (status = 202, description = "Sample queued for the session monitor"),
        (status = 401, description = "Session is not live", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn push_sample(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
    payload: Option<Json<SampleRequest>>,
) -> Result<StatusCode, ApiError> {
    let token = extract_bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let request = require(payload)?;
    let session = state.engine().sessions().authenticate(&token)?;
    if state.inbox().push(session.id, BiometricSample(request.sample)) {
        debug!(session_id = %session.id, "live sample queued");
    } else {
        debug!(session_id = %session.id, "session is not monitored, sample dropped");
    }
    Ok(StatusCode::ACCEPTED)
}

#[utoipa::path(
    post,
    path = "/v1/logout",
    params(
        ("Authorization" = String, Header, description = "Bearer session token")
    ),
    responses(
        (status = 200, description = "Session ended", body = LogoutResponse),
        (status = 401, description = "Session is not live", body = ErrorBody)
    ),
    tag = "session"
)]
pub async fn logout(
    headers: HeaderMap,
    state: Extension<Arc<AppState>>,
) -> Result<Json<LogoutResponse>, ApiError> {
    let token = extract_bearer_token(&headers).ok_or(ApiError::Unauthorized)?;
    let session = state.engine().logout(&token)?;
    Ok(Json(LogoutResponse {
        session_id: session.id.to_string(),
        account_id: session.account_id,
    }))
}
