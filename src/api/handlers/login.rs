//! Step-wise login endpoints.

use super::{
    parse_id, require,
    types::{
        BiometricRequest, GeofenceRequest, IssuedSessionBody, LoginOtpRequest, LoginRequest,
        LoginResponse, OtpDispatch, PinRequest, PrimaryRequest,
    },
    ApiError, AppState, ErrorBody,
};
use crate::{
    auth::{DeviceCapabilities, LoginAttempt, LoginProgress, PrimaryCredential},
    collaborators::{BiometricSample, ReportedPosition},
    error::AuthError,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use secrecy::{ExposeSecret, SecretString};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

fn lookup(state: &AppState, attempt_id: &str) -> Result<Arc<Mutex<LoginAttempt>>, ApiError> {
    let id = parse_id("attempt_id", attempt_id)?;
    state.attempt(id).ok_or(ApiError::NotFound("login attempt"))
}

fn pending(attempt: &LoginAttempt) -> LoginResponse {
    LoginResponse {
        attempt_id: attempt.id.to_string(),
        step: attempt.step(),
        remaining: attempt.remaining_steps(),
        otp: None,
        session: None,
    }
}

/// Shape the outcome of a step; a finished attempt is no longer tracked.
fn respond(state: &AppState, attempt: &LoginAttempt, progress: LoginProgress) -> LoginResponse {
    match progress {
        LoginProgress::Next(_) => pending(attempt),
        LoginProgress::Complete(issued) => {
            state.forget_attempt(attempt.id);
            LoginResponse {
                session: Some(IssuedSessionBody {
                    token: issued.token.expose_secret().to_string(),
                    session: issued.session,
                }),
                ..pending(attempt)
            }
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/login",
    request_body = LoginRequest,
    responses(
        (status = 201, description = "Attempt started; `step` is the first factor to present", body = LoginResponse),
        (status = 401, description = "Unknown account", body = ErrorBody)
    ),
    tag = "login"
)]
#[instrument(skip_all)]
pub async fn begin(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = require(payload)?;
    let attempt = state
        .engine()
        .login()
        .begin(
            &request.email,
            DeviceCapabilities {
                biometric_hardware: request.biometric_hardware,
            },
        )
        .await?;
    let response = pending(&attempt);
    state.track_attempt(attempt);
    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/v1/login/otp",
    request_body = LoginOtpRequest,
    responses(
        (status = 200, description = "Login code sent", body = LoginResponse),
        (status = 403, description = "Account not verified", body = ErrorBody)
    ),
    tag = "login"
)]
pub async fn request_otp(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<LoginOtpRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.attempt_id)?;
    let attempt = entry.lock().await;
    let issued = state
        .engine()
        .login()
        .request_otp(&attempt, request.channel)
        .await?;
    Ok(Json(LoginResponse {
        otp: Some(OtpDispatch::from(&issued)),
        ..pending(&attempt)
    }))
}

#[utoipa::path(
    post,
    path = "/v1/login/primary",
    request_body = PrimaryRequest,
    responses(
        (status = 200, description = "Primary factor accepted", body = LoginResponse),
        (status = 401, description = "Credentials do not match", body = ErrorBody),
        (status = 423, description = "Too many failures", body = ErrorBody)
    ),
    tag = "login"
)]
pub async fn primary(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<PrimaryRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = require(payload)?;
    let credential = match (request.password, request.otp_code) {
        (Some(password), None) => PrimaryCredential::Password(SecretString::from(password)),
        (None, Some(code)) => PrimaryCredential::Otp(code),
        _ => {
            return Err(AuthError::validation(
                "primary",
                "Provide either a password or a one-time code",
            )
            .into())
        }
    };
    let entry = lookup(&state, &request.attempt_id)?;
    let mut attempt = entry.lock().await;
    let progress = state.engine().login().primary(&mut attempt, credential).await?;
    Ok(Json(respond(&state, &attempt, progress)))
}

#[utoipa::path(
    post,
    path = "/v1/login/biometric",
    request_body = BiometricRequest,
    responses(
        (status = 200, description = "Face matched", body = LoginResponse),
        (status = 401, description = "Face did not match", body = ErrorBody),
        (status = 504, description = "Matcher timed out", body = ErrorBody)
    ),
    tag = "login"
)]
pub async fn biometric(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<BiometricRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.attempt_id)?;
    let mut attempt = entry.lock().await;
    let progress = state
        .engine()
        .login()
        .biometric(&mut attempt, &BiometricSample(request.sample))
        .await?;
    Ok(Json(respond(&state, &attempt, progress)))
}

#[utoipa::path(
    post,
    path = "/v1/login/geofence",
    request_body = GeofenceRequest,
    responses(
        (status = 200, description = "Inside the allowed area", body = LoginResponse),
        (status = 400, description = "Location unavailable", body = ErrorBody),
        (status = 403, description = "Outside the allowed area", body = ErrorBody)
    ),
    tag = "login"
)]
pub async fn geofence(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<GeofenceRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.attempt_id)?;
    let mut attempt = entry.lock().await;
    let progress = state
        .engine()
        .login()
        .geofence(&mut attempt, &ReportedPosition(request.position))
        .await?;
    Ok(Json(respond(&state, &attempt, progress)))
}

#[utoipa::path(
    post,
    path = "/v1/login/pin",
    request_body = PinRequest,
    responses(
        (status = 200, description = "PIN accepted", body = LoginResponse),
        (status = 401, description = "PIN does not match", body = ErrorBody)
    ),
    tag = "login"
)]
pub async fn pin(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<PinRequest>>,
) -> Result<Json<LoginResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.attempt_id)?;
    let mut attempt = entry.lock().await;
    let progress = state
        .engine()
        .login()
        .pin(&mut attempt, &SecretString::from(request.pin))
        .await?;
    Ok(Json(respond(&state, &attempt, progress)))
}
