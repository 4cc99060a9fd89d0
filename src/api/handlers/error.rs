//! JSON error bodies and the status each error kind maps to.

use crate::{error::AuthError, identity::FieldError};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ErrorBody {
    pub error: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<FieldError>,
}

#[derive(Debug)]
pub enum ApiError {
    Auth(AuthError),
    /// Unknown or already finished process/attempt id.
    NotFound(&'static str),
    BadRequest(String),
    Unauthorized,
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        Self::Auth(err)
    }
}

#[must_use]
pub fn status_for(err: &AuthError) -> StatusCode {
    match err {
        AuthError::Validation(_)
        | AuthError::InsufficientFactors(_)
        | AuthError::ConsentRequired(_) => StatusCode::UNPROCESSABLE_ENTITY,
        AuthError::Conflict | AuthError::OutOfOrder { .. } => StatusCode::CONFLICT,
        AuthError::OtpExpired => StatusCode::GONE,
        AuthError::OtpNotFound | AuthError::LocationUnavailable => StatusCode::BAD_REQUEST,
        AuthError::NotVerified | AuthError::OutOfRange => StatusCode::FORBIDDEN,
        AuthError::OtpMismatch
        | AuthError::CredentialMismatch
        | AuthError::BiometricFailed
        | AuthError::PinMismatch
        | AuthError::SessionRevoked(_) => StatusCode::UNAUTHORIZED,
        AuthError::AttemptFailed => StatusCode::LOCKED,
        AuthError::CollaboratorTimeout { .. } => StatusCode::GATEWAY_TIMEOUT,
        AuthError::CollaboratorFailed { .. } => StatusCode::BAD_GATEWAY,
        AuthError::Invariant(_) | AuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            Self::Auth(err) => {
                let status = status_for(&err);
                let fields = match &err {
                    AuthError::Validation(errors) => errors.errors.clone(),
                    _ => Vec::new(),
                };
                // Internal details stay in the log.
                let message = if err.is_fatal() {
                    error!("request failed: {err}");
                    "Internal error".to_string()
                } else {
                    err.to_string()
                };
                (
                    status,
                    ErrorBody {
                        error: err.kind().to_string(),
                        message,
                        fields,
                    },
                )
            }
            Self::NotFound(what) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    error: "not_found".to_string(),
                    message: format!("{what} not found"),
                    fields: Vec::new(),
                },
            ),
            Self::BadRequest(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: "bad_request".to_string(),
                    message,
                    fields: Vec::new(),
                },
            ),
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "unauthorized".to_string(),
                    message: "Missing bearer token".to_string(),
                    fields: Vec::new(),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses_follow_error_kind() {
        assert_eq!(status_for(&AuthError::Conflict), StatusCode::CONFLICT);
        assert_eq!(status_for(&AuthError::OtpExpired), StatusCode::GONE);
        assert_eq!(status_for(&AuthError::PinMismatch), StatusCode::UNAUTHORIZED);
        assert_eq!(status_for(&AuthError::AttemptFailed), StatusCode::LOCKED);
        assert_eq!(
            status_for(&AuthError::CollaboratorTimeout {
                collaborator: "notifier"
            }),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            status_for(&AuthError::Storage("poisoned".to_string())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn fatal_errors_hide_details() {
        let response = ApiError::from(AuthError::Storage("lock poisoned".to_string())).into_response();
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
