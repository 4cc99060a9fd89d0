//! Error taxonomy for the authentication engine.
//!
//! Every rejection carries a specific kind so a client can render the right
//! next action (resend OTP, re-enable location, retry biometric, ...).

use crate::identity::ValidationErrors;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),
    #[error("an account with this government ID or email already exists")]
    Conflict,
    #[error("one-time code expired")]
    OtpExpired,
    #[error("one-time code does not match")]
    OtpMismatch,
    #[error("no pending one-time code")]
    OtpNotFound,
    #[error("not enough authentication factors enabled: {0}")]
    InsufficientFactors(String),
    #[error("consent required: {0}")]
    ConsentRequired(&'static str),
    #[error("account is not verified")]
    NotVerified,
    #[error("invalid credentials")]
    CredentialMismatch,
    #[error("biometric verification failed")]
    BiometricFailed,
    #[error("location unavailable")]
    LocationUnavailable,
    #[error("current location is outside the allowed area")]
    OutOfRange,
    #[error("PIN does not match")]
    PinMismatch,
    #[error("session revoked: {0}")]
    SessionRevoked(&'static str),
    #[error("{collaborator} did not answer in time")]
    CollaboratorTimeout { collaborator: &'static str },
    #[error("{collaborator} failed: {reason}")]
    CollaboratorFailed {
        collaborator: &'static str,
        reason: String,
    },
    #[error("operation not allowed in step {current}")]
    OutOfOrder { current: String },
    #[error("attempt abandoned after too many failures")]
    AttemptFailed,
    #[error("invariant violated: {0}")]
    Invariant(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl AuthError {
    /// Stable identifier for clients.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::Conflict => "conflict",
            Self::OtpExpired => "otp_expired",
            Self::OtpMismatch => "otp_mismatch",
            Self::OtpNotFound => "otp_not_found",
            Self::InsufficientFactors(_) => "insufficient_factors",
            Self::ConsentRequired(_) => "consent_required",
            Self::NotVerified => "not_verified",
            Self::CredentialMismatch => "credential_mismatch",
            Self::BiometricFailed => "biometric_failed",
            Self::LocationUnavailable => "location_unavailable",
            Self::OutOfRange => "out_of_range",
            Self::PinMismatch => "pin_mismatch",
            Self::SessionRevoked(_) => "session_revoked",
            Self::CollaboratorTimeout { .. } => "collaborator_timeout",
            Self::CollaboratorFailed { .. } => "collaborator_failed",
            Self::OutOfOrder { .. } => "out_of_order",
            Self::AttemptFailed => "attempt_failed",
            Self::Invariant(_) => "invariant_violation",
            Self::Storage(_) => "storage_failure",
        }
    }

    /// Fatal errors abort the attempt; everything else lets the caller retry the step.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Invariant(_) | Self::Storage(_))
    }

    /// Credential mismatches count against the login retry budget.
    #[must_use]
    pub fn is_mismatch(&self) -> bool {
        matches!(
            self,
            Self::CredentialMismatch
                | Self::OtpMismatch
                | Self::BiometricFailed
                | Self::OutOfRange
                | Self::PinMismatch
        )
    }

    pub(crate) fn validation(field: &str, message: &str) -> Self {
        Self::Validation(ValidationErrors::single(field, message))
    }
}

impl From<ValidationErrors> for AuthError {
    fn from(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }
}
