//! Request/response types for the HTTP endpoints.
//!
//! Secrets arrive as plain strings and are wrapped in `SecretString` before
//! they reach the engine. One-time codes are never echoed back.

use crate::{
    auth::{Factor, FactorSelection, LoginStep, RegistrationStep, Session},
    collaborators::FaceReferenceId,
    geofence::{GeofenceArea, Position},
    otp::{Channel, Delivery, OtpIssued},
};
use chrono::{DateTime, Utc};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegisterRequest {
    pub full_name: String,
    pub government_id: String,
    pub email: String,
    pub phone: String,
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

fn default_channel() -> Channel {
    Channel::Email
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendOtpRequest {
    pub process_id: String,
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyOtpRequest {
    pub process_id: String,
    pub code: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DocumentsRequest {
    pub process_id: String,
    pub identity_photo: String,
    pub selfie_with_document: String,
}

/// Factors to enroll. Used by onboarding and by factor reset.
#[derive(ToSchema, Serialize, Deserialize, Debug, Default)]
pub struct FactorsBody {
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub face_reference: Option<String>,
    #[serde(default)]
    pub biometric: bool,
    #[serde(default)]
    pub geofence: Option<GeofenceArea>,
}

impl FactorsBody {
    #[must_use]
    pub fn into_selection(self) -> FactorSelection {
        FactorSelection {
            password: self.password.map(SecretString::from),
            pin: self.pin.map(SecretString::from),
            face_reference: self.face_reference.map(FaceReferenceId),
            biometric: self.biometric,
            geofence: self.geofence,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct FactorsRequest {
    pub process_id: String,
    #[serde(flatten)]
    pub factors: FactorsBody,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TermsRequest {
    pub process_id: String,
    pub terms_of_use: bool,
    #[serde(default)]
    pub data_consultation: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ProcessRequest {
    pub process_id: String,
}

/// Where a code went; the code itself stays server side.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OtpDispatch {
    pub channel: Channel,
    pub expires_at: DateTime<Utc>,
    pub delivery: Delivery,
}

impl From<&OtpIssued> for OtpDispatch {
    fn from(issued: &OtpIssued) -> Self {
        Self {
            channel: issued.channel,
            expires_at: issued.expires_at,
            delivery: issued.delivery,
        }
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct RegistrationResponse {
    pub process_id: String,
    pub step: RegistrationStep,
    pub account_id: Option<Uuid>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpDispatch>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct AccountResponse {
    pub process_id: String,
    pub step: RegistrationStep,
    pub account_id: Uuid,
    pub email: String,
    pub factors: Vec<Factor>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    #[serde(default)]
    pub biometric_hardware: bool,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginOtpRequest {
    pub attempt_id: String,
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

/// Exactly one of `password` or `otp_code`.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PrimaryRequest {
    pub attempt_id: String,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default)]
    pub otp_code: Option<String>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct BiometricRequest {
    pub attempt_id: String,
    pub sample: String,
}

/// `position` is absent when the device denied location access.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct GeofenceRequest {
    pub attempt_id: String,
    #[serde(default)]
    pub position: Option<Position>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PinRequest {
    pub attempt_id: String,
    pub pin: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct IssuedSessionBody {
    pub token: String,
    pub session: Session,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginResponse {
    pub attempt_id: String,
    pub step: LoginStep,
    pub remaining: Vec<LoginStep>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub otp: Option<OtpDispatch>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session: Option<IssuedSessionBody>,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SampleRequest {
    pub sample: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LogoutResponse {
    pub session_id: String,
    pub account_id: Uuid,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetOtpRequest {
    pub email: String,
    #[serde(default = "default_channel")]
    pub channel: Channel,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetRequest {
    pub email: String,
    #[serde(default)]
    pub pin: Option<String>,
    #[serde(default)]
    pub otp_code: Option<String>,
    #[serde(default)]
    pub sample: Option<String>,
    pub factors: FactorsBody,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResetResponse {
    pub account_id: Uuid,
    pub factors: Vec<Factor>,
    pub revoked_sessions: usize,
}
