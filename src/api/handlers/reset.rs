use super::{
    require,
    types::{OtpDispatch, ResetOtpRequest, ResetRequest, ResetResponse},
    ApiError, AppState, ErrorBody,
};
use crate::{auth::FactorResetRequest, collaborators::BiometricSample};
use axum::{extract::Extension, Json};
use secrecy::SecretString;
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    post,
    path = "/v1/factors/reset/otp",
    request_body = ResetOtpRequest,
    responses(
        (status = 200, description = "Reset code sent", body = OtpDispatch),
        (status = 401, description = "Unknown account", body = ErrorBody),
        (status = 403, description = "Account not verified", body = ErrorBody)
    ),
    tag = "factors"
)]
pub async fn request_reset_otp(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResetOtpRequest>>,
) -> Result<Json<OtpDispatch>, ApiError> {
    let request = require(payload)?;
    let issued = state
        .engine()
        .request_factor_reset_otp(&request.email, request.channel)
        .await?;
    Ok(Json(OtpDispatch::from(&issued)))
}

#[utoipa::path(
    post,
    path = "/v1/factors/reset",
    request_body = ResetRequest,
    responses(
        (status = 200, description = "Factors replaced, sessions revoked", body = ResetResponse),
        (status = 401, description = "Ownership not proven", body = ErrorBody),
        (status = 422, description = "New factors invalid", body = ErrorBody),
        (status = 423, description = "Reset locked after repeated failures", body = ErrorBody)
    ),
    tag = "factors"
)]
#[instrument(skip_all)]
pub async fn reset_factors(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResetRequest>>,
) -> Result<Json<ResetResponse>, ApiError> {
    let request = require(payload)?;
    let outcome = state
        .engine()
        .reset_factors(FactorResetRequest {
            email: request.email,
            pin: request.pin.map(SecretString::from),
            otp_code: request.otp_code,
            sample: request.sample.map(BiometricSample),
            selection: request.factors.into_selection(),
        })
        .await?;
    Ok(Json(ResetResponse {
        account_id: outcome.account_id,
        factors: outcome.factors,
        revoked_sessions: outcome.revoked_sessions,
    }))
}
