//! Onboarding endpoints. Every call after the first names its `process_id`.

use super::{
    parse_id, require,
    types::{
        AccountResponse, DocumentsRequest, FactorsRequest, OtpDispatch, ProcessRequest,
        RegisterRequest, RegistrationResponse, ResendOtpRequest, TermsRequest, VerifyOtpRequest,
    },
    ApiError, AppState, ErrorBody,
};
use crate::{
    auth::{Account, Consent, RegistrationPipeline},
    collaborators::DocumentHandles,
    identity::IdentityInfo,
};
use axum::{extract::Extension, http::StatusCode, response::IntoResponse, Json};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::instrument;

fn lookup(state: &AppState, process_id: &str) -> Result<Arc<Mutex<RegistrationPipeline>>, ApiError> {
    let id = parse_id("process_id", process_id)?;
    state
        .registration(id)
        .ok_or(ApiError::NotFound("registration process"))
}

fn progress(pipeline: &RegistrationPipeline, otp: Option<OtpDispatch>) -> RegistrationResponse {
    RegistrationResponse {
        process_id: pipeline.id().to_string(),
        step: pipeline.step(),
        account_id: pipeline.process().account_id,
        otp,
    }
}

fn activated(state: &AppState, pipeline: &RegistrationPipeline, account: &Account) -> AccountResponse {
    state.forget_registration(pipeline.id());
    AccountResponse {
        process_id: pipeline.id().to_string(),
        step: pipeline.step(),
        account_id: account.id,
        email: account.email.clone(),
        factors: account.credentials.enabled_factors(),
    }
}

#[utoipa::path(
    post,
    path = "/v1/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "Process started, verification code sent", body = RegistrationResponse),
        (status = 409, description = "Identity already registered", body = ErrorBody),
        (status = 422, description = "Invalid identity fields", body = ErrorBody)
    ),
    tag = "register"
)]
#[instrument(skip_all)]
pub async fn submit_info(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<RegisterRequest>>,
) -> Result<impl IntoResponse, ApiError> {
    let request = require(payload)?;
    let identity = IdentityInfo {
        full_name: request.full_name,
        government_id: request.government_id,
        email: request.email,
        phone: request.phone,
    };

    let mut pipeline = state.engine().registration();
    let issued = pipeline.submit_info(&identity, request.channel).await?;
    let response = progress(&pipeline, Some(OtpDispatch::from(&issued)));
    state.track_registration(pipeline);

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    post,
    path = "/v1/register/otp/resend",
    request_body = ResendOtpRequest,
    responses(
        (status = 200, description = "New code sent, previous one invalidated", body = RegistrationResponse),
        (status = 404, description = "Unknown process", body = ErrorBody),
        (status = 409, description = "Process is not waiting for a code", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn resend_otp(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ResendOtpRequest>>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    let issued = pipeline.resend_otp(request.channel).await?;
    Ok(Json(progress(&pipeline, Some(OtpDispatch::from(&issued)))))
}

#[utoipa::path(
    post,
    path = "/v1/register/otp/verify",
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "Contact verified", body = RegistrationResponse),
        (status = 401, description = "Code does not match", body = ErrorBody),
        (status = 410, description = "Code expired", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn verify_otp(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<VerifyOtpRequest>>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    pipeline.verify_otp(&request.code).await?;
    Ok(Json(progress(&pipeline, None)))
}

#[utoipa::path(
    post,
    path = "/v1/register/documents",
    request_body = DocumentsRequest,
    responses(
        (status = 200, description = "Documents recorded", body = RegistrationResponse),
        (status = 422, description = "Missing document handle", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn submit_documents(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<DocumentsRequest>>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    pipeline
        .submit_documents(DocumentHandles {
            identity_photo: request.identity_photo,
            selfie_with_document: request.selfie_with_document,
        })
        .await?;
    Ok(Json(progress(&pipeline, None)))
}

#[utoipa::path(
    post,
    path = "/v1/register/factors",
    request_body = FactorsRequest,
    responses(
        (status = 200, description = "Factors configured", body = RegistrationResponse),
        (status = 422, description = "Invalid factor or policy not met", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn configure_factors(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<FactorsRequest>>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    pipeline
        .configure_factors(request.factors.into_selection())
        .await?;
    Ok(Json(progress(&pipeline, None)))
}

#[utoipa::path(
    post,
    path = "/v1/register/terms",
    request_body = TermsRequest,
    responses(
        (status = 200, description = "Terms accepted and account activated", body = AccountResponse),
        (status = 422, description = "Consent missing", body = ErrorBody),
        (status = 504, description = "Document verifier timed out, retry activation", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn accept_terms(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<TermsRequest>>,
) -> Result<Json<AccountResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    let account = pipeline
        .accept_terms(Consent {
            terms_of_use: request.terms_of_use,
            data_consultation: request.data_consultation,
        })
        .await?;
    Ok(Json(activated(&state, &pipeline, &account)))
}

#[utoipa::path(
    post,
    path = "/v1/register/activate",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Account activated", body = AccountResponse),
        (status = 409, description = "Identity claimed meanwhile or wrong step", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn activate(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ProcessRequest>>,
) -> Result<Json<AccountResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    let account = pipeline.activate().await?;
    Ok(Json(activated(&state, &pipeline, &account)))
}

#[utoipa::path(
    post,
    path = "/v1/register/restart",
    request_body = ProcessRequest,
    responses(
        (status = 200, description = "Process back at identity collection", body = RegistrationResponse),
        (status = 409, description = "Account already active", body = ErrorBody)
    ),
    tag = "register"
)]
pub async fn restart(
    state: Extension<Arc<AppState>>,
    payload: Option<Json<ProcessRequest>>,
) -> Result<Json<RegistrationResponse>, ApiError> {
    let request = require(payload)?;
    let entry = lookup(&state, &request.process_id)?;
    let mut pipeline = entry.lock().await;
    pipeline.restart().await?;
    Ok(Json(progress(&pipeline, None)))
}
