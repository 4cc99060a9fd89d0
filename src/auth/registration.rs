//! Ordered onboarding.
//!
//! ```text
//! CollectInfo -> AwaitOtp -> CollectDocuments -> ConfigureFactors
//!             -> AcceptTerms -> Activating -> Complete
//! ```
//!
//! Each operation only runs in its own step. A rejected operation never moves
//! the process, so the caller can fix the input and retry.

use super::{credentials::FactorSelection, destination, storage::Account, AuthEngine};
use crate::{
    collaborators::{bounded, DocumentHandles, KycVerdict, KYC_VERIFIER},
    error::AuthError,
    identity::{IdentityInfo, ValidationErrors},
    otp::{Channel, OtpIssued, OtpPurpose, VerifyResult},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, instrument, warn};
use ulid::Ulid;
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RegistrationStep {
    CollectInfo,
    AwaitOtp,
    CollectDocuments,
    ConfigureFactors,
    AcceptTerms,
    Activating,
    Complete,
}

impl RegistrationStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::CollectInfo => "collect_info",
            Self::AwaitOtp => "await_otp",
            Self::CollectDocuments => "collect_documents",
            Self::ConfigureFactors => "configure_factors",
            Self::AcceptTerms => "accept_terms",
            Self::Activating => "activating",
            Self::Complete => "complete",
        }
    }
}

impl fmt::Display for RegistrationStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct Consent {
    pub terms_of_use: bool,
    pub data_consultation: bool,
}

/// State of one onboarding run.
#[derive(Clone, Debug)]
pub struct RegistrationProcess {
    pub id: Ulid,
    pub step: RegistrationStep,
    pub account_id: Option<Uuid>,
    pub channel: Option<Channel>,
    pub consent: Option<Consent>,
    pub kyc_verdict: Option<KycVerdict>,
    pub started_at: DateTime<Utc>,
}

pub struct RegistrationPipeline {
    engine: AuthEngine,
    process: RegistrationProcess,
}

impl RegistrationPipeline {
    #[must_use]
    pub fn new(engine: AuthEngine) -> Self {
        let started_at = engine.clock().now();
        Self {
            engine,
            process: RegistrationProcess {
                id: Ulid::new(),
                step: RegistrationStep::CollectInfo,
                account_id: None,
                channel: None,
                consent: None,
                kyc_verdict: None,
                started_at,
            },
        }
    }

    #[must_use]
    pub fn id(&self) -> Ulid {
        self.process.id
    }

    #[must_use]
    pub fn step(&self) -> RegistrationStep {
        self.process.step
    }

    #[must_use]
    pub fn process(&self) -> &RegistrationProcess {
        &self.process
    }

    fn expect(&self, step: RegistrationStep) -> Result<(), AuthError> {
        if self.process.step == step {
            Ok(())
        } else {
            Err(AuthError::OutOfOrder {
                current: self.process.step.to_string(),
            })
        }
    }

    async fn pending_account(&self) -> Result<Account, AuthError> {
        let id = self
            .process
            .account_id
            .ok_or_else(|| AuthError::Invariant("registration has no pending account".to_string()))?;
        self.engine.load_account(id).await
    }

    /// Validate identity, create the pending shell and send the first code.
    ///
    /// # Errors
    /// `Validation` per rejected field, `Conflict` if an activated account owns
    /// the government ID or email.
    #[instrument(skip_all, fields(process = %self.process.id))]
    pub async fn submit_info(
        &mut self,
        info: &IdentityInfo,
        channel: Channel,
    ) -> Result<OtpIssued, AuthError> {
        self.expect(RegistrationStep::CollectInfo)?;
        let identity = info.validate()?;

        let accounts = self.engine.accounts();
        if accounts
            .identity_taken(&identity.government_id, &identity.email)
            .await?
        {
            return Err(AuthError::Conflict);
        }

        let account = Account {
            id: Uuid::new_v4(),
            full_name: identity.full_name,
            government_id: identity.government_id,
            email: identity.email,
            phone: identity.phone,
            activated: false,
            credentials: Default::default(),
            documents: DocumentHandles::default(),
            created_at: self.engine.clock().now(),
        };
        accounts.insert_pending(account.clone()).await?;

        let issued = self
            .engine
            .otp()
            .issue(
                &account.id.to_string(),
                OtpPurpose::Registration,
                channel,
                destination(&account, channel),
            )
            .await;

        self.process.account_id = Some(account.id);
        self.process.channel = Some(channel);
        self.process.step = RegistrationStep::AwaitOtp;
        info!(account_id = %account.id, %channel, "registration started");
        Ok(issued)
    }

    /// Send a fresh code, possibly over another channel. The previous one stops working.
    ///
    /// # Errors
    /// `OutOfOrder` outside `AwaitOtp`.
    pub async fn resend_otp(&mut self, channel: Channel) -> Result<OtpIssued, AuthError> {
        self.expect(RegistrationStep::AwaitOtp)?;
        let account = self.pending_account().await?;
        let issued = self
            .engine
            .otp()
            .issue(
                &account.id.to_string(),
                OtpPurpose::Registration,
                channel,
                destination(&account, channel),
            )
            .await;
        self.process.channel = Some(channel);
        Ok(issued)
    }

    /// # Errors
    /// `OtpMismatch`, `OtpExpired` or `OtpNotFound`; the process stays in `AwaitOtp`.
    pub async fn verify_otp(&mut self, code: &str) -> Result<RegistrationStep, AuthError> {
        self.expect(RegistrationStep::AwaitOtp)?;
        let account_id = self
            .process
            .account_id
            .ok_or_else(|| AuthError::Invariant("registration has no pending account".to_string()))?;

        match self
            .engine
            .otp()
            .verify(&account_id.to_string(), OtpPurpose::Registration, code)
        {
            VerifyResult::Ok => {
                self.process.step = RegistrationStep::CollectDocuments;
                Ok(self.process.step)
            }
            VerifyResult::Mismatch => Err(AuthError::OtpMismatch),
            VerifyResult::Expired => Err(AuthError::OtpExpired),
            VerifyResult::NotFound => Err(AuthError::OtpNotFound),
        }
    }

    /// # Errors
    /// `Validation` when either handle is blank.
    pub async fn submit_documents(
        &mut self,
        documents: DocumentHandles,
    ) -> Result<RegistrationStep, AuthError> {
        self.expect(RegistrationStep::CollectDocuments)?;

        let mut errors = ValidationErrors::new();
        if documents.identity_photo.trim().is_empty() {
            errors.push("identity_photo", "Identity document photo is required");
        }
        if documents.selfie_with_document.trim().is_empty() {
            errors.push("selfie_with_document", "Selfie holding the document is required");
        }
        errors.into_result()?;

        let mut account = self.pending_account().await?;
        account.documents = documents;
        self.engine.accounts().update_pending(account).await?;

        self.process.step = RegistrationStep::ConfigureFactors;
        Ok(self.process.step)
    }

    /// # Errors
    /// `Validation` for malformed factors, `InsufficientFactors` when the
    /// deployment's factor policy is not met.
    pub async fn configure_factors(
        &mut self,
        selection: FactorSelection,
    ) -> Result<RegistrationStep, AuthError> {
        self.expect(RegistrationStep::ConfigureFactors)?;
        let credentials = selection.into_credentials(self.engine.config().factor_policy())?;

        let mut account = self.pending_account().await?;
        account.credentials = credentials;
        self.engine.accounts().update_pending(account).await?;

        self.process.step = RegistrationStep::AcceptTerms;
        Ok(self.process.step)
    }

    /// Record consent and run activation.
    ///
    /// # Errors
    /// `ConsentRequired` for a missing consent, otherwise see [`Self::activate`].
    pub async fn accept_terms(&mut self, consent: Consent) -> Result<Account, AuthError> {
        self.expect(RegistrationStep::AcceptTerms)?;
        if !consent.terms_of_use {
            return Err(AuthError::ConsentRequired("terms_of_use"));
        }
        if self.engine.config().require_data_consent() && !consent.data_consultation {
            return Err(AuthError::ConsentRequired("data_consultation"));
        }

        self.process.consent = Some(consent);
        self.process.step = RegistrationStep::Activating;
        self.activate().await
    }

    /// Ask the document verifier, recheck the policy and claim the identity keys.
    ///
    /// Any verdict passes the gate. On failure the process stays in
    /// `Activating` and this can be called again.
    ///
    /// # Errors
    /// `CollaboratorTimeout`/`CollaboratorFailed` from the verifier, `Conflict`
    /// if another registration activated the same identity first.
    #[instrument(skip_all, fields(process = %self.process.id))]
    pub async fn activate(&mut self) -> Result<Account, AuthError> {
        self.expect(RegistrationStep::Activating)?;
        let account = self.pending_account().await?;

        let kyc = &self.engine.collaborators().kyc;
        let verdict = bounded(
            KYC_VERIFIER,
            self.engine.config().collaborator_timeout(),
            kyc.verify(&account.documents),
        )
        .await?;
        match verdict {
            KycVerdict::Approved => info!(account_id = %account.id, "documents approved"),
            KycVerdict::Rejected | KycVerdict::Pending => {
                warn!(account_id = %account.id, ?verdict, "activating without document approval");
            }
        }
        self.process.kyc_verdict = Some(verdict);

        self.engine
            .config()
            .factor_policy()
            .check(&account.credentials)?;
        let account = self.engine.accounts().activate(account.id).await?;

        self.process.step = RegistrationStep::Complete;
        info!(account_id = %account.id, "account activated");
        Ok(account)
    }

    /// Go back to `CollectInfo`, dropping the pending shell and its code.
    ///
    /// # Errors
    /// `OutOfOrder` once the account is activated.
    pub async fn restart(&mut self) -> Result<RegistrationStep, AuthError> {
        if self.process.step == RegistrationStep::Complete {
            return Err(AuthError::OutOfOrder {
                current: self.process.step.to_string(),
            });
        }
        if let Some(account_id) = self.process.account_id.take() {
            self.engine
                .otp()
                .invalidate(&account_id.to_string(), OtpPurpose::Registration);
            self.engine.accounts().remove_pending(account_id).await?;
        }
        self.process.step = RegistrationStep::CollectInfo;
        self.process.channel = None;
        self.process.consent = None;
        self.process.kyc_verdict = None;
        Ok(self.process.step)
    }
}
