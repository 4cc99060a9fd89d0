//! Replacing the factors of an activated account.
//!
//! The request is gated by the current PIN when one is enrolled, otherwise by
//! a `factor_reset` one-time code. Accounts with biometric login must also
//! present a live sample. A successful reset ends every session of the
//! account.
//!
//! Failed ownership checks are counted per account. Once the count reaches
//! `max_login_failures`, reset stays closed for `reset_lockout_seconds` and
//! any live reset code is dropped.

use super::{
    credentials::{Factor, FactorSelection},
    destination,
    session::RevokeReason,
    storage::Account,
    AuthEngine,
};
use crate::{
    collaborators::{bounded, BiometricSample, BIOMETRIC_MATCHER},
    error::AuthError,
    identity::normalize_email,
    otp::{Channel, OtpIssued, OtpPurpose, VerifyResult},
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use tracing::{info, instrument, warn};
use uuid::Uuid;

pub struct FactorResetRequest {
    pub email: String,
    pub pin: Option<SecretString>,
    pub otp_code: Option<String>,
    pub sample: Option<BiometricSample>,
    pub selection: FactorSelection,
}

/// Failed ownership checks of one account and when the last one happened.
#[derive(Clone, Copy, Debug)]
pub(crate) struct ResetFailures {
    count: u32,
    last: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FactorResetOutcome {
    pub account_id: Uuid,
    pub factors: Vec<Factor>,
    pub revoked_sessions: usize,
}

impl AuthEngine {
    /// Send a `factor_reset` code, for accounts that have no PIN to prove ownership with.
    ///
    /// # Errors
    /// `CredentialMismatch` for unknown emails, `NotVerified` for pending accounts.
    pub async fn request_factor_reset_otp(
        &self,
        email: &str,
        channel: Channel,
    ) -> Result<OtpIssued, AuthError> {
        let account = self
            .accounts()
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::CredentialMismatch)?;
        if !account.activated {
            return Err(AuthError::NotVerified);
        }
        Ok(self
            .otp()
            .issue(
                &account.id.to_string(),
                OtpPurpose::FactorReset,
                channel,
                destination(&account, channel),
            )
            .await)
    }

    /// # Errors
    /// `PinMismatch` or an OTP error when ownership is not proven,
    /// `BiometricFailed` when the live sample does not match, and the
    /// validation/policy errors of the new selection. `AttemptFailed` while
    /// the account is locked out of reset.
    #[instrument(skip_all)]
    pub async fn reset_factors(
        &self,
        request: FactorResetRequest,
    ) -> Result<FactorResetOutcome, AuthError> {
        let account = self
            .accounts()
            .find_by_email(&normalize_email(&request.email))
            .await?
            .ok_or(AuthError::CredentialMismatch)?;
        if !account.activated {
            return Err(AuthError::NotVerified);
        }
        let subject = account.id.to_string();

        let now = self.clock().now();
        if self.reset_locked(account.id, now) {
            warn!(account_id = %account.id, "factor reset locked");
            return Err(AuthError::AttemptFailed);
        }
        match self.prove_ownership(&account, &request).await {
            Ok(()) => {
                self.reset_failures.remove(&account.id);
            }
            Err(err) if err.is_mismatch() => {
                return Err(self.record_reset_failure(account.id, now, err));
            }
            Err(err) => return Err(err),
        }

        let credentials = request
            .selection
            .into_credentials(self.config().factor_policy())?;
        let account = self
            .accounts()
            .replace_credentials(account.id, credentials)
            .await?;

        self.otp().invalidate(&subject, OtpPurpose::Login);
        self.otp().invalidate(&subject, OtpPurpose::FactorReset);
        let revoked_sessions = self
            .sessions()
            .revoke_account(account.id, RevokeReason::FactorReset);
        info!(account_id = %account.id, revoked_sessions, "factors reset");

        Ok(FactorResetOutcome {
            account_id: account.id,
            factors: account.credentials.enabled_factors(),
            revoked_sessions,
        })
    }

    /// Current PIN or reset code, plus a live sample for biometric accounts.
    async fn prove_ownership(
        &self,
        account: &Account,
        request: &FactorResetRequest,
    ) -> Result<(), AuthError> {
        if account.credentials.has_pin() {
            let pin = request
                .pin
                .as_ref()
                .ok_or_else(|| AuthError::validation("pin", "Current PIN is required"))?;
            if !account.credentials.verify_pin(pin.expose_secret()) {
                return Err(AuthError::PinMismatch);
            }
        } else {
            let code = request.otp_code.as_deref().ok_or(AuthError::OtpNotFound)?;
            match self
                .otp()
                .verify(&account.id.to_string(), OtpPurpose::FactorReset, code)
            {
                VerifyResult::Ok => {}
                VerifyResult::Mismatch => return Err(AuthError::OtpMismatch),
                VerifyResult::Expired => return Err(AuthError::OtpExpired),
                VerifyResult::NotFound => return Err(AuthError::OtpNotFound),
            }
        }

        if account.credentials.biometric_enabled || request.sample.is_some() {
            let (Some(sample), Some(reference)) = (
                request.sample.as_ref(),
                account.credentials.face_reference.as_ref(),
            ) else {
                return Err(AuthError::BiometricFailed);
            };
            let matched = bounded(
                BIOMETRIC_MATCHER,
                self.config().collaborator_timeout(),
                self.collaborators().matcher.matches(sample, reference),
            )
            .await?;
            if !matched {
                return Err(AuthError::BiometricFailed);
            }
        }
        Ok(())
    }

    fn reset_lockout(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.config().reset_lockout_seconds())
    }

    /// Whether the account used up its failures within the lockout window.
    /// Failures older than the window are forgotten.
    fn reset_locked(&self, account_id: Uuid, now: DateTime<Utc>) -> bool {
        match self.reset_failures.get(&account_id) {
            None => return false,
            Some(failures) if now - failures.last < self.reset_lockout() => {
                return failures.count >= self.config().max_login_failures();
            }
            Some(_) => {}
        }
        self.reset_failures.remove(&account_id);
        false
    }

    fn record_reset_failure(
        &self,
        account_id: Uuid,
        now: DateTime<Utc>,
        err: AuthError,
    ) -> AuthError {
        let count = {
            let mut failures = self
                .reset_failures
                .entry(account_id)
                .or_insert(ResetFailures { count: 0, last: now });
            failures.count += 1;
            failures.last = now;
            failures.count
        };
        if count < self.config().max_login_failures() {
            return err;
        }
        self.otp()
            .invalidate(&account_id.to_string(), OtpPurpose::FactorReset);
        warn!(%account_id, failures = count, "factor reset locked after repeated failures");
        AuthError::AttemptFailed
    }

    /// Forget failure counts whose window has passed; returns how many.
    pub(crate) fn purge_reset_failures(&self) -> usize {
        let cutoff = self.clock().now() - self.reset_lockout();
        let before = self.reset_failures.len();
        self.reset_failures.retain(|_, failures| failures.last > cutoff);
        before.saturating_sub(self.reset_failures.len())
    }
}
