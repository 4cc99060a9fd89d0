//! Step-wise login driven by the account's enrolled factors.
//!
//! The step plan is computed once in [`LoginOrchestrator::begin`]:
//! `Primary`, then `Biometric` if enabled and the device has the hardware,
//! `Geofence` if an area is enrolled, `Pin` if a PIN is set, then `Success`.
//! A rejected step keeps the attempt where it is; credential mismatches count
//! toward a cap after which the attempt is `Failed` for good.

use super::{
    destination,
    session::IssuedSession,
    storage::Account,
    AuthEngine,
};
use crate::{
    collaborators::{bounded, BiometricSample, LocationError, LocationSource, BIOMETRIC_MATCHER},
    error::AuthError,
    identity::normalize_email,
    otp::{Channel, OtpIssued, OtpPurpose, VerifyResult},
};
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{collections::VecDeque, fmt};
use tracing::{debug, info, instrument, warn};
use ulid::Ulid;
use utoipa::ToSchema;
use uuid::Uuid;

const LOCATION_SOURCE: &str = "location source";

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum LoginStep {
    Primary,
    Biometric,
    Geofence,
    Pin,
    Success,
    Failed,
}

impl LoginStep {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::Biometric => "biometric",
            Self::Geofence => "geofence",
            Self::Pin => "pin",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for LoginStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the client device reported about itself.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct DeviceCapabilities {
    pub biometric_hardware: bool,
}

/// First factor: the password, or a one-time code sent by `request_otp`.
pub enum PrimaryCredential {
    Password(SecretString),
    Otp(String),
}

#[derive(Clone, Debug)]
pub struct LoginAttempt {
    pub id: Ulid,
    pub account_id: Uuid,
    step: LoginStep,
    remaining: VecDeque<LoginStep>,
    completed: Vec<LoginStep>,
    failure_count: u32,
    pub started_at: DateTime<Utc>,
}

impl LoginAttempt {
    #[must_use]
    pub fn step(&self) -> LoginStep {
        self.step
    }

    /// Steps after the current one.
    #[must_use]
    pub fn remaining_steps(&self) -> Vec<LoginStep> {
        self.remaining.iter().copied().collect()
    }

    #[must_use]
    pub fn completed_steps(&self) -> &[LoginStep] {
        &self.completed
    }

    /// The whole plan: completed, current and remaining.
    #[must_use]
    pub fn plan(&self) -> Vec<LoginStep> {
        let mut plan = self.completed.clone();
        if self.step != LoginStep::Failed {
            plan.push(self.step);
        }
        plan.extend(self.remaining.iter().copied());
        plan
    }

    #[must_use]
    pub fn failure_count(&self) -> u32 {
        self.failure_count
    }
}

#[derive(Debug)]
pub enum LoginProgress {
    Next(LoginStep),
    Complete(IssuedSession),
}

pub struct LoginOrchestrator {
    engine: AuthEngine,
}

/// Compute the step plan for an account on a given device.
fn plan_for(account: &Account, capabilities: DeviceCapabilities) -> VecDeque<LoginStep> {
    let credentials = &account.credentials;
    let mut steps = VecDeque::with_capacity(4);
    if credentials.biometric_enabled && capabilities.biometric_hardware {
        steps.push_back(LoginStep::Biometric);
    }
    if credentials.geofence.is_some() {
        steps.push_back(LoginStep::Geofence);
    }
    if credentials.has_pin() {
        steps.push_back(LoginStep::Pin);
    }
    steps.push_back(LoginStep::Success);
    steps
}

impl LoginOrchestrator {
    #[must_use]
    pub fn new(engine: AuthEngine) -> Self {
        Self { engine }
    }

    /// # Errors
    /// `CredentialMismatch` for unknown emails, `Invariant` when an activated
    /// account has no enabled factor.
    #[instrument(skip_all)]
    pub async fn begin(
        &self,
        email: &str,
        capabilities: DeviceCapabilities,
    ) -> Result<LoginAttempt, AuthError> {
        let account = self
            .engine
            .accounts()
            .find_by_email(&normalize_email(email))
            .await?
            .ok_or(AuthError::CredentialMismatch)?;

        if account.activated && account.credentials.enabled_factors().is_empty() {
            return Err(AuthError::Invariant(format!(
                "account {} is active with zero enabled factors",
                account.id
            )));
        }

        let attempt = LoginAttempt {
            id: Ulid::new(),
            account_id: account.id,
            step: LoginStep::Primary,
            remaining: plan_for(&account, capabilities),
            completed: Vec::new(),
            failure_count: 0,
            started_at: self.engine.clock().now(),
        };
        debug!(attempt = %attempt.id, plan = ?attempt.plan(), "login attempt started");
        Ok(attempt)
    }

    /// Send a login code for token-based primary authentication.
    ///
    /// # Errors
    /// `OutOfOrder` past the primary step, `NotVerified` for pending accounts.
    pub async fn request_otp(
        &self,
        attempt: &LoginAttempt,
        channel: Channel,
    ) -> Result<OtpIssued, AuthError> {
        expect(attempt, LoginStep::Primary)?;
        let account = self.engine.load_account(attempt.account_id).await?;
        if !account.activated {
            return Err(AuthError::NotVerified);
        }
        Ok(self
            .engine
            .otp()
            .issue(
                &account.id.to_string(),
                OtpPurpose::Login,
                channel,
                destination(&account, channel),
            )
            .await)
    }

    /// # Errors
    /// `NotVerified` for pending accounts (checked before any credential),
    /// `CredentialMismatch` or one of the OTP errors.
    #[instrument(skip_all, fields(attempt = %attempt.id))]
    pub async fn primary(
        &self,
        attempt: &mut LoginAttempt,
        credential: PrimaryCredential,
    ) -> Result<LoginProgress, AuthError> {
        expect(attempt, LoginStep::Primary)?;
        let account = self.engine.load_account(attempt.account_id).await?;
        if !account.activated {
            return Err(AuthError::NotVerified);
        }

        let outcome = match credential {
            PrimaryCredential::Password(password) => {
                if account.credentials.verify_password(password.expose_secret()) {
                    Ok(())
                } else {
                    Err(AuthError::CredentialMismatch)
                }
            }
            PrimaryCredential::Otp(code) => {
                match self
                    .engine
                    .otp()
                    .verify(&account.id.to_string(), OtpPurpose::Login, &code)
                {
                    VerifyResult::Ok => Ok(()),
                    VerifyResult::Mismatch => Err(AuthError::OtpMismatch),
                    VerifyResult::Expired => Err(AuthError::OtpExpired),
                    VerifyResult::NotFound => Err(AuthError::OtpNotFound),
                }
            }
        };
        self.settle(attempt, &account, outcome)
    }

    /// # Errors
    /// `BiometricFailed` on a mismatch; collaborator errors are surfaced uncounted.
    #[instrument(skip_all, fields(attempt = %attempt.id))]
    pub async fn biometric(
        &self,
        attempt: &mut LoginAttempt,
        sample: &BiometricSample,
    ) -> Result<LoginProgress, AuthError> {
        expect(attempt, LoginStep::Biometric)?;
        let account = self.engine.load_account(attempt.account_id).await?;
        let reference = account.credentials.face_reference.clone().ok_or_else(|| {
            AuthError::Invariant(format!("account {} has biometric without a face", account.id))
        })?;

        let matched = bounded(
            BIOMETRIC_MATCHER,
            self.engine.config().collaborator_timeout(),
            self.engine.collaborators().matcher.matches(sample, &reference),
        )
        .await?;
        let outcome = if matched {
            Ok(())
        } else {
            Err(AuthError::BiometricFailed)
        };
        self.settle(attempt, &account, outcome)
    }

    /// # Errors
    /// `LocationUnavailable` when the device will not share its position,
    /// `OutOfRange` outside the enrolled area.
    #[instrument(skip_all, fields(attempt = %attempt.id))]
    pub async fn geofence(
        &self,
        attempt: &mut LoginAttempt,
        location: &dyn LocationSource,
    ) -> Result<LoginProgress, AuthError> {
        expect(attempt, LoginStep::Geofence)?;
        let account = self.engine.load_account(attempt.account_id).await?;
        let area = account.credentials.geofence.ok_or_else(|| {
            AuthError::Invariant(format!("account {} has no geofence", account.id))
        })?;

        let position = bounded(
            LOCATION_SOURCE,
            self.engine.config().collaborator_timeout(),
            async { Ok::<_, anyhow::Error>(location.current_position().await) },
        )
        .await?
        .map_err(|err| {
            if let LocationError::Unavailable(reason) = &err {
                warn!("location unavailable: {reason}");
            }
            AuthError::LocationUnavailable
        })?;

        let inside = area
            .contains(position)
            .map_err(|err| AuthError::validation("position", &err.to_string()))?;
        let outcome = if inside {
            Ok(())
        } else {
            Err(AuthError::OutOfRange)
        };
        self.settle(attempt, &account, outcome)
    }

    /// # Errors
    /// `PinMismatch` on a wrong PIN.
    #[instrument(skip_all, fields(attempt = %attempt.id))]
    pub async fn pin(
        &self,
        attempt: &mut LoginAttempt,
        pin: &SecretString,
    ) -> Result<LoginProgress, AuthError> {
        expect(attempt, LoginStep::Pin)?;
        let account = self.engine.load_account(attempt.account_id).await?;
        let outcome = if account.credentials.verify_pin(pin.expose_secret()) {
            Ok(())
        } else {
            Err(AuthError::PinMismatch)
        };
        self.settle(attempt, &account, outcome)
    }

    /// Apply a step outcome: advance on success, count mismatches otherwise.
    fn settle(
        &self,
        attempt: &mut LoginAttempt,
        account: &Account,
        outcome: Result<(), AuthError>,
    ) -> Result<LoginProgress, AuthError> {
        if let Err(err) = outcome {
            if err.is_mismatch() {
                attempt.failure_count += 1;
                if attempt.failure_count >= self.engine.config().max_login_failures() {
                    warn!(attempt = %attempt.id, failures = attempt.failure_count, "login attempt abandoned");
                    attempt.step = LoginStep::Failed;
                    attempt.remaining.clear();
                    self.engine
                        .otp()
                        .invalidate(&account.id.to_string(), OtpPurpose::Login);
                    return Err(AuthError::AttemptFailed);
                }
            }
            return Err(err);
        }

        attempt.completed.push(attempt.step);
        let next = attempt.remaining.pop_front().unwrap_or(LoginStep::Success);
        attempt.step = next;
        if next != LoginStep::Success {
            return Ok(LoginProgress::Next(next));
        }

        let monitored = account.credentials.monitors_session();
        let issued = self.engine.sessions().issue(account.id, monitored)?;
        if let Some(reference) = account.credentials.face_reference.clone() {
            if let Some(cancel) = self.engine.sessions().cancellation(issued.session.id) {
                self.engine
                    .monitor()
                    .start(issued.session.clone(), reference, cancel);
            }
        }
        info!(attempt = %attempt.id, account_id = %account.id, monitored, "login succeeded");
        Ok(LoginProgress::Complete(issued))
    }
}

fn expect(attempt: &LoginAttempt, step: LoginStep) -> Result<(), AuthError> {
    match attempt.step {
        LoginStep::Failed => Err(AuthError::AttemptFailed),
        current if current == step => Ok(()),
        current => Err(AuthError::OutOfOrder {
            current: current.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::super::{
        config::AuthConfig,
        credentials::FactorSelection,
        session::RevokeReason,
        test_support::*,
    };
    use super::*;
    use crate::{
        collaborators::{FaceReferenceId, ReportedPosition},
        geofence::{GeofenceArea, Position},
    };
    use std::sync::atomic::Ordering;

    const EMAIL: &str = "ana@example.com";

    fn password(value: &str) -> PrimaryCredential {
        PrimaryCredential::Password(SecretString::from(value.to_string()))
    }

    fn pin(value: &str) -> SecretString {
        SecretString::from(value.to_string())
    }

    fn sao_paulo() -> GeofenceArea {
        GeofenceArea {
            center: Position::new(-23.5505, -46.6333),
            radius_meters: 1_000.0,
        }
    }

    fn everything() -> FactorSelection {
        FactorSelection {
            password: secret("Str0ngpass"),
            pin: secret("4321"),
            face_reference: Some(FaceReferenceId("face-1".to_string())),
            biometric: true,
            geofence: Some(sao_paulo()),
        }
    }

    fn capable() -> DeviceCapabilities {
        DeviceCapabilities {
            biometric_hardware: true,
        }
    }

    #[tokio::test]
    async fn password_and_pin_plan_skips_optional_steps() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        assert_eq!(
            attempt.plan(),
            vec![LoginStep::Primary, LoginStep::Pin, LoginStep::Success]
        );

        let progress = login.primary(&mut attempt, password("Str0ngpass")).await?;
        assert!(matches!(progress, LoginProgress::Next(LoginStep::Pin)));
        match login.pin(&mut attempt, &pin("4321")).await? {
            LoginProgress::Complete(issued) => {
                assert!(!issued.session.monitor_active);
                assert!(harness.engine.validate(issued.token.expose_secret()).valid);
            }
            other => panic!("expected a session, got {other:?}"),
        }
        assert_eq!(attempt.step(), LoginStep::Success);
        assert_eq!(
            attempt.completed_steps(),
            &[LoginStep::Primary, LoginStep::Pin]
        );
        Ok(())
    }

    #[tokio::test]
    async fn geofence_and_pin_without_biometric() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                geofence: Some(sao_paulo()),
                ..FactorSelection::default()
            },
        )
        .await?;

        let attempt = harness.engine.login().begin(EMAIL, capable()).await?;
        assert_eq!(
            attempt.plan(),
            vec![
                LoginStep::Primary,
                LoginStep::Geofence,
                LoginStep::Pin,
                LoginStep::Success
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn biometric_is_skipped_without_hardware() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(&harness, everything()).await?;

        let login = harness.engine.login();
        let with = login.begin(EMAIL, capable()).await?;
        assert_eq!(with.remaining_steps()[0], LoginStep::Biometric);
        let without = login.begin(EMAIL, DeviceCapabilities::default()).await?;
        assert!(!without.plan().contains(&LoginStep::Biometric));
        Ok(())
    }

    #[tokio::test]
    async fn unknown_email_is_a_credential_mismatch() {
        let harness = harness(AuthConfig::new());
        let result = harness
            .engine
            .login()
            .begin("ghost@example.com", capable())
            .await;
        assert!(matches!(result, Err(AuthError::CredentialMismatch)));
    }

    #[tokio::test]
    async fn pending_account_is_not_verified_before_credentials() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        let mut pipeline = harness.engine.registration();
        pipeline.submit_info(&identity(), Channel::Email).await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        assert!(matches!(
            login.primary(&mut attempt, password("whatever")).await,
            Err(AuthError::NotVerified)
        ));
        assert_eq!(attempt.failure_count(), 0);
        Ok(())
    }

    #[tokio::test]
    async fn otp_primary_factor() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(
            &harness,
            FactorSelection {
                pin: secret("4321"),
                geofence: Some(sao_paulo()),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        assert!(matches!(
            login.primary(&mut attempt, PrimaryCredential::Otp("123456".to_string())).await,
            Err(AuthError::OtpNotFound)
        ));

        login.request_otp(&attempt, Channel::Sms).await?;
        let code = harness
            .outbox
            .last_code_for("11987654321")
            .unwrap_or_default();
        let progress = login
            .primary(&mut attempt, PrimaryCredential::Otp(code))
            .await?;
        assert!(matches!(progress, LoginProgress::Next(LoginStep::Geofence)));
        Ok(())
    }

    #[tokio::test]
    async fn geofence_step_checks_permission_and_range() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                geofence: Some(sao_paulo()),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        login.primary(&mut attempt, password("Str0ngpass")).await?;

        assert!(matches!(
            login.geofence(&mut attempt, &ReportedPosition(None)).await,
            Err(AuthError::LocationUnavailable)
        ));
        let rio = ReportedPosition(Some(Position::new(-22.9068, -43.1729)));
        assert!(matches!(
            login.geofence(&mut attempt, &rio).await,
            Err(AuthError::OutOfRange)
        ));
        assert_eq!(attempt.failure_count(), 1);
        assert_eq!(attempt.step(), LoginStep::Geofence);

        let paulista = ReportedPosition(Some(Position::new(-23.5510, -46.6340)));
        assert!(matches!(
            login.geofence(&mut attempt, &paulista).await?,
            LoginProgress::Complete(_)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn full_plan_starts_the_monitor() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(&harness, everything()).await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        login.primary(&mut attempt, password("Str0ngpass")).await?;

        let wrong_face = BiometricSample("someone-else".to_string());
        assert!(matches!(
            login.biometric(&mut attempt, &wrong_face).await,
            Err(AuthError::BiometricFailed)
        ));
        let face = BiometricSample("face-1".to_string());
        login.biometric(&mut attempt, &face).await?;
        let here = ReportedPosition(Some(Position::new(-23.5505, -46.6333)));
        login.geofence(&mut attempt, &here).await?;

        let issued = match login.pin(&mut attempt, &pin("4321")).await? {
            LoginProgress::Complete(issued) => issued,
            other => panic!("expected a session, got {other:?}"),
        };
        assert!(issued.session.monitor_active);
        tokio::task::yield_now().await;
        assert_eq!(harness.engine.monitor().live_tasks(), 1);

        harness.engine.logout(issued.token.expose_secret())?;
        for _ in 0..50 {
            if harness.engine.monitor().live_tasks() == 0 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(harness.engine.monitor().live_tasks(), 0);
        assert_eq!(
            harness.engine.validate(issued.token.expose_secret()).revoked,
            Some(RevokeReason::Logout)
        );
        Ok(())
    }

    #[tokio::test]
    async fn rejected_face_counts_as_a_failure() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(&harness, everything()).await?;
        harness.matcher.enabled.store(false, Ordering::SeqCst);

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        login.primary(&mut attempt, password("Str0ngpass")).await?;
        let face = BiometricSample("face-1".to_string());
        assert!(matches!(
            login.biometric(&mut attempt, &face).await,
            Err(AuthError::BiometricFailed)
        ));
        assert_eq!(attempt.failure_count(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn repeated_mismatches_fail_the_attempt() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new().with_max_login_failures(3));
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        for _ in 0..2 {
            assert!(matches!(
                login.primary(&mut attempt, password("Wr0ngpass")).await,
                Err(AuthError::CredentialMismatch)
            ));
        }
        assert!(matches!(
            login.primary(&mut attempt, password("Wr0ngpass")).await,
            Err(AuthError::AttemptFailed)
        ));
        assert_eq!(attempt.step(), LoginStep::Failed);
        assert!(matches!(
            login.primary(&mut attempt, password("Str0ngpass")).await,
            Err(AuthError::AttemptFailed)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn login_code_guesses_are_capped_across_attempts() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new().with_max_login_failures(3));
        activated(
            &harness,
            FactorSelection {
                pin: secret("4321"),
                geofence: Some(sao_paulo()),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut first = login.begin(EMAIL, capable()).await?;
        login.request_otp(&first, Channel::Email).await?;
        let code = harness.outbox.last_code_for(EMAIL).unwrap_or_default();
        let wrong = if code == "000000" { "111111" } else { "000000" };
        for _ in 0..2 {
            assert!(matches!(
                login.primary(&mut first, PrimaryCredential::Otp(wrong.to_string())).await,
                Err(AuthError::OtpMismatch)
            ));
        }

        // a new attempt does not reset the count kept on the code
        let mut second = login.begin(EMAIL, capable()).await?;
        assert!(matches!(
            login.primary(&mut second, PrimaryCredential::Otp(wrong.to_string())).await,
            Err(AuthError::OtpMismatch)
        ));
        assert!(matches!(
            login.primary(&mut second, PrimaryCredential::Otp(code)).await,
            Err(AuthError::OtpNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn failed_attempt_burns_the_login_code() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new().with_max_login_failures(3));
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        login.request_otp(&attempt, Channel::Email).await?;
        let code = harness.outbox.last_code_for(EMAIL).unwrap_or_default();
        for _ in 0..2 {
            assert!(matches!(
                login.primary(&mut attempt, password("Wr0ngpass")).await,
                Err(AuthError::CredentialMismatch)
            ));
        }
        assert!(matches!(
            login.primary(&mut attempt, password("Wr0ngpass")).await,
            Err(AuthError::AttemptFailed)
        ));

        let mut retry = login.begin(EMAIL, capable()).await?;
        assert!(matches!(
            login.primary(&mut retry, PrimaryCredential::Otp(code)).await,
            Err(AuthError::OtpNotFound)
        ));
        Ok(())
    }

    #[tokio::test]
    async fn steps_are_enforced_in_order() -> Result<(), AuthError> {
        let harness = harness(AuthConfig::new());
        activated(
            &harness,
            FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                ..FactorSelection::default()
            },
        )
        .await?;

        let login = harness.engine.login();
        let mut attempt = login.begin(EMAIL, capable()).await?;
        assert!(matches!(
            login.pin(&mut attempt, &pin("4321")).await,
            Err(AuthError::OutOfOrder { .. })
        ));
        login.primary(&mut attempt, password("Str0ngpass")).await?;
        assert!(matches!(
            login.primary(&mut attempt, password("Str0ngpass")).await,
            Err(AuthError::OutOfOrder { ref current }) if current == "pin"
        ));
        Ok(())
    }
}
