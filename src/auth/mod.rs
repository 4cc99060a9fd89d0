//! Authentication engine: onboarding, step-wise login, sessions and their monitor.
//!
//! [`AuthEngine`] is cheap to clone and owns every shared store. Registration
//! processes and login attempts are plain values driven through
//! [`RegistrationPipeline`] and [`LoginOrchestrator`]; callers decide where to
//! keep them between requests.

pub mod config;
pub mod credentials;
pub mod login;
pub mod monitor;
pub mod registration;
pub mod reset;
pub mod session;
pub mod storage;
mod utils;

pub use config::AuthConfig;
pub use credentials::{CredentialSet, Factor, FactorPolicy, FactorSelection};
pub use login::{DeviceCapabilities, LoginAttempt, LoginOrchestrator, LoginProgress, LoginStep, PrimaryCredential};
pub use monitor::SessionMonitor;
pub use registration::{Consent, RegistrationPipeline, RegistrationProcess, RegistrationStep};
pub use reset::{FactorResetOutcome, FactorResetRequest};
pub use session::{IssuedSession, RevokeReason, Session, SessionEvent, SessionStore, SessionValidation};
pub use storage::{Account, AccountStore, MemoryAccountStore, StorageError};

use crate::{
    clock::Clock,
    collaborators::Collaborators,
    error::AuthError,
    otp::{Channel, OtpManager},
};
use dashmap::DashMap;
use reset::ResetFailures;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Clone)]
pub struct AuthEngine {
    config: AuthConfig,
    accounts: Arc<dyn AccountStore>,
    otp: OtpManager,
    sessions: SessionStore,
    monitor: SessionMonitor,
    collaborators: Collaborators,
    clock: Arc<dyn Clock>,
    reset_failures: Arc<DashMap<Uuid, ResetFailures>>,
}

impl AuthEngine {
    #[must_use]
    pub fn new(
        config: AuthConfig,
        accounts: Arc<dyn AccountStore>,
        collaborators: Collaborators,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let otp = OtpManager::new(collaborators.notifier.clone(), clock.clone())
            .with_ttl_seconds(config.otp_ttl_seconds())
            .with_max_mismatches(config.max_login_failures())
            .with_delivery_timeout(config.collaborator_timeout());
        let sessions = SessionStore::new(clock.clone(), config.session_ttl_seconds());
        let monitor = SessionMonitor::new(
            sessions.clone(),
            collaborators.matcher.clone(),
            collaborators.samples.clone(),
            clock.clone(),
            config.monitor_interval(),
            config.collaborator_timeout(),
        );
        Self {
            config,
            accounts,
            otp,
            sessions,
            monitor,
            collaborators,
            clock,
            reset_failures: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    #[must_use]
    pub fn otp(&self) -> &OtpManager {
        &self.otp
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    #[must_use]
    pub fn monitor(&self) -> &SessionMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    #[must_use]
    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    /// Start a new onboarding process.
    #[must_use]
    pub fn registration(&self) -> RegistrationPipeline {
        RegistrationPipeline::new(self.clone())
    }

    #[must_use]
    pub fn login(&self) -> LoginOrchestrator {
        LoginOrchestrator::new(self.clone())
    }

    /// Outward session check for resource servers.
    #[must_use]
    pub fn validate(&self, token: &str) -> SessionValidation {
        self.sessions.validate(token)
    }

    /// # Errors
    /// `SessionRevoked` when the token is not live.
    pub fn logout(&self, token: &str) -> Result<Session, AuthError> {
        let session = self.sessions.authenticate(token)?;
        self.sessions.revoke(token, RevokeReason::Logout);
        info!(session_id = %session.id, "logged out");
        Ok(session)
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.sessions.subscribe()
    }

    /// Drop expired challenges, sessions and reset lockouts.
    pub fn purge_expired(&self) {
        let challenges = self.otp.purge_expired();
        let sessions = self.sessions.purge_expired();
        let lockouts = self.purge_reset_failures();
        if challenges + sessions + lockouts > 0 {
            debug!(challenges, sessions, lockouts, "purged expired state");
        }
    }

    pub(crate) async fn load_account(&self, id: Uuid) -> Result<Account, AuthError> {
        self.accounts
            .find(id)
            .await?
            .ok_or_else(|| AuthError::Storage(format!("account {id} disappeared")))
    }
}

/// Where a code for `channel` goes.
pub(crate) fn destination(account: &Account, channel: Channel) -> &str {
    match channel {
        Channel::Email => &account.email,
        Channel::Sms => &account.phone,
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    //! Fakes shared by the engine tests.

    use super::*;
    use crate::{
        clock::ManualClock,
        collaborators::{
            BiometricMatcher, BiometricSample, DocumentHandles, FaceReferenceId, KycVerdict,
            KycVerifier, Notifier, SampleInbox,
        },
        identity::IdentityInfo,
    };
    use async_trait::async_trait;
    use chrono::Utc;
    use secrecy::{ExposeSecret, SecretString};
    use std::sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    };

    /// Remembers the last code sent to each destination.
    #[derive(Default)]
    pub struct Outbox {
        pub sent: Mutex<Vec<(String, String)>>,
    }

    impl Outbox {
        pub fn last_code_for(&self, destination: &str) -> Option<String> {
            self.sent.lock().ok().and_then(|sent| {
                sent.iter()
                    .rev()
                    .find(|(to, _)| to == destination)
                    .map(|(_, code)| code.clone())
            })
        }
    }

    #[async_trait]
    impl Notifier for Outbox {
        async fn send(&self, _channel: Channel, destination: &str, code: &SecretString) -> bool {
            if let Ok(mut sent) = self.sent.lock() {
                sent.push((destination.to_string(), code.expose_secret().to_string()));
            }
            true
        }
    }

    /// Matches when the sample equals the reference id, unless switched off.
    pub struct EchoMatcher {
        pub enabled: AtomicBool,
    }

    #[async_trait]
    impl BiometricMatcher for EchoMatcher {
        async fn matches(
            &self,
            sample: &BiometricSample,
            reference: &FaceReferenceId,
        ) -> anyhow::Result<bool> {
            Ok(self.enabled.load(Ordering::SeqCst) && sample.0 == reference.0)
        }
    }

    pub struct FixedKyc(pub KycVerdict);

    #[async_trait]
    impl KycVerifier for FixedKyc {
        async fn verify(&self, _documents: &DocumentHandles) -> anyhow::Result<KycVerdict> {
            Ok(self.0)
        }
    }

    pub struct Harness {
        pub engine: AuthEngine,
        pub outbox: Arc<Outbox>,
        pub matcher: Arc<EchoMatcher>,
        pub inbox: SampleInbox,
        pub clock: ManualClock,
    }

    pub fn harness(config: AuthConfig) -> Harness {
        let outbox = Arc::new(Outbox::default());
        let matcher = Arc::new(EchoMatcher {
            enabled: AtomicBool::new(true),
        });
        let inbox = SampleInbox::new();
        let clock = ManualClock::new(Utc::now());
        let engine = AuthEngine::new(
            config,
            Arc::new(MemoryAccountStore::new()),
            Collaborators {
                notifier: outbox.clone(),
                matcher: matcher.clone(),
                samples: Arc::new(inbox.clone()),
                kyc: Arc::new(FixedKyc(KycVerdict::Approved)),
            },
            Arc::new(clock.clone()),
        );
        Harness {
            engine,
            outbox,
            matcher,
            inbox,
            clock,
        }
    }

    pub fn identity() -> IdentityInfo {
        IdentityInfo {
            full_name: "Ana Souza".to_string(),
            government_id: "529.982.247-25".to_string(),
            email: "Ana@Example.com".to_string(),
            phone: "(11) 98765-4321".to_string(),
        }
    }

    pub fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::from(value.to_string()))
    }

    pub fn documents() -> DocumentHandles {
        DocumentHandles {
            identity_photo: "doc-front".to_string(),
            selfie_with_document: "selfie".to_string(),
        }
    }

    /// Register and activate an account with the given factors.
    pub async fn activated(harness: &Harness, selection: FactorSelection) -> Result<Account, AuthError> {
        let mut pipeline = harness.engine.registration();
        pipeline.submit_info(&identity(), Channel::Email).await?;
        let code = harness
            .outbox
            .last_code_for("ana@example.com")
            .ok_or_else(|| AuthError::Invariant("no code sent".to_string()))?;
        pipeline.verify_otp(&code).await?;
        pipeline.submit_documents(documents()).await?;
        pipeline.configure_factors(selection).await?;
        pipeline
            .accept_terms(Consent {
                terms_of_use: true,
                data_consultation: true,
            })
            .await
    }
}
