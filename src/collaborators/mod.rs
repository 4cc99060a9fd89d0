//! Contracts for the external systems the engine talks to.
//!
//! Every call crosses a suspension point and is wrapped in [`bounded`], so no
//! engine operation waits on a collaborator longer than the configured
//! timeout. A timed-out call is treated as failed and is not retried.

pub mod http;
pub mod local;

use crate::{auth::session::Session, error::AuthError, geofence::Position, otp::Channel};
use async_trait::async_trait;
use dashmap::DashMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tokio::sync::watch;
use tracing::warn;
use ulid::Ulid;
use utoipa::ToSchema;

pub use http::{HttpBiometricMatcher, HttpKycVerifier, HttpNotifier};
pub use local::{LogNotifier, PendingKycVerifier, UnavailableMatcher};

pub(crate) const NOTIFIER: &str = "notifier";
pub(crate) const BIOMETRIC_MATCHER: &str = "biometric matcher";
pub(crate) const SAMPLE_SOURCE: &str = "biometric sample source";
pub(crate) const KYC_VERIFIER: &str = "document verifier";

/// Opaque handle to an enrolled biometric template.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct FaceReferenceId(pub String);

/// Opaque live capture (for example a base64 camera frame).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(transparent)]
pub struct BiometricSample(pub String);

/// Handles to the onboarding photos; their content is never inspected here.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DocumentHandles {
    pub identity_photo: String,
    pub selfie_with_document: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum KycVerdict {
    Approved,
    Rejected,
    Pending,
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LocationError {
    #[error("location permission denied")]
    PermissionDenied,
    #[error("location unavailable: {0}")]
    Unavailable(String),
}

/// Out-of-band delivery of one-time codes. Best effort: `false` never fails issuance.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, channel: Channel, destination: &str, code: &SecretString) -> bool;
}

#[async_trait]
pub trait BiometricMatcher: Send + Sync {
    async fn matches(
        &self,
        sample: &BiometricSample,
        reference: &FaceReferenceId,
    ) -> anyhow::Result<bool>;
}

/// Live samples for the continuous session monitor.
#[async_trait]
pub trait SampleSource: Send + Sync {
    async fn capture(&self, session: &Session) -> anyhow::Result<BiometricSample>;

    /// Prepare per-session state before the first capture.
    fn open(&self, _session: &Session) {}

    /// Drop any per-session state once the session is gone.
    fn release(&self, _session: &Session) {}
}

#[async_trait]
pub trait LocationSource: Send + Sync {
    async fn current_position(&self) -> Result<Position, LocationError>;
}

#[async_trait]
pub trait KycVerifier: Send + Sync {
    async fn verify(&self, documents: &DocumentHandles) -> anyhow::Result<KycVerdict>;
}

/// The set of collaborators injected into the engine.
#[derive(Clone)]
pub struct Collaborators {
    pub notifier: Arc<dyn Notifier>,
    pub matcher: Arc<dyn BiometricMatcher>,
    pub samples: Arc<dyn SampleSource>,
    pub kyc: Arc<dyn KycVerifier>,
}

/// Await a collaborator call for at most `limit`.
///
/// # Errors
/// `CollaboratorTimeout` when the deadline passes, `CollaboratorFailed` when
/// the collaborator itself reports an error.
pub async fn bounded<T, F>(collaborator: &'static str, limit: Duration, call: F) -> Result<T, AuthError>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => {
            warn!(collaborator, "collaborator call failed: {err:#}");
            Err(AuthError::CollaboratorFailed {
                collaborator,
                reason: err.to_string(),
            })
        }
        Err(_) => {
            let timeout_ms = u64::try_from(limit.as_millis()).unwrap_or(u64::MAX);
            warn!(collaborator, timeout_ms, "collaborator call timed out");
            Err(AuthError::CollaboratorTimeout { collaborator })
        }
    }
}

/// Position reported by the client together with the login request.
///
/// `None` means the device refused to share its location.
#[derive(Clone, Copy, Debug)]
pub struct ReportedPosition(pub Option<Position>);

#[async_trait]
impl LocationSource for ReportedPosition {
    async fn current_position(&self) -> Result<Position, LocationError> {
        self.0.ok_or(LocationError::PermissionDenied)
    }
}

/// Latest live sample pushed by each monitored client.
///
/// Each capture consumes the pending sample, so every monitor tick needs a
/// fresh push; a capture with nothing pending waits for the next one.
#[derive(Clone, Default)]
pub struct SampleInbox {
    slots: Arc<DashMap<Ulid, Arc<watch::Sender<Option<BiometricSample>>>>>,
}

impl SampleInbox {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self, session_id: Ulid) -> Option<Arc<watch::Sender<Option<BiometricSample>>>> {
        self.slots.get(&session_id).map(|slot| slot.value().clone())
    }

    /// Hand a sample to the monitor of `session_id`.
    ///
    /// Returns `false` when no monitor is listening; the sample is dropped.
    pub fn push(&self, session_id: Ulid, sample: BiometricSample) -> bool {
        match self.slot(session_id) {
            Some(slot) => {
                slot.send_replace(Some(sample));
                true
            }
            None => false,
        }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[async_trait]
impl SampleSource for SampleInbox {
    async fn capture(&self, session: &Session) -> anyhow::Result<BiometricSample> {
        let slot = self
            .slot(session.id)
            .ok_or_else(|| anyhow::anyhow!("no sample slot for session {}", session.id))?;
        let mut pushed = slot.subscribe();
        loop {
            let mut taken = None;
            slot.send_if_modified(|pending| {
                taken = pending.take();
                taken.is_some()
            });
            if let Some(sample) = taken {
                return Ok(sample);
            }
            pushed.changed().await?;
        }
    }

    fn open(&self, session: &Session) {
        self.slots
            .entry(session.id)
            .or_insert_with(|| Arc::new(watch::channel(None).0));
    }

    fn release(&self, session: &Session) {
        self.slots.remove(&session.id);
    }
}
