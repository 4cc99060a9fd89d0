//! In-process collaborators for local development and deployments without
//! the corresponding external service.

use super::{BiometricMatcher, BiometricSample, DocumentHandles, FaceReferenceId, KycVerdict, KycVerifier, Notifier};
use crate::otp::Channel;
use anyhow::{anyhow, Result};
use async_trait::async_trait;
use secrecy::SecretString;
use tracing::info;

/// Local dev notifier that logs the delivery instead of sending it.
///
/// The code itself is never logged.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, channel: Channel, destination: &str, _code: &SecretString) -> bool {
        info!(%channel, destination = %mask_destination(destination), "otp delivery stub");
        true
    }
}

/// Answers `Pending` for every document set; activation treats it as approved.
#[derive(Clone, Debug)]
pub struct PendingKycVerifier;

#[async_trait]
impl KycVerifier for PendingKycVerifier {
    async fn verify(&self, _documents: &DocumentHandles) -> Result<KycVerdict> {
        Ok(KycVerdict::Pending)
    }
}

/// Used when no matcher is configured: biometric steps fail closed.
#[derive(Clone, Debug)]
pub struct UnavailableMatcher;

#[async_trait]
impl BiometricMatcher for UnavailableMatcher {
    async fn matches(&self, _sample: &BiometricSample, _reference: &FaceReferenceId) -> Result<bool> {
        Err(anyhow!("no biometric matcher configured"))
    }
}

/// Keep the first two and the last two characters of an address or number.
pub(crate) fn mask_destination(destination: &str) -> String {
    let chars: Vec<char> = destination.chars().collect();
    if chars.len() <= 4 {
        return "*".repeat(chars.len());
    }
    let head: String = chars[..2].iter().collect();
    let tail: String = chars[chars.len() - 2..].iter().collect();
    format!("{head}{}{tail}", "*".repeat(chars.len() - 4))
}
