//! Collaborator fakes shared by the integration suites.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use std::sync::{Arc, Mutex};
use vigilo::{
    auth::{AuthConfig, AuthEngine, MemoryAccountStore},
    clock::ManualClock,
    collaborators::{
        BiometricMatcher, BiometricSample, Collaborators, DocumentHandles, FaceReferenceId,
        KycVerdict, KycVerifier, Notifier, SampleInbox,
    },
    otp::Channel,
};

/// Keeps every code it is asked to deliver.
#[derive(Default)]
pub struct Outbox {
    sent: Mutex<Vec<(String, String)>>,
}

impl Outbox {
    pub fn last_code_for(&self, destination: &str) -> Option<String> {
        let sent = self.sent.lock().ok()?;
        sent.iter()
            .rev()
            .find(|(to, _)| to == destination)
            .map(|(_, code)| code.clone())
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

/// A sample matches when it spells the reference id.
pub struct EchoMatcher;

#[async_trait]
impl BiometricMatcher for EchoMatcher {
    async fn matches(
        &self,
        sample: &BiometricSample,
        reference: &FaceReferenceId,
    ) -> anyhow::Result<bool> {
        Ok(sample.0 == reference.0)
    }
}

pub struct ApprovingKyc;

#[async_trait]
impl KycVerifier for ApprovingKyc {
    async fn verify(&self, _documents: &DocumentHandles) -> anyhow::Result<KycVerdict> {
        Ok(KycVerdict::Approved)
    }
}

pub struct Fixture {
    pub engine: AuthEngine,
    pub outbox: Arc<Outbox>,
    pub inbox: SampleInbox,
    pub clock: ManualClock,
}

pub fn fixture(config: AuthConfig) -> Fixture {
    let outbox = Arc::new(Outbox::default());
    let inbox = SampleInbox::new();
    let clock = ManualClock::new(Utc::now());
    let engine = AuthEngine::new(
        config,
        Arc::new(MemoryAccountStore::new()),
        Collaborators {
            notifier: outbox.clone(),
            matcher: Arc::new(EchoMatcher),
            samples: Arc::new(inbox.clone()),
            kyc: Arc::new(ApprovingKyc),
        },
        Arc::new(clock.clone()),
    );
    Fixture {
        engine,
        outbox,
        inbox,
        clock,
    }
}

pub const EMAIL: &str = "ana@example.com";
pub const GOVERNMENT_ID: &str = "529.982.247-25";
pub const PHONE: &str = "(11) 98765-4321";
