//! JSON-over-HTTP adapters for remote collaborators.
//!
//! Each adapter posts a small JSON document to a configured endpoint. An
//! optional bearer token (sourced from the environment, never hardcoded) is
//! attached to every request.

use super::{
    BiometricMatcher, BiometricSample, DocumentHandles, FaceReferenceId, KycVerdict, KycVerifier,
    Notifier,
};
use crate::{otp::Channel, APP_USER_AGENT};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{debug, error, instrument};
use url::Url;

/// Shared HTTP plumbing for the adapters.
#[derive(Clone, Debug)]
struct Endpoint {
    client: Client,
    url: Url,
    token: Option<SecretString>,
}

impl Endpoint {
    fn new(url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url).with_context(|| format!("Invalid collaborator URL: {url}"))?;
        let client = Client::builder()
            .user_agent(APP_USER_AGENT)
            .timeout(timeout)
            .build()
            .context("Error creating reqwest client")?;
        Ok(Self { client, url, token })
    }

    fn post(&self) -> RequestBuilder {
        let request = self.client.post(self.url.clone());
        match &self.token {
            Some(token) => request.bearer_auth(token.expose_secret()),
            None => request,
        }
    }
}

/// Hands codes to a delivery gateway (email/SMS provider bridge).
#[derive(Clone, Debug)]
pub struct HttpNotifier {
    endpoint: Endpoint,
}

impl HttpNotifier {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(url, token, timeout)?,
        })
    }
}

#[async_trait]
impl Notifier for HttpNotifier {
    #[instrument(skip(self, code))]
    async fn send(&self, channel: Channel, destination: &str, code: &SecretString) -> bool {
        let body = json!({
            "channel": channel,
            "destination": destination,
            "code": code.expose_secret(),
        });
        match self.endpoint.post().json(&body).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                error!("Notifier rejected delivery: {}", response.status());
                false
            }
            Err(e) => {
                error!("Error calling notifier: {:?}", e);
                false
            }
        }
    }
}

#[derive(Deserialize)]
struct MatchResponse {
    #[serde(rename = "match")]
    matched: bool,
}

/// Remote face matcher comparing a live sample against an enrolled template.
#[derive(Clone, Debug)]
pub struct HttpBiometricMatcher {
    endpoint: Endpoint,
}

impl HttpBiometricMatcher {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(url, token, timeout)?,
        })
    }
}

#[async_trait]
impl BiometricMatcher for HttpBiometricMatcher {
    async fn matches(&self, sample: &BiometricSample, reference: &FaceReferenceId) -> Result<bool> {
        let response = self
            .endpoint
            .post()
            .json(&json!({ "sample": sample, "reference": reference }))
            .send()
            .await
            .context("biometric matcher unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!("biometric matcher returned {}", response.status()));
        }
        let body: MatchResponse = response
            .json()
            .await
            .context("invalid biometric matcher response")?;
        debug!(matched = body.matched, "biometric matcher answered");
        Ok(body.matched)
    }
}

#[derive(Deserialize)]
struct KycResponse {
    verdict: KycVerdict,
}

/// Remote document verification (KYC) service.
#[derive(Clone, Debug)]
pub struct HttpKycVerifier {
    endpoint: Endpoint,
}

impl HttpKycVerifier {
    /// # Errors
    /// Returns an error if the URL is invalid or the HTTP client cannot be built.
    pub fn new(url: &str, token: Option<SecretString>, timeout: Duration) -> Result<Self> {
        Ok(Self {
            endpoint: Endpoint::new(url, token, timeout)?,
        })
    }
}

#[async_trait]
impl KycVerifier for HttpKycVerifier {
    async fn verify(&self, documents: &DocumentHandles) -> Result<KycVerdict> {
        let response = self
            .endpoint
            .post()
            .json(documents)
            .send()
            .await
            .context("document verifier unreachable")?;
        if !response.status().is_success() {
            return Err(anyhow!("document verifier returned {}", response.status()));
        }
        let body: KycResponse = response
            .json()
            .await
            .context("invalid document verifier response")?;
        Ok(body.verdict)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adapters_reject_invalid_urls() {
        let timeout = Duration::from_secs(1);
        assert!(HttpNotifier::new("not a url", None, timeout).is_err());
        assert!(HttpBiometricMatcher::new("::", None, timeout).is_err());
        assert!(HttpKycVerifier::new("https://kyc.vigilo.dev/verify", None, timeout).is_ok());
    }

    #[test]
    fn match_response_uses_reserved_word_key() -> Result<()> {
        let body: MatchResponse = serde_json::from_str(r#"{"match": true}"#)?;
        assert!(body.matched);
        let body: KycResponse = serde_json::from_str(r#"{"verdict": "rejected"}"#)?;
        assert_eq!(body.verdict, KycVerdict::Rejected);
        Ok(())
    }
}
