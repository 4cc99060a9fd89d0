use super::models::{Channel, Delivery, OtpChallenge, OtpIssued, OtpPurpose, VerifyResult};
use crate::{
    clock::Clock,
    collaborators::{bounded, Notifier, NOTIFIER},
};
use chrono::{DateTime, Utc};
use dashmap::{mapref::entry::Entry, DashMap};
use rand::{rngs::OsRng, Rng};
use secrecy::{ExposeSecret, SecretString};
use std::{sync::Arc, time::Duration};
use tracing::{debug, info, instrument, warn};

pub const OTP_DIGITS: usize = 6;
pub const DEFAULT_OTP_TTL_SECONDS: i64 = 5 * 60;
pub const DEFAULT_MAX_MISMATCHES: u32 = 5;

type ChallengeKey = (String, OtpPurpose);

/// Issues and verifies one-time codes.
///
/// Challenges live in a sharded map; issue and verify for one key both run
/// under that key's entry lock, so a verify never races a concurrent re-issue
/// and unrelated subjects never wait on each other.
#[derive(Clone)]
pub struct OtpManager {
    challenges: Arc<DashMap<ChallengeKey, OtpChallenge>>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
    delivery_timeout: Duration,
    max_mismatches: u32,
}

impl OtpManager {
    #[must_use]
    pub fn new(notifier: Arc<dyn Notifier>, clock: Arc<dyn Clock>) -> Self {
        Self {
            challenges: Arc::new(DashMap::new()),
            notifier,
            clock,
            ttl: chrono::Duration::seconds(DEFAULT_OTP_TTL_SECONDS),
            delivery_timeout: Duration::from_secs(5),
            max_mismatches: DEFAULT_MAX_MISMATCHES,
        }
    }

    #[must_use]
    pub fn with_ttl_seconds(mut self, seconds: i64) -> Self {
        self.ttl = chrono::Duration::seconds(seconds);
        self
    }

    /// Wrong codes a challenge tolerates before it is dropped.
    #[must_use]
    pub fn with_max_mismatches(mut self, max: u32) -> Self {
        self.max_mismatches = max.max(1);
        self
    }

    #[must_use]
    pub fn with_delivery_timeout(mut self, timeout: Duration) -> Self {
        self.delivery_timeout = timeout;
        self
    }

    /// Create a fresh challenge for `(subject_id, purpose)` and hand it to the notifier.
    ///
    /// Any previous challenge for the pair stops being verifiable the moment
    /// this one is stored. Delivery problems are reported in the result, not
    /// as an error.
    #[instrument(skip(self, destination))]
    pub async fn issue(
        &self,
        subject_id: &str,
        purpose: OtpPurpose,
        channel: Channel,
        destination: &str,
    ) -> OtpIssued {
        let code = generate_code();
        let issued_at = self.clock.now();
        let expires_at = issued_at + self.ttl;

        let previous = self.challenges.insert(
            (subject_id.to_string(), purpose),
            OtpChallenge {
                code: SecretString::from(code.clone()),
                subject_id: subject_id.to_string(),
                purpose,
                channel,
                issued_at,
                expires_at,
                consumed: false,
                mismatches: 0,
            },
        );
        if previous.is_some() {
            debug!("replaced previous challenge");
        }

        let code = SecretString::from(code);
        let delivered = bounded(NOTIFIER, self.delivery_timeout, async {
            Ok::<_, anyhow::Error>(self.notifier.send(channel, destination, &code).await)
        })
        .await
        .unwrap_or(false);

        let delivery = if delivered {
            info!("one-time code issued");
            Delivery::Delivered
        } else {
            warn!("one-time code issued but delivery was not confirmed");
            Delivery::Failed
        };

        OtpIssued {
            code,
            channel,
            issued_at,
            expires_at,
            delivery,
        }
    }

    /// Check a supplied code against the live challenge.
    ///
    /// `Ok` consumes the challenge and `Expired` purges it. `Mismatch` leaves
    /// it in place for a retry until the mismatch cap is reached; the wrong
    /// code that hits the cap drops the challenge.
    #[instrument(skip(self, supplied))]
    pub fn verify(&self, subject_id: &str, purpose: OtpPurpose, supplied: &str) -> VerifyResult {
        let now = self.clock.now();
        match self.challenges.entry((subject_id.to_string(), purpose)) {
            Entry::Vacant(_) => VerifyResult::NotFound,
            Entry::Occupied(mut entry) => {
                let challenge = entry.get();
                if challenge.consumed {
                    entry.remove();
                    VerifyResult::NotFound
                } else if now >= challenge.expires_at {
                    entry.remove();
                    debug!("challenge expired");
                    VerifyResult::Expired
                } else if challenge.code.expose_secret() != supplied.trim() {
                    let challenge = entry.get_mut();
                    challenge.mismatches += 1;
                    if challenge.mismatches >= self.max_mismatches {
                        warn!(
                            mismatches = challenge.mismatches,
                            "too many wrong codes, challenge dropped"
                        );
                        entry.remove();
                    } else {
                        debug!("challenge mismatch");
                    }
                    VerifyResult::Mismatch
                } else {
                    entry.get_mut().consumed = true;
                    entry.remove();
                    VerifyResult::Ok
                }
            }
        }
    }

    /// Drop the live challenge for a pair, if any.
    pub fn invalidate(&self, subject_id: &str, purpose: OtpPurpose) {
        self.challenges.remove(&(subject_id.to_string(), purpose));
    }

    /// Expiry of the live challenge for a pair.
    #[must_use]
    pub fn expires_at(&self, subject_id: &str, purpose: OtpPurpose) -> Option<DateTime<Utc>> {
        self.challenges
            .get(&(subject_id.to_string(), purpose))
            .map(|challenge| challenge.expires_at)
    }

    /// Remove every expired challenge; returns how many were dropped.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let before = self.challenges.len();
        self.challenges
            .retain(|_, challenge| !challenge.consumed && challenge.expires_at > now);
        before.saturating_sub(self.challenges.len())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.challenges.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.challenges.is_empty()
    }
}

/// Uniformly random, zero-padded numeric code.
fn generate_code() -> String {
    let upper = 10u32.pow(u32::try_from(OTP_DIGITS).unwrap_or(6));
    let value = OsRng.gen_range(0..upper);
    format!("{value:0width$}", width = OTP_DIGITS)
}
