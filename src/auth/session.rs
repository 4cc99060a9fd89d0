//! Live sessions, keyed by the SHA-256 of their bearer token.
//!
//! Every session entry owns a [`CancellationToken`]. Whatever path ends the
//! session (logout, expiry, monitor revocation, factor reset) removes the
//! entry from the map first, so exactly one caller gets to cancel the token
//! and record the reason. Revoked sessions leave a tombstone until their
//! original expiry so that `validate` can tell "revoked" from "never existed".

use super::utils::{generate_session_token, hash_session_token};
use crate::{clock::Clock, error::AuthError};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use std::{fmt, sync::Arc};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use ulid::Ulid;
use utoipa::ToSchema;
use uuid::Uuid;

const EVENT_CAPACITY: usize = 256;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Session {
    #[schema(value_type = String)]
    pub id: Ulid,
    pub account_id: Uuid,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub monitor_active: bool,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum RevokeReason {
    Logout,
    Expired,
    BiometricMismatch,
    MonitorFailure,
    FactorReset,
}

impl RevokeReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Logout => "logout",
            Self::Expired => "expired",
            Self::BiometricMismatch => "biometric_mismatch",
            Self::MonitorFailure => "monitor_failure",
            Self::FactorReset => "factor_reset",
        }
    }

    /// Whether the user was logged out without asking for it.
    #[must_use]
    pub fn is_forced(self) -> bool {
        matches!(
            self,
            Self::BiometricMismatch | Self::MonitorFailure | Self::FactorReset
        )
    }
}

impl fmt::Display for RevokeReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer of the outward `validate(token)` contract.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
pub struct SessionValidation {
    pub account_id: Option<Uuid>,
    pub valid: bool,
    pub revoked: Option<RevokeReason>,
}

impl SessionValidation {
    fn unknown() -> Self {
        Self {
            account_id: None,
            valid: false,
            revoked: None,
        }
    }
}

/// Broadcast whenever a session ends.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ToSchema)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    ForcedLogout {
        #[schema(value_type = String)]
        session_id: Ulid,
        account_id: Uuid,
        reason: RevokeReason,
    },
    Ended {
        #[schema(value_type = String)]
        session_id: Ulid,
        account_id: Uuid,
        reason: RevokeReason,
    },
}

impl SessionEvent {
    #[must_use]
    pub fn reason(&self) -> RevokeReason {
        match self {
            Self::ForcedLogout { reason, .. } | Self::Ended { reason, .. } => *reason,
        }
    }
}

/// A freshly issued session together with its only copy of the raw token.
#[derive(Debug)]
pub struct IssuedSession {
    pub session: Session,
    pub token: SecretString,
}

struct SessionEntry {
    session: Session,
    cancel: CancellationToken,
}

struct Tombstone {
    account_id: Uuid,
    reason: RevokeReason,
    expires_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct SessionStore {
    live: Arc<DashMap<Vec<u8>, SessionEntry>>,
    by_id: Arc<DashMap<Ulid, Vec<u8>>>,
    tombstones: Arc<DashMap<Vec<u8>, Tombstone>>,
    events: broadcast::Sender<SessionEvent>,
    clock: Arc<dyn Clock>,
    ttl: chrono::Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, ttl_seconds: i64) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            live: Arc::new(DashMap::new()),
            by_id: Arc::new(DashMap::new()),
            tombstones: Arc::new(DashMap::new()),
            events,
            clock,
            ttl: chrono::Duration::seconds(ttl_seconds),
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    /// Create a session for `account_id`.
    ///
    /// # Errors
    /// Returns an error if no token can be generated.
    pub fn issue(&self, account_id: Uuid, monitored: bool) -> Result<IssuedSession, AuthError> {
        let token = generate_session_token()
            .map_err(|err| AuthError::Invariant(format!("{err:#}")))?;
        let hash = hash_session_token(&token);
        let issued_at = self.clock.now();
        let session = Session {
            id: Ulid::new(),
            account_id,
            issued_at,
            expires_at: issued_at + self.ttl,
            monitor_active: monitored,
        };

        self.by_id.insert(session.id, hash.clone());
        self.live.insert(
            hash,
            SessionEntry {
                session: session.clone(),
                cancel: CancellationToken::new(),
            },
        );
        info!(session_id = %session.id, %account_id, monitored, "session issued");

        Ok(IssuedSession {
            session,
            token: SecretString::from(token),
        })
    }

    /// Outward validation contract. Expired sessions are ended on sight.
    #[must_use]
    pub fn validate(&self, token: &str) -> SessionValidation {
        let hash = hash_session_token(token);
        let now = self.clock.now();

        let live = self
            .live
            .get(&hash)
            .map(|entry| (entry.session.account_id, entry.session.expires_at));
        if let Some((account_id, expires_at)) = live {
            if now < expires_at {
                return SessionValidation {
                    account_id: Some(account_id),
                    valid: true,
                    revoked: None,
                };
            }
            self.end(&hash, RevokeReason::Expired);
        }

        self.tombstone_state(&hash, now)
    }

    /// Like [`Self::validate`] but for callers that need the session itself.
    ///
    /// # Errors
    /// `SessionRevoked` with the reason when the token is not live.
    pub fn authenticate(&self, token: &str) -> Result<Session, AuthError> {
        let hash = hash_session_token(token);
        let now = self.clock.now();

        let live = self.live.get(&hash).map(|entry| entry.session.clone());
        if let Some(session) = live {
            if now < session.expires_at {
                return Ok(session);
            }
            self.end(&hash, RevokeReason::Expired);
        }

        match self.tombstone_state(&hash, now).revoked {
            Some(reason) => Err(AuthError::SessionRevoked(reason.as_str())),
            None => Err(AuthError::SessionRevoked("unknown")),
        }
    }

    /// End the session behind `token`. Returns `false` if it was not live.
    pub fn revoke(&self, token: &str, reason: RevokeReason) -> bool {
        self.end(&hash_session_token(token), reason).is_some()
    }

    /// End a session by id. Used by the monitor, which never sees the raw token.
    pub fn revoke_by_id(&self, id: Ulid, reason: RevokeReason) -> Option<Session> {
        let hash = self.by_id.get(&id).map(|hash| hash.clone())?;
        self.end(&hash, reason)
    }

    /// End every live session of an account; returns how many were ended.
    pub fn revoke_account(&self, account_id: Uuid, reason: RevokeReason) -> usize {
        let hashes: Vec<Vec<u8>> = self
            .live
            .iter()
            .filter(|entry| entry.session.account_id == account_id)
            .map(|entry| entry.key().clone())
            .collect();
        hashes
            .iter()
            .filter(|hash| self.end(hash, reason).is_some())
            .count()
    }

    #[must_use]
    pub fn get(&self, id: Ulid) -> Option<Session> {
        let hash = self.by_id.get(&id).map(|hash| hash.clone())?;
        self.live.get(&hash).map(|entry| entry.session.clone())
    }

    /// Cancellation handle of a live session, for tasks bound to its lifetime.
    #[must_use]
    pub fn cancellation(&self, id: Ulid) -> Option<CancellationToken> {
        let hash = self.by_id.get(&id).map(|hash| hash.clone())?;
        self.live.get(&hash).map(|entry| entry.cancel.clone())
    }

    pub fn set_monitor_active(&self, id: Ulid, active: bool) {
        if let Some(hash) = self.by_id.get(&id).map(|hash| hash.clone()) {
            if let Some(mut entry) = self.live.get_mut(&hash) {
                entry.session.monitor_active = active;
            }
        }
    }

    /// End expired sessions and drop stale tombstones.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let expired: Vec<Vec<u8>> = self
            .live
            .iter()
            .filter(|entry| entry.session.expires_at <= now)
            .map(|entry| entry.key().clone())
            .collect();
        let ended = expired
            .iter()
            .filter(|hash| self.end(hash, RevokeReason::Expired).is_some())
            .count();
        self.tombstones.retain(|_, tombstone| tombstone.expires_at > now);
        ended
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    fn tombstone_state(&self, hash: &[u8], now: DateTime<Utc>) -> SessionValidation {
        let Some((account_id, reason, expires_at)) = self
            .tombstones
            .get(hash)
            .map(|tombstone| (tombstone.account_id, tombstone.reason, tombstone.expires_at))
        else {
            return SessionValidation::unknown();
        };
        if now >= expires_at {
            self.tombstones.remove(hash);
            return SessionValidation::unknown();
        }
        SessionValidation {
            account_id: Some(account_id),
            valid: false,
            revoked: Some(reason),
        }
    }

    /// Remove, cancel and tombstone. Only the caller that wins the removal
    /// gets `Some`, so the token is cancelled exactly once.
    fn end(&self, hash: &[u8], reason: RevokeReason) -> Option<Session> {
        let (_, entry) = self.live.remove(hash)?;
        let mut session = entry.session;
        session.monitor_active = false;
        entry.cancel.cancel();
        self.by_id.remove(&session.id);

        if reason != RevokeReason::Expired {
            self.tombstones.insert(
                hash.to_vec(),
                Tombstone {
                    account_id: session.account_id,
                    reason,
                    expires_at: session.expires_at,
                },
            );
        }

        let event = if reason.is_forced() {
            info!(session_id = %session.id, account_id = %session.account_id, %reason, "session force-closed");
            SessionEvent::ForcedLogout {
                session_id: session.id,
                account_id: session.account_id,
                reason,
            }
        } else {
            debug!(session_id = %session.id, %reason, "session ended");
            SessionEvent::Ended {
                session_id: session.id,
                account_id: session.account_id,
                reason,
            }
        };
        // no subscribers is fine
        let _ = self.events.send(event);

        Some(session)
    }
}
