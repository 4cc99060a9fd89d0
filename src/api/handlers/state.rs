//! In-flight onboarding processes and login attempts, keyed by ULID.
//!
//! Each entry sits behind its own async mutex: two requests for the same
//! process serialize, requests for different processes never contend.

use crate::{
    auth::{AuthEngine, LoginAttempt, LoginStep, RegistrationPipeline, RegistrationStep},
    collaborators::SampleInbox,
};
use chrono::Duration;
use dashmap::DashMap;
use std::sync::Arc;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use ulid::Ulid;

/// Abandoned processes and attempts are dropped after this long.
pub const DEFAULT_PENDING_TTL_SECONDS: i64 = 3600;

pub struct AppState {
    engine: AuthEngine,
    inbox: SampleInbox,
    registrations: DashMap<Ulid, Arc<Mutex<RegistrationPipeline>>>,
    attempts: DashMap<Ulid, Arc<Mutex<LoginAttempt>>>,
    pending_ttl: Duration,
}

impl AppState {
    #[must_use]
    pub fn new(engine: AuthEngine, inbox: SampleInbox) -> Self {
        Self {
            engine,
            inbox,
            registrations: DashMap::new(),
            attempts: DashMap::new(),
            pending_ttl: Duration::seconds(DEFAULT_PENDING_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_pending_ttl_seconds(mut self, seconds: i64) -> Self {
        self.pending_ttl = Duration::seconds(seconds.max(1));
        self
    }

    #[must_use]
    pub fn engine(&self) -> &AuthEngine {
        &self.engine
    }

    #[must_use]
    pub fn inbox(&self) -> &SampleInbox {
        &self.inbox
    }

    pub fn track_registration(&self, pipeline: RegistrationPipeline) -> Arc<Mutex<RegistrationPipeline>> {
        let id = pipeline.id();
        let entry = Arc::new(Mutex::new(pipeline));
        self.registrations.insert(id, entry.clone());
        entry
    }

    #[must_use]
    pub fn registration(&self, id: Ulid) -> Option<Arc<Mutex<RegistrationPipeline>>> {
        self.registrations.get(&id).map(|entry| entry.value().clone())
    }

    pub fn forget_registration(&self, id: Ulid) {
        self.registrations.remove(&id);
    }

    pub fn track_attempt(&self, attempt: LoginAttempt) -> Arc<Mutex<LoginAttempt>> {
        let id = attempt.id;
        let entry = Arc::new(Mutex::new(attempt));
        self.attempts.insert(id, entry.clone());
        entry
    }

    #[must_use]
    pub fn attempt(&self, id: Ulid) -> Option<Arc<Mutex<LoginAttempt>>> {
        self.attempts.get(&id).map(|entry| entry.value().clone())
    }

    pub fn forget_attempt(&self, id: Ulid) {
        self.attempts.remove(&id);
    }

    #[must_use]
    pub fn pending_registrations(&self) -> usize {
        self.registrations.len()
    }

    #[must_use]
    pub fn pending_attempts(&self) -> usize {
        self.attempts.len()
    }

    /// Drop expired engine state, finished attempts and stale entries.
    ///
    /// A stale registration also loses its unactivated account and its code.
    /// Entries locked by a request in flight are left for the next sweep.
    pub async fn sweep(&self) {
        self.engine.purge_expired();
        let cutoff = self.engine.clock().now() - self.pending_ttl;

        let stale: Vec<(Ulid, Arc<Mutex<RegistrationPipeline>>)> = self
            .registrations
            .iter()
            .filter(|entry| {
                entry.value().try_lock().is_ok_and(|pipeline| {
                    pipeline.step() == RegistrationStep::Complete
                        || pipeline.process().started_at <= cutoff
                })
            })
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        for (id, entry) in stale {
            self.registrations.remove(&id);
            let mut pipeline = entry.lock().await;
            if pipeline.step() == RegistrationStep::Complete {
                continue;
            }
            if let Err(err) = pipeline.restart().await {
                warn!(process_id = %id, "failed to discard abandoned registration: {err}");
            }
        }

        self.attempts.retain(|_, entry| {
            entry.try_lock().map_or(true, |attempt| {
                attempt.step() != LoginStep::Failed && attempt.started_at > cutoff
            })
        });
        debug!(
            registrations = self.registrations.len(),
            attempts = self.attempts.len(),
            "swept pending state"
        );
    }
}

/// Sweep on a fixed period until `cancel` fires.
pub fn spawn_janitor(
    state: Arc<AppState>,
    period: std::time::Duration,
    cancel: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                () = cancel.cancelled() => {
                    info!("janitor stopped");
                    break;
                }
                _ = ticker.tick() => state.sweep().await,
            }
        }
    })
}
