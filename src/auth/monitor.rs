//! Continuous re-verification of monitored sessions.
//!
//! One task per monitored session. The task holds a clone of the session's
//! cancellation token and exits as soon as the session ends by any path.
//! Any tick that cannot positively confirm the enrolled face fails closed.

use super::session::{RevokeReason, Session, SessionStore};
use crate::{
    clock::Clock,
    collaborators::{
        bounded, BiometricMatcher, FaceReferenceId, SampleSource, BIOMETRIC_MATCHER, SAMPLE_SOURCE,
    },
    error::AuthError,
};
use std::{
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

#[derive(Clone)]
pub struct SessionMonitor {
    sessions: SessionStore,
    matcher: Arc<dyn BiometricMatcher>,
    samples: Arc<dyn SampleSource>,
    clock: Arc<dyn Clock>,
    interval: Duration,
    timeout: Duration,
    live: Arc<AtomicUsize>,
}

/// Decrements the live-task counter however the task exits.
struct LiveGuard(Arc<AtomicUsize>);

impl Drop for LiveGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl SessionMonitor {
    #[must_use]
    pub fn new(
        sessions: SessionStore,
        matcher: Arc<dyn BiometricMatcher>,
        samples: Arc<dyn SampleSource>,
        clock: Arc<dyn Clock>,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            sessions,
            matcher,
            samples,
            clock,
            interval,
            timeout,
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Number of monitor tasks still running.
    #[must_use]
    pub fn live_tasks(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }

    /// Spawn the monitor for `session`, bound to `cancel`.
    pub fn start(&self, session: Session, reference: FaceReferenceId, cancel: CancellationToken) {
        self.samples.open(&session);
        self.live.fetch_add(1, Ordering::SeqCst);
        let guard = LiveGuard(self.live.clone());
        let monitor = self.clone();
        let span = tracing::info_span!("session_monitor", session_id = %session.id);
        tokio::spawn(
            async move {
                let _guard = guard;
                monitor.run(&session, &reference, &cancel).await;
                monitor.samples.release(&session);
            }
            .instrument(span),
        );
    }

    async fn run(&self, session: &Session, reference: &FaceReferenceId, cancel: &CancellationToken) {
        let remaining = (session.expires_at - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let expiry = tokio::time::sleep(remaining);
        tokio::pin!(expiry);

        let mut ticker = interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        debug!("monitor started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => {
                    debug!("session ended, monitor stopping");
                    break;
                }
                () = &mut expiry => {
                    self.sessions.revoke_by_id(session.id, RevokeReason::Expired);
                    break;
                }
                _ = ticker.tick() => {
                    let verdict = tokio::select! {
                        biased;
                        () = cancel.cancelled() => break,
                        verdict = self.check(session, reference) => verdict,
                    };
                    match verdict {
                        Ok(true) => debug!("live face confirmed"),
                        Ok(false) => {
                            info!("live face mismatch, revoking session");
                            self.force_logout(session, RevokeReason::BiometricMismatch);
                            break;
                        }
                        Err(err) => {
                            warn!("monitor tick failed closed: {err}");
                            self.force_logout(session, RevokeReason::MonitorFailure);
                            break;
                        }
                    }
                }
            }
        }
    }

    async fn check(&self, session: &Session, reference: &FaceReferenceId) -> Result<bool, AuthError> {
        let sample = bounded(SAMPLE_SOURCE, self.timeout, self.samples.capture(session)).await?;
        bounded(
            BIOMETRIC_MATCHER,
            self.timeout,
            self.matcher.matches(&sample, reference),
        )
        .await
    }

    fn force_logout(&self, session: &Session, reason: RevokeReason) {
        self.sessions.set_monitor_active(session.id, false);
        self.sessions.revoke_by_id(session.id, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{clock::SystemClock, collaborators::BiometricSample};
    use async_trait::async_trait;
    use secrecy::ExposeSecret;
    use std::sync::atomic::AtomicBool;
    use uuid::Uuid;

    struct ToggleMatcher(AtomicBool);

    #[async_trait]
    impl BiometricMatcher for ToggleMatcher {
        async fn matches(
            &self,
            _sample: &BiometricSample,
            _reference: &FaceReferenceId,
        ) -> anyhow::Result<bool> {
            Ok(self.0.load(Ordering::SeqCst))
        }
    }

    struct Camera;

    #[async_trait]
    impl SampleSource for Camera {
        async fn capture(&self, _session: &Session) -> anyhow::Result<BiometricSample> {
            Ok(BiometricSample("frame".to_string()))
        }
    }

    struct DeadCamera;

    #[async_trait]
    impl SampleSource for DeadCamera {
        async fn capture(&self, _session: &Session) -> anyhow::Result<BiometricSample> {
            std::future::pending::<()>().await;
            Ok(BiometricSample("never".to_string()))
        }
    }

    struct Fixture {
        sessions: SessionStore,
        monitor: SessionMonitor,
        matcher: Arc<ToggleMatcher>,
    }

    fn fixture(samples: Arc<dyn SampleSource>) -> Fixture {
        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let sessions = SessionStore::new(clock.clone(), 15 * 60);
        let matcher = Arc::new(ToggleMatcher(AtomicBool::new(true)));
        let monitor = SessionMonitor::new(
            sessions.clone(),
            matcher.clone(),
            samples,
            clock,
            Duration::from_secs(10),
            Duration::from_secs(2),
        );
        Fixture {
            sessions,
            monitor,
            matcher,
        }
    }

    fn start(fixture: &Fixture) -> Result<String, AuthError> {
        let issued = fixture.sessions.issue(Uuid::new_v4(), true)?;
        let cancel = fixture
            .sessions
            .cancellation(issued.session.id)
            .ok_or_else(|| AuthError::Invariant("missing session".to_string()))?;
        fixture.monitor.start(
            issued.session,
            FaceReferenceId("face-1".to_string()),
            cancel,
        );
        Ok(issued.token.expose_secret().to_string())
    }

    async fn settle(monitor: &SessionMonitor) {
        for _ in 0..50 {
            if monitor.live_tasks() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn matching_ticks_keep_the_session_alive() -> Result<(), AuthError> {
        let fixture = fixture(Arc::new(Camera));
        let token = start(&fixture)?;

        tokio::time::sleep(Duration::from_secs(35)).await;
        assert!(fixture.sessions.validate(&token).valid);
        assert_eq!(fixture.monitor.live_tasks(), 1);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn mismatch_revokes_and_broadcasts_forced_logout() -> Result<(), AuthError> {
        let fixture = fixture(Arc::new(Camera));
        let mut events = fixture.sessions.subscribe();
        let token = start(&fixture)?;

        tokio::time::sleep(Duration::from_secs(15)).await;
        assert!(fixture.sessions.validate(&token).valid);

        fixture.matcher.0.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        settle(&fixture.monitor).await;

        let validation = fixture.sessions.validate(&token);
        assert!(!validation.valid);
        assert_eq!(validation.revoked, Some(RevokeReason::BiometricMismatch));
        let event = events
            .recv()
            .await
            .map_err(|err| AuthError::Invariant(err.to_string()))?;
        assert!(matches!(event, crate::auth::session::SessionEvent::ForcedLogout { .. }));
        assert_eq!(event.reason(), RevokeReason::BiometricMismatch);
        assert_eq!(fixture.monitor.live_tasks(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn stuck_capture_fails_closed() -> Result<(), AuthError> {
        let fixture = fixture(Arc::new(DeadCamera));
        let token = start(&fixture)?;

        tokio::time::sleep(Duration::from_secs(13)).await;
        settle(&fixture.monitor).await;

        assert_eq!(
            fixture.sessions.validate(&token).revoked,
            Some(RevokeReason::MonitorFailure)
        );
        assert_eq!(fixture.monitor.live_tasks(), 0);
        Ok(())
    }

    #[tokio::test(start_paused = true)]
    async fn logout_stops_the_task() -> Result<(), AuthError> {
        let fixture = fixture(Arc::new(Camera));
        let token = start(&fixture)?;
        tokio::task::yield_now().await;
        assert_eq!(fixture.monitor.live_tasks(), 1);

        assert!(fixture.sessions.revoke(&token, RevokeReason::Logout));
        settle(&fixture.monitor).await;
        assert_eq!(fixture.monitor.live_tasks(), 0);
        assert_eq!(
            fixture.sessions.validate(&token).revoked,
            Some(RevokeReason::Logout)
        );
        Ok(())
    }
}
