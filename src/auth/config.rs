use super::credentials::FactorPolicy;
use crate::otp::service::DEFAULT_OTP_TTL_SECONDS;
use std::time::Duration;

pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 15 * 60;
pub const DEFAULT_MONITOR_INTERVAL_SECONDS: u64 = 10;
pub const DEFAULT_COLLABORATOR_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_MAX_LOGIN_FAILURES: u32 = 5;
pub const DEFAULT_RESET_LOCKOUT_SECONDS: i64 = 15 * 60;

#[derive(Clone, Debug)]
pub struct AuthConfig {
    otp_ttl_seconds: i64,
    session_ttl_seconds: i64,
    monitor_interval: Duration,
    collaborator_timeout: Duration,
    max_login_failures: u32,
    reset_lockout_seconds: i64,
    factor_policy: FactorPolicy,
    require_data_consent: bool,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self {
            otp_ttl_seconds: DEFAULT_OTP_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            monitor_interval: Duration::from_secs(DEFAULT_MONITOR_INTERVAL_SECONDS),
            collaborator_timeout: Duration::from_millis(DEFAULT_COLLABORATOR_TIMEOUT_MS),
            max_login_failures: DEFAULT_MAX_LOGIN_FAILURES,
            reset_lockout_seconds: DEFAULT_RESET_LOCKOUT_SECONDS,
            factor_policy: FactorPolicy::default(),
            require_data_consent: true,
        }
    }

    #[must_use]
    pub fn with_otp_ttl_seconds(mut self, seconds: i64) -> Self {
        self.otp_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_monitor_interval(mut self, interval: Duration) -> Self {
        self.monitor_interval = interval;
        self
    }

    #[must_use]
    pub fn with_collaborator_timeout(mut self, timeout: Duration) -> Self {
        self.collaborator_timeout = timeout;
        self
    }

    /// A cap of 0 is treated as 1: the first mismatch fails the attempt.
    #[must_use]
    pub fn with_max_login_failures(mut self, failures: u32) -> Self {
        self.max_login_failures = failures.max(1);
        self
    }

    /// How long factor reset stays closed for an account once its
    /// ownership checks failed `max_login_failures` times.
    #[must_use]
    pub fn with_reset_lockout_seconds(mut self, seconds: i64) -> Self {
        self.reset_lockout_seconds = seconds.max(1);
        self
    }

    #[must_use]
    pub fn with_factor_policy(mut self, policy: FactorPolicy) -> Self {
        self.factor_policy = policy;
        self
    }

    #[must_use]
    pub fn with_require_data_consent(mut self, required: bool) -> Self {
        self.require_data_consent = required;
        self
    }

    #[must_use]
    pub fn otp_ttl_seconds(&self) -> i64 {
        self.otp_ttl_seconds
    }

    #[must_use]
    pub fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub fn monitor_interval(&self) -> Duration {
        self.monitor_interval
    }

    #[must_use]
    pub fn collaborator_timeout(&self) -> Duration {
        self.collaborator_timeout
    }

    #[must_use]
    pub fn max_login_failures(&self) -> u32 {
        self.max_login_failures
    }

    #[must_use]
    pub fn reset_lockout_seconds(&self) -> i64 {
        self.reset_lockout_seconds
    }

    #[must_use]
    pub fn factor_policy(&self) -> FactorPolicy {
        self.factor_policy
    }

    #[must_use]
    pub fn require_data_consent(&self) -> bool {
        self.require_data_consent
    }
}
