use crate::auth::{AuthConfig, FactorPolicy};
use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use std::time::Duration;

pub const ARG_OTP_TTL_SECONDS: &str = "otp-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_MONITOR_INTERVAL_SECONDS: &str = "monitor-interval-seconds";
pub const ARG_MAX_LOGIN_FAILURES: &str = "max-login-failures";
pub const ARG_RESET_LOCKOUT_SECONDS: &str = "reset-lockout-seconds";
pub const ARG_FACTOR_POLICY: &str = "factor-policy";
pub const ARG_REQUIRE_DATA_CONSENT: &str = "require-data-consent";
pub const ARG_PENDING_TTL_SECONDS: &str = "pending-ttl-seconds";
pub const ARG_SWEEP_INTERVAL_SECONDS: &str = "sweep-interval-seconds";

#[must_use]
pub fn with_args(command: Command) -> Command {
    let command = with_engine_args(command);
    with_housekeeping_args(command)
}

fn with_engine_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_OTP_TTL_SECONDS)
                .long(ARG_OTP_TTL_SECONDS)
                .help("One-time code lifetime in seconds")
                .env("VIGILO_OTP_TTL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session lifetime in seconds")
                .env("VIGILO_SESSION_TTL_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MONITOR_INTERVAL_SECONDS)
                .long(ARG_MONITOR_INTERVAL_SECONDS)
                .help("Seconds between live face checks of a monitored session")
                .env("VIGILO_MONITOR_INTERVAL_SECONDS")
                .default_value("10")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
        .arg(
            Arg::new(ARG_MAX_LOGIN_FAILURES)
                .long(ARG_MAX_LOGIN_FAILURES)
                .help("Credential mismatches allowed before a login attempt is abandoned")
                .env("VIGILO_MAX_LOGIN_FAILURES")
                .default_value("5")
                .value_parser(clap::value_parser!(u32).range(1..)),
        )
        .arg(
            Arg::new(ARG_RESET_LOCKOUT_SECONDS)
                .long(ARG_RESET_LOCKOUT_SECONDS)
                .help("Seconds factor reset stays locked after repeated failed ownership checks")
                .env("VIGILO_RESET_LOCKOUT_SECONDS")
                .default_value("900")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_FACTOR_POLICY)
                .long(ARG_FACTOR_POLICY)
                .help("Which factor sets may activate an account")
                .env("VIGILO_FACTOR_POLICY")
                .default_value(FactorPolicy::AtLeastTwo.as_str())
                .value_parser([
                    FactorPolicy::AtLeastTwo.as_str(),
                    FactorPolicy::PinRequired.as_str(),
                ]),
        )
        .arg(
            Arg::new(ARG_REQUIRE_DATA_CONSENT)
                .long(ARG_REQUIRE_DATA_CONSENT)
                .help("Require consent to data consultation before activation")
                .env("VIGILO_REQUIRE_DATA_CONSENT")
                .default_value("true")
                .value_parser(clap::value_parser!(bool)),
        )
}

fn with_housekeeping_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_PENDING_TTL_SECONDS)
                .long(ARG_PENDING_TTL_SECONDS)
                .help("Drop unfinished registrations and login attempts after this many seconds")
                .env("VIGILO_PENDING_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_SWEEP_INTERVAL_SECONDS)
                .long(ARG_SWEEP_INTERVAL_SECONDS)
                .help("Seconds between sweeps of expired codes, sessions and attempts")
                .env("VIGILO_SWEEP_INTERVAL_SECONDS")
                .default_value("60")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub config: AuthConfig,
    pub pending_ttl_seconds: i64,
    pub sweep_interval: Duration,
}

impl Options {
    /// Build the engine configuration from parsed arguments.
    ///
    /// `collaborator_timeout` comes from the collaborator options.
    ///
    /// # Errors
    /// Returns an error if a value is missing or the factor policy is unknown.
    pub fn parse(matches: &ArgMatches, collaborator_timeout: Duration) -> Result<Self> {
        let otp_ttl = get::<i64>(matches, ARG_OTP_TTL_SECONDS)?;
        let session_ttl = get::<i64>(matches, ARG_SESSION_TTL_SECONDS)?;
        let monitor_interval = get::<u64>(matches, ARG_MONITOR_INTERVAL_SECONDS)?;
        let max_failures = get::<u32>(matches, ARG_MAX_LOGIN_FAILURES)?;
        let reset_lockout = get::<i64>(matches, ARG_RESET_LOCKOUT_SECONDS)?;
        let policy = matches
            .get_one::<String>(ARG_FACTOR_POLICY)
            .context("missing required argument: --factor-policy")?
            .parse::<FactorPolicy>()
            .map_err(|err| anyhow::anyhow!(err))?;
        let data_consent = get::<bool>(matches, ARG_REQUIRE_DATA_CONSENT)?;

        let config = AuthConfig::new()
            .with_otp_ttl_seconds(otp_ttl)
            .with_session_ttl_seconds(session_ttl)
            .with_monitor_interval(Duration::from_secs(monitor_interval))
            .with_collaborator_timeout(collaborator_timeout)
            .with_max_login_failures(max_failures)
            .with_reset_lockout_seconds(reset_lockout)
            .with_factor_policy(policy)
            .with_require_data_consent(data_consent);

        Ok(Self {
            config,
            pending_ttl_seconds: get::<i64>(matches, ARG_PENDING_TTL_SECONDS)?,
            sweep_interval: Duration::from_secs(get::<u64>(matches, ARG_SWEEP_INTERVAL_SECONDS)?),
        })
    }
}

fn get<T: Clone + Send + Sync + 'static>(matches: &ArgMatches, name: &str) -> Result<T> {
    matches
        .get_one::<T>(name)
        .cloned()
        .with_context(|| format!("missing required argument: --{name}"))
}
