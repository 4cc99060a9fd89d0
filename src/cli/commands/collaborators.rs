//! Endpoints of the external services the engine calls.
//!
//! Every URL is optional; without one the server falls back to the in-process
//! adapter (log the delivery, fail biometric checks closed, leave documents
//! pending).

use anyhow::{Context, Result};
use clap::{Arg, ArgMatches, Command};
use secrecy::SecretString;
use std::time::Duration;

pub const ARG_NOTIFIER_URL: &str = "notifier-url";
pub const ARG_MATCHER_URL: &str = "matcher-url";
pub const ARG_KYC_URL: &str = "kyc-url";
pub const ARG_COLLABORATOR_TOKEN: &str = "collaborator-token";
pub const ARG_COLLABORATOR_TIMEOUT_MS: &str = "collaborator-timeout-ms";

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_NOTIFIER_URL)
                .long(ARG_NOTIFIER_URL)
                .help("Delivery gateway for one-time codes (logs deliveries when unset)")
                .env("VIGILO_NOTIFIER_URL"),
        )
        .arg(
            Arg::new(ARG_MATCHER_URL)
                .long(ARG_MATCHER_URL)
                .help("Face matching service (biometric checks fail when unset)")
                .env("VIGILO_MATCHER_URL"),
        )
        .arg(
            Arg::new(ARG_KYC_URL)
                .long(ARG_KYC_URL)
                .help("Document verification service (documents stay pending when unset)")
                .env("VIGILO_KYC_URL"),
        )
        .arg(
            Arg::new(ARG_COLLABORATOR_TOKEN)
                .long(ARG_COLLABORATOR_TOKEN)
                .help("Bearer token sent to the collaborator services")
                .env("VIGILO_COLLABORATOR_TOKEN")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_COLLABORATOR_TIMEOUT_MS)
                .long(ARG_COLLABORATOR_TIMEOUT_MS)
                .help("Upper bound in milliseconds for any collaborator call")
                .env("VIGILO_COLLABORATOR_TIMEOUT_MS")
                .default_value("5000")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}

#[derive(Debug, Clone)]
pub struct Options {
    pub notifier_url: Option<String>,
    pub matcher_url: Option<String>,
    pub kyc_url: Option<String>,
    pub token: Option<SecretString>,
    pub timeout: Duration,
}

impl Options {
    /// # Errors
    /// Returns an error if the timeout is missing.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let timeout_ms = matches
            .get_one::<u64>(ARG_COLLABORATOR_TIMEOUT_MS)
            .copied()
            .context("missing required argument: --collaborator-timeout-ms")?;
        Ok(Self {
            notifier_url: matches.get_one::<String>(ARG_NOTIFIER_URL).cloned(),
            matcher_url: matches.get_one::<String>(ARG_MATCHER_URL).cloned(),
            kyc_url: matches.get_one::<String>(ARG_KYC_URL).cloned(),
            token: matches
                .get_one::<String>(ARG_COLLABORATOR_TOKEN)
                .cloned()
                .map(SecretString::from),
            timeout: Duration::from_millis(timeout_ms),
        })
    }
}
