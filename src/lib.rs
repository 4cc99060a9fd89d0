//! # Vigilo (Multi-Factor Authentication & Session Integrity)
//!
//! `vigilo` onboards users through an ordered pipeline, logs them in with a
//! step plan built from the factors each account enrolled, and keeps the
//! resulting sessions honest.
//!
//! ## Onboarding
//!
//! Identity fields are validated and normalized, a one-time code confirms the
//! contact, document handles go to a verifier, and the chosen factors must
//! satisfy the configured [`auth::FactorPolicy`]. Activation claims the
//! government ID and email atomically, so two concurrent registrations of the
//! same identity cannot both succeed.
//!
//! ## Login
//!
//! Password or one-time code first, then biometric, geofence and PIN as
//! enrolled. Failed factors keep the attempt at its step until the retry
//! budget is spent.
//!
//! ## Sessions
//!
//! Tokens are random, stored only as SHA-256 hashes, and end exactly once.
//! Accounts with an enrolled face get a background monitor that compares live
//! samples to the reference and forces a logout on mismatch.

pub mod api;
pub mod auth;
pub mod cli;
pub mod clock;
pub mod collaborators;
pub mod error;
pub mod geofence;
pub mod identity;
pub mod otp;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
