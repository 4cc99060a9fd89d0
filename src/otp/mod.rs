//! One-time code challenges: issue, deliver, verify, expire.
//!
//! At most one live challenge exists per (subject, purpose). Issuing a new
//! code replaces the previous one, a successful verification consumes it, and
//! an expired challenge is purged the first time it is looked at.

pub mod models;
pub mod service;

pub use models::{Channel, Delivery, OtpChallenge, OtpIssued, OtpPurpose, VerifyResult};
pub use service::OtpManager;
