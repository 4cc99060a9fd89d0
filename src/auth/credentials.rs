//! Enrolled authentication factors and the policy deciding which sets may activate an account.

use crate::{
    collaborators::FaceReferenceId,
    error::AuthError,
    geofence::GeofenceArea,
    identity::{validate_password, validate_pin, ValidationErrors},
};
use argon2::{password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier};
use rand::rngs::OsRng;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use tracing::error;
use utoipa::ToSchema;

pub const MIN_ENABLED_FACTORS: usize = 2;

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Factor {
    Password,
    Pin,
    Face,
    Biometric,
    Geofence,
}

/// Which credential sets may activate (or keep) an account.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub enum FactorPolicy {
    /// Any two enabled factors.
    #[default]
    AtLeastTwo,
    /// Two enabled factors, one of which must be the PIN.
    PinRequired,
}

impl FactorPolicy {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AtLeastTwo => "at-least-two",
            Self::PinRequired => "pin-required",
        }
    }

    /// # Errors
    /// `InsufficientFactors` when the set does not satisfy the policy.
    pub fn check(self, credentials: &CredentialSet) -> Result<(), AuthError> {
        let enabled = credentials.enabled_factors();
        if enabled.len() < MIN_ENABLED_FACTORS {
            return Err(AuthError::InsufficientFactors(format!(
                "{} enabled, at least {MIN_ENABLED_FACTORS} required",
                enabled.len()
            )));
        }
        if self == Self::PinRequired && !enabled.contains(&Factor::Pin) {
            return Err(AuthError::InsufficientFactors(
                "a PIN is required".to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Display for FactorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for FactorPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "at-least-two" => Ok(Self::AtLeastTwo),
            "pin-required" => Ok(Self::PinRequired),
            other => Err(format!("unknown factor policy: {other}")),
        }
    }
}

/// Stored factors of an account. Secrets are Argon2id PHC strings.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct CredentialSet {
    pub password_hash: Option<String>,
    pub pin_hash: Option<String>,
    pub face_reference: Option<FaceReferenceId>,
    pub biometric_enabled: bool,
    pub geofence: Option<GeofenceArea>,
}

impl CredentialSet {
    #[must_use]
    pub fn enabled_factors(&self) -> Vec<Factor> {
        let mut factors = Vec::with_capacity(5);
        if self.password_hash.is_some() {
            factors.push(Factor::Password);
        }
        if self.pin_hash.is_some() {
            factors.push(Factor::Pin);
        }
        if self.face_reference.is_some() {
            factors.push(Factor::Face);
        }
        if self.biometric_enabled {
            factors.push(Factor::Biometric);
        }
        if self.geofence.is_some() {
            factors.push(Factor::Geofence);
        }
        factors
    }

    #[must_use]
    pub fn has_pin(&self) -> bool {
        self.pin_hash.is_some()
    }

    /// Continuous monitoring needs an enrolled face to compare against.
    #[must_use]
    pub fn monitors_session(&self) -> bool {
        self.face_reference.is_some()
    }

    #[must_use]
    pub fn verify_password(&self, password: &str) -> bool {
        self.password_hash
            .as_deref()
            .is_some_and(|hash| verify_secret(password, hash))
    }

    #[must_use]
    pub fn verify_pin(&self, pin: &str) -> bool {
        self.pin_hash
            .as_deref()
            .is_some_and(|hash| verify_secret(pin, hash))
    }
}

/// Factors chosen by the user during onboarding or a factor reset.
#[derive(Clone, Debug, Default)]
pub struct FactorSelection {
    pub password: Option<SecretString>,
    pub pin: Option<SecretString>,
    pub face_reference: Option<FaceReferenceId>,
    pub biometric: bool,
    pub geofence: Option<GeofenceArea>,
}

impl FactorSelection {
    /// Validate the selection, enforce `policy`, then hash the secrets.
    ///
    /// The policy is checked before hashing so a rejected selection costs no
    /// key derivation.
    ///
    /// # Errors
    /// `Validation` for malformed factors, `InsufficientFactors` when the
    /// policy is not met.
    pub fn into_credentials(self, policy: FactorPolicy) -> Result<CredentialSet, AuthError> {
        let mut errors = ValidationErrors::new();

        if let Some(password) = &self.password {
            if !validate_password(password.expose_secret()) {
                errors.push(
                    "password",
                    "Password needs 8+ characters with upper case, lower case and a digit",
                );
            }
        }
        if let Some(pin) = &self.pin {
            if !validate_pin(pin.expose_secret()) {
                errors.push("pin", "PIN must be 4 to 12 digits");
            }
        }
        if let Some(face) = &self.face_reference {
            if face.0.trim().is_empty() {
                errors.push("face_reference", "Face reference is required");
            }
        }
        if self.biometric && self.face_reference.is_none() {
            errors.push("biometric", "Biometric login requires an enrolled face");
        }
        if let Some(area) = &self.geofence {
            if let Err(err) = area.validate() {
                errors.push("geofence", &err.to_string());
            }
        }
        errors.into_result()?;

        let placeholder = || Some(String::new());
        policy.check(&CredentialSet {
            password_hash: self.password.as_ref().and_then(|_| placeholder()),
            pin_hash: self.pin.as_ref().and_then(|_| placeholder()),
            face_reference: self.face_reference.clone(),
            biometric_enabled: self.biometric,
            geofence: self.geofence,
        })?;

        Ok(CredentialSet {
            password_hash: self
                .password
                .map(|password| hash_secret(password.expose_secret()))
                .transpose()?,
            pin_hash: self
                .pin
                .map(|pin| hash_secret(pin.expose_secret()))
                .transpose()?,
            face_reference: self.face_reference,
            biometric_enabled: self.biometric,
            geofence: self.geofence,
        })
    }
}

/// One-way Argon2id hash of a password or PIN.
///
/// # Errors
/// Returns an error if the hasher rejects its input.
pub fn hash_secret(secret: &str) -> Result<String, AuthError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(secret.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|err| AuthError::Invariant(format!("failed to hash secret: {err}")))
}

/// Check a secret against a stored PHC string. Unparseable hashes never verify.
#[must_use]
pub fn verify_secret(secret: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(secret.as_bytes(), &parsed)
            .is_ok(),
        Err(err) => {
            error!("Stored credential hash is unreadable: {err}");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geofence::Position;

    fn secret(value: &str) -> Option<SecretString> {
        Some(SecretString::from(value.to_string()))
    }

    #[test]
    fn hash_and_verify_round_trip() -> Result<(), AuthError> {
        let hash = hash_secret("Str0ngpass")?;
        assert!(hash.starts_with("$argon2id$"));
        assert!(verify_secret("Str0ngpass", &hash));
        assert!(!verify_secret("Str0ngpasS", &hash));
        assert!(!verify_secret("Str0ngpass", "not-a-phc-string"));
        Ok(())
    }

    #[test]
    fn single_factor_is_insufficient() {
        let selection = FactorSelection {
            password: secret("Str0ngpass"),
            ..FactorSelection::default()
        };
        let result = selection.into_credentials(FactorPolicy::AtLeastTwo);
        assert!(matches!(result, Err(AuthError::InsufficientFactors(_))));
    }

    #[test]
    fn password_and_pin_activate_under_both_policies() -> Result<(), AuthError> {
        for policy in [FactorPolicy::AtLeastTwo, FactorPolicy::PinRequired] {
            let credentials = FactorSelection {
                password: secret("Str0ngpass"),
                pin: secret("4321"),
                ..FactorSelection::default()
            }
            .into_credentials(policy)?;
            assert_eq!(
                credentials.enabled_factors(),
                vec![Factor::Password, Factor::Pin]
            );
            assert!(credentials.verify_password("Str0ngpass"));
            assert!(credentials.verify_pin("4321"));
            assert!(!credentials.verify_pin("1234"));
        }
        Ok(())
    }

    #[test]
    fn pin_required_policy_rejects_sets_without_pin() {
        let selection = FactorSelection {
            password: secret("Str0ngpass"),
            geofence: Some(GeofenceArea {
                center: Position::new(-23.55, -46.63),
                radius_meters: 500.0,
            }),
            ..FactorSelection::default()
        };
        assert!(selection
            .clone()
            .into_credentials(FactorPolicy::AtLeastTwo)
            .is_ok());
        assert!(matches!(
            selection.into_credentials(FactorPolicy::PinRequired),
            Err(AuthError::InsufficientFactors(_))
        ));
    }

    #[test]
    fn malformed_factors_are_reported_per_field() {
        let selection = FactorSelection {
            password: secret("weak"),
            pin: secret("12a4"),
            biometric: true,
            geofence: Some(GeofenceArea {
                center: Position::new(91.0, 0.0),
                radius_meters: 10.0,
            }),
            ..FactorSelection::default()
        };
        match selection.into_credentials(FactorPolicy::AtLeastTwo) {
            Err(AuthError::Validation(errors)) => {
                for field in ["password", "pin", "biometric", "geofence"] {
                    assert!(errors.has_field(field), "missing {field}");
                }
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[test]
    fn face_and_biometric_count_as_two_factors() -> Result<(), AuthError> {
        let credentials = FactorSelection {
            face_reference: Some(FaceReferenceId("face-1".to_string())),
            biometric: true,
            ..FactorSelection::default()
        }
        .into_credentials(FactorPolicy::AtLeastTwo)?;
        assert!(credentials.monitors_session());
        assert!(!credentials.has_pin());
        assert!(!credentials.verify_password("anything"));
        Ok(())
    }

    #[test]
    fn policy_parses_from_cli_values() {
        assert_eq!("pin-required".parse(), Ok(FactorPolicy::PinRequired));
        assert_eq!("at-least-two".parse(), Ok(FactorPolicy::AtLeastTwo));
        assert!("three".parse::<FactorPolicy>().is_err());
        assert_eq!(FactorPolicy::default().to_string(), "at-least-two");
    }
}
