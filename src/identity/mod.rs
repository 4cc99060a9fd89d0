//! Stateless identity checks used by onboarding and factor configuration.
//!
//! Every check returns `false` (or a structured [`ValidationErrors`]) for
//! malformed input.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::ToSchema;

const GOVERNMENT_ID_LEN: usize = 11;
const MIN_PASSWORD_LEN: usize = 8;
const MIN_PIN_LEN: usize = 4;
const MAX_PIN_LEN: usize = 12;
const MAX_FULL_NAME_LEN: usize = 200;

/// Keep only ASCII digits.
#[must_use]
pub fn digits_only(value: &str) -> String {
    value.chars().filter(char::is_ascii_digit).collect()
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Validate an 11-digit government ID with its two modulo-11 check digits.
#[must_use]
pub fn validate_government_id(id: &str) -> bool {
    let digits: Vec<u32> = id.chars().filter_map(|c| c.to_digit(10)).collect();
    if digits.len() != GOVERNMENT_ID_LEN {
        return false;
    }
    if digits.iter().all(|&d| d == digits[0]) {
        return false;
    }

    check_digit(&digits[..9]) == digits[9] && check_digit(&digits[..10]) == digits[10]
}

/// Weighted modulo-11 check digit; weights run from `len + 1` down to 2.
fn check_digit(digits: &[u32]) -> u32 {
    let top = u32::try_from(digits.len()).unwrap_or(0) + 1;
    let sum: u32 = digits
        .iter()
        .zip((2..=top).rev())
        .map(|(digit, weight)| digit * weight)
        .sum();
    let remainder = sum % 11;
    if remainder < 2 {
        0
    } else {
        11 - remainder
    }
}

/// Basic email shape: one `@`, non-empty local part, dotted domain, no whitespace.
#[must_use]
pub fn validate_email(email: &str) -> bool {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").is_ok_and(|regex| regex.is_match(email))
}

/// Phone numbers carry 10 or 11 digits once punctuation is stripped.
#[must_use]
pub fn validate_phone(phone: &str) -> bool {
    matches!(digits_only(phone).len(), 10 | 11)
}

#[must_use]
pub fn validate_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
        && password.chars().any(|c| c.is_ascii_lowercase())
        && password.chars().any(|c| c.is_ascii_uppercase())
        && password.chars().any(|c| c.is_ascii_digit())
}

#[must_use]
pub fn validate_pin(pin: &str) -> bool {
    (MIN_PIN_LEN..=MAX_PIN_LEN).contains(&pin.len()) && pin.chars().all(|c| c.is_ascii_digit())
}

/// One rejected input field.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Per-field validation failures, reported together so a client can re-prompt once.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ValidationErrors {
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: &str, message: &str) -> Self {
        let mut errors = Self::new();
        errors.push(field, message);
        errors
    }

    pub fn push(&mut self, field: &str, message: &str) {
        self.errors.push(FieldError {
            field: field.to_string(),
            message: message.to_string(),
        });
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    #[must_use]
    pub fn has_field(&self, field: &str) -> bool {
        self.errors.iter().any(|error| error.field == field)
    }

    /// `Ok(())` when nothing was pushed.
    ///
    /// # Errors
    /// Returns `self` when at least one field was rejected.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields: Vec<String> = self
            .errors
            .iter()
            .map(|error| format!("{}: {}", error.field, error.message))
            .collect();
        write!(f, "{}", fields.join("; "))
    }
}

/// Raw onboarding identity as typed by the user.
#[derive(Clone, Debug, Serialize, Deserialize, ToSchema)]
pub struct IdentityInfo {
    pub full_name: String,
    pub government_id: String,
    pub email: String,
    pub phone: String,
}

/// Identity fields after validation, in the form used as storage keys.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NormalizedIdentity {
    pub full_name: String,
    pub government_id: String,
    pub email: String,
    pub phone: String,
}

impl IdentityInfo {
    /// Validate every field and return the normalized identity.
    ///
    /// # Errors
    /// Returns one [`FieldError`] per rejected field.
    pub fn validate(&self) -> Result<NormalizedIdentity, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        let full_name = self.full_name.trim();
        if full_name.is_empty() || full_name.chars().count() > MAX_FULL_NAME_LEN {
            errors.push("full_name", "Full name is required");
        }
        if !validate_government_id(&self.government_id) {
            errors.push("government_id", "Invalid government ID");
        }
        let email = normalize_email(&self.email);
        if !validate_email(&email) {
            errors.push("email", "Invalid email address");
        }
        if !validate_phone(&self.phone) {
            errors.push("phone", "Phone must have 10 or 11 digits");
        }

        errors.into_result()?;

        Ok(NormalizedIdentity {
            full_name: full_name.to_string(),
            government_id: digits_only(&self.government_id),
            email,
            phone: digits_only(&self.phone),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a valid ID from nine leading digits.
    fn with_check_digits(base: &[u32; 9]) -> String {
        let mut digits = base.to_vec();
        digits.push(check_digit(&digits));
        digits.push(check_digit(&digits));
        digits.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn government_id_accepts_known_valid_numbers() {
        assert!(validate_government_id("52998224725"));
        assert!(validate_government_id("529.982.247-25"));
        assert!(validate_government_id("11144477735"));
    }

    #[test]
    fn government_id_rejects_wrong_check_digits() {
        assert!(!validate_government_id("52998224726"));
        assert!(!validate_government_id("52998224715"));
        assert!(!validate_government_id("11144477734"));
    }

    #[test]
    fn government_id_rejects_repeated_digits() {
        for digit in 0..=9 {
            let id = digit.to_string().repeat(11);
            assert!(!validate_government_id(&id), "{id} must be rejected");
        }
    }

    #[test]
    fn government_id_rejects_wrong_length() {
        assert!(!validate_government_id(""));
        assert!(!validate_government_id("5299822472"));
        assert!(!validate_government_id("529982247250"));
        assert!(!validate_government_id("not a number"));
    }

    #[test]
    fn government_id_accepts_iff_check_digits_match() {
        let bases = [
            [1, 2, 3, 4, 5, 6, 7, 8, 9],
            [9, 8, 7, 6, 5, 4, 3, 2, 1],
            [0, 0, 0, 0, 0, 0, 0, 0, 1],
            [3, 1, 4, 1, 5, 9, 2, 6, 5],
        ];
        for base in &bases {
            let valid = with_check_digits(base);
            assert!(validate_government_id(&valid), "{valid}");

            let mut tampered: Vec<char> = valid.chars().collect();
            let last = tampered[10].to_digit(10).unwrap_or(0);
            tampered[10] = char::from_digit((last + 1) % 10, 10).unwrap_or('0');
            let tampered: String = tampered.into_iter().collect();
            assert!(!validate_government_id(&tampered), "{tampered}");
        }
    }

    #[test]
    fn check_digit_maps_small_remainders_to_zero() {
        // the last position weighs 2: sum 2, remainder 2, digit 9
        assert_eq!(check_digit(&[0; 9]), 0);
        assert_eq!(check_digit(&[0, 0, 0, 0, 0, 0, 0, 0, 1]), 9);
    }

    #[test]
    fn email_shape() {
        assert!(validate_email("a@example.com"));
        assert!(validate_email("first.last@sub.example.org"));
        assert!(!validate_email("not-an-email"));
        assert!(!validate_email("@example.com"));
        assert!(!validate_email("a@"));
        assert!(!validate_email("a@localhost"));
        assert!(!validate_email("a@b@example.com"));
        assert!(!validate_email("a b@example.com"));
    }

    #[test]
    fn phone_digit_count() {
        assert!(validate_phone("(11) 98765-4321"));
        assert!(validate_phone("1187654321"));
        assert!(!validate_phone("123456789"));
        assert!(!validate_phone("+55 11 98765-4321"));
    }

    #[test]
    fn password_strength() {
        assert!(validate_password("Sup3rSecret"));
        assert!(!validate_password("Sh0rt"));
        assert!(!validate_password("alllowercase1"));
        assert!(!validate_password("ALLUPPERCASE1"));
        assert!(!validate_password("NoDigitsHere"));
    }

    #[test]
    fn pin_shape() {
        assert!(validate_pin("1234"));
        assert!(validate_pin("987654"));
        assert!(!validate_pin("123"));
        assert!(!validate_pin("12a4"));
        assert!(!validate_pin("1234567890123"));
    }

    #[test]
    fn identity_validation_reports_every_bad_field() {
        let info = IdentityInfo {
            full_name: "  ".to_string(),
            government_id: "11111111111".to_string(),
            email: "nope".to_string(),
            phone: "123".to_string(),
        };
        let Err(errors) = info.validate() else {
            panic!("expected validation errors");
        };
        assert_eq!(errors.errors.len(), 4);
        for field in ["full_name", "government_id", "email", "phone"] {
            assert!(errors.has_field(field), "missing {field}");
        }
    }

    #[test]
    fn identity_validation_normalizes_keys() {
        let info = IdentityInfo {
            full_name: " Ana Souza ".to_string(),
            government_id: "529.982.247-25".to_string(),
            email: " Ana@Example.COM ".to_string(),
            phone: "(11) 98765-4321".to_string(),
        };
        let normalized = info.validate().expect("valid identity");
        assert_eq!(normalized.full_name, "Ana Souza");
        assert_eq!(normalized.government_id, "52998224725");
        assert_eq!(normalized.email, "ana@example.com");
        assert_eq!(normalized.phone, "11987654321");
    }
}
