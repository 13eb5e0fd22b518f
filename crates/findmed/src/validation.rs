//! Request input checks.

use regex::Regex;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum InputError {
    #[error("phone number must be exactly 10 digits")]
    Phone,
    #[error("email address is not valid")]
    Email,
    #[error("no selfie provided")]
    MissingSelfie,
    #[error("selfie image could not be read: {0}")]
    UnreadableSelfie(String),
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[0-9]{10}$").expect("static regex"))
}

fn email_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    // Every domain label must be non-empty.
    PATTERN.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s.]+(\.[^@\s.]+)+$").expect("static regex"))
}

/// Accept exactly ten ASCII digits, ignoring surrounding whitespace.
pub fn validate_phone(phone: &str) -> Result<&str, InputError> {
    let phone = phone.trim();
    if phone_pattern().is_match(phone) {
        Ok(phone)
    } else {
        Err(InputError::Phone)
    }
}

pub fn validate_email(email: &str) -> Result<&str, InputError> {
    let email = email.trim();
    if email_pattern().is_match(email) {
        Ok(email)
    } else {
        Err(InputError::Email)
    }
}
