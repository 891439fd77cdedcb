//! Field rules shared by the account and directory services.
//!
//! Validators return the cleaned value or a user-facing message; each service
//! wraps the message in its own error type.

use regex::Regex;
use std::sync::OnceLock;

use super::normalize_email;
use crate::config::SecurityConfig;
use crate::constants::limits::{GROUP_NAME_MAX_LENGTH, NAME_MAX_LENGTH};

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("Invalid regex"))
}

fn permission_key_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9][a-z0-9_.\-]{0,63}$").expect("Invalid regex"))
}

/// Returns the normalized address.
pub fn email(raw: &str) -> Result<String, String> {
    let email = normalize_email(raw);
    if email.is_empty() {
        return Err("The email field is required".to_string());
    }
    if email.len() > 254 || !email_regex().is_match(&email) {
        return Err("The email must be a valid email address".to_string());
    }
    Ok(email)
}

/// Returns the trimmed name.
pub fn name(label: &str, raw: &str, min_chars: usize) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err(format!("The {label} field is required"));
    }

    let chars = value.chars().count();
    if chars < min_chars {
        return Err(format!("The {label} must be at least {min_chars} characters"));
    }
    if chars > NAME_MAX_LENGTH {
        return Err(format!(
            "The {label} may not be greater than {NAME_MAX_LENGTH} characters"
        ));
    }
    Ok(value.to_string())
}

pub fn password_confirmation(password: &str, confirmation: &str) -> Result<(), String> {
    if password != confirmation {
        return Err("The password confirmation does not match".to_string());
    }
    Ok(())
}

/// Length policy. A failure here is a weak password, not malformed input.
pub fn password_strength(password: &str, config: &SecurityConfig) -> Result<(), String> {
    let len = password.chars().count();
    if len < config.password_min_length {
        return Err(format!(
            "The password must be at least {} characters",
            config.password_min_length
        ));
    }
    if len > config.password_max_length {
        return Err(format!(
            "The password may not be greater than {} characters",
            config.password_max_length
        ));
    }
    Ok(())
}

pub fn group_name(raw: &str) -> Result<String, String> {
    let value = raw.trim();
    if value.is_empty() {
        return Err("The group name is required".to_string());
    }
    if value.chars().count() > GROUP_NAME_MAX_LENGTH {
        return Err(format!(
            "The group name may not be greater than {GROUP_NAME_MAX_LENGTH} characters"
        ));
    }
    Ok(value.to_string())
}

pub fn permission_key(raw: &str) -> Result<String, String> {
    let key = raw.trim().to_lowercase();
    if !permission_key_regex().is_match(&key) {
        return Err(format!("Invalid permission key: {raw:?}"));
    }
    Ok(key)
}
