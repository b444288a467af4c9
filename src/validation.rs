// Validation utilities module
// Custom field validators used by the request DTOs

use regex::Regex;
use std::sync::OnceLock;
use validator::ValidationError;

use crate::auth::password::check_password_complexity;

fn username_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_.-]+$").expect("valid username regex"))
}

fn person_name_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-ZÀ-ÿ\s'-]+$").expect("valid name regex"))
}

fn phone_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\+?[1-9]\d{1,14}$").expect("valid phone regex"))
}

/// Usernames may contain letters, digits, dots, hyphens, and underscores
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username_pattern().is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username"))
    }
}

/// Passwords need a lowercase letter, an uppercase letter, a digit, and one of `@$!%*?&`
pub fn validate_password_complexity(password: &str) -> Result<(), ValidationError> {
    check_password_complexity(password).map_err(|_| ValidationError::new("weak_password"))
}

/// First and last names: letters, spaces, hyphens, apostrophes
pub fn validate_person_name(name: &str) -> Result<(), ValidationError> {
    if person_name_pattern().is_match(name) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_name"))
    }
}

/// Optional phone numbers; blank values are accepted as absent
pub fn validate_phone_number(phone: &str) -> Result<(), ValidationError> {
    if phone.trim().is_empty() || phone_pattern().is_match(phone) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_phone_number"))
    }
}
