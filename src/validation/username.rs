//! Username validation
//!
//! Usernames are opaque identifiers (often an email address). They must be
//! non-empty, at most 64 characters, and free of whitespace and control
//! characters.

use std::sync::LazyLock;

use regex::Regex;

use crate::passkey::PasskeyError;

pub const MAX_USERNAME_LENGTH: usize = 64;

static FORBIDDEN_CHARACTERS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\s\p{Cc}]").expect("username pattern compiles"));

/// Check a username taken from the request path
///
/// # Errors
///
/// Returns `PasskeyError::InvalidInput` describing the first broken rule
pub fn validate_username(username: &str) -> Result<(), PasskeyError> {
    if username.is_empty() {
        return Err(PasskeyError::InvalidInput("username is empty".to_string()));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(PasskeyError::InvalidInput(format!(
            "username exceeds {MAX_USERNAME_LENGTH} characters"
        )));
    }
    if FORBIDDEN_CHARACTERS.is_match(username) {
        return Err(PasskeyError::InvalidInput(
            "username contains whitespace or control characters".to_string(),
        ));
    }
    Ok(())
}

/// Display name shown by authenticators: the part before the first `@`
#[must_use]
pub fn display_name_for(username: &str) -> String {
    match username.split_once('@') {
        Some((local, _)) if !local.is_empty() => local.to_string(),
        _ => username.to_string(),
    }
}
