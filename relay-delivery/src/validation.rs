//! Destination normalization and payload truncation applied at intake.

use std::sync::LazyLock;

use regex::Regex;

use crate::ValidationError;

/// Optional `+`, a non-zero leading digit, 7 to 15 digits in total.
#[allow(clippy::expect_used)]
static DESTINATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\+?[1-9][0-9]{6,14}$").expect("destination pattern is valid")
});

/// Remove the separators people type into phone numbers.
#[must_use]
pub fn strip_formatting(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && !matches!(c, '-' | '.' | '(' | ')'))
        .collect()
}

/// Normalize a destination and check it looks like a phone number.
pub fn normalize_destination(raw: &str) -> Result<String, ValidationError> {
    let normalized = strip_formatting(raw);

    if DESTINATION.is_match(&normalized) {
        Ok(normalized)
    } else {
        Err(ValidationError::InvalidDestination(raw.to_string()))
    }
}

/// Truncated payload plus the original text when truncation happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Truncated {
    pub payload: String,
    pub original: Option<String>,
}

/// Cut `payload` to at most `max_chars` characters.
pub fn truncate_payload(payload: &str, max_chars: usize) -> Result<Truncated, ValidationError> {
    if payload.trim().is_empty() {
        return Err(ValidationError::EmptyPayload);
    }

    match payload.char_indices().nth(max_chars) {
        Some((cut, _)) => Ok(Truncated {
            payload: payload[..cut].to_string(),
            original: Some(payload.to_string()),
        }),
        None => Ok(Truncated {
            payload: payload.to_string(),
            original: None,
        }),
    }
}
