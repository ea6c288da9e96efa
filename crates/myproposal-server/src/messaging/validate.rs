//! Recipient address validation.

use std::sync::LazyLock;

use regex::Regex;

#[allow(clippy::expect_used)]
static EMAIL_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid")
});

#[allow(clippy::expect_used)]
static E164_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+[1-9]\d{7,14}$").expect("E.164 pattern is valid"));

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

/// `+` followed by 8 to 15 digits, no leading zero.
pub fn is_valid_e164(value: &str) -> bool {
    E164_RE.is_match(value)
}
