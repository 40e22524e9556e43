//! Pre-flight input checks. Pure functions; a failure means no request is sent.

use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use regex::Regex;
use thiserror::Error;

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_USERNAME_LEN: usize = 32;
pub const MAX_SENTENCE_LEN: usize = 280;
pub const MAX_DESCRIPTION_LEN: usize = 1000;
pub const MAX_BIO_LEN: usize = 500;

static EMAIL_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}$").expect("email pattern is valid")
});

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} cannot be empty")]
    Blank(&'static str),

    #[error("Invalid email format")]
    InvalidEmail,

    #[error("Password must be at least {} characters", MIN_PASSWORD_LEN)]
    PasswordTooShort,

    #[error("{field} must be at most {max} characters")]
    TooLong { field: &'static str, max: usize },

    #[error("Total sentences must be greater than zero")]
    NoSentences,

    #[error("Challenge must end after it starts")]
    EndsBeforeStart,

    #[error("Nothing to update")]
    NoChanges,
}

pub type Result = std::result::Result<(), ValidationError>;

fn not_blank(field: &'static str, value: &str) -> Result {
    if value.trim().is_empty() {
        return Err(ValidationError::Blank(field));
    }
    Ok(())
}

/// Length in characters, not bytes.
fn at_most(field: &'static str, value: &str, max: usize) -> Result {
    if value.chars().count() > max {
        return Err(ValidationError::TooLong { field, max });
    }
    Ok(())
}

pub fn email(value: &str) -> Result {
    not_blank("Email", value)?;
    if !EMAIL_PATTERN.is_match(value.trim()) {
        return Err(ValidationError::InvalidEmail);
    }
    Ok(())
}

/// Password rules for new accounts.
pub fn new_password(value: &str) -> Result {
    not_blank("Password", value)?;
    if value.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::PasswordTooShort);
    }
    Ok(())
}

/// Sign-in only rejects a missing password; the backend judges the rest.
pub fn password(value: &str) -> Result {
    not_blank("Password", value)
}

pub fn username(value: &str) -> Result {
    not_blank("Username", value)?;
    at_most("Username", value.trim(), MAX_USERNAME_LEN)
}

pub fn title(value: &str) -> Result {
    not_blank("Title", value)
}

pub fn sentence(value: &str) -> Result {
    not_blank("Sentence", value)?;
    at_most("Sentence", value, MAX_SENTENCE_LEN)
}

pub fn description(value: Option<&str>) -> Result {
    match value {
        Some(text) => at_most("Description", text, MAX_DESCRIPTION_LEN),
        None => Ok(()),
    }
}

pub fn bio(value: Option<&str>) -> Result {
    match value {
        Some(text) => at_most("Bio", text, MAX_BIO_LEN),
        None => Ok(()),
    }
}

pub fn total_sentences(value: i32) -> Result {
    if value <= 0 {
        return Err(ValidationError::NoSentences);
    }
    Ok(())
}

pub fn plot_twist_option(value: &str) -> Result {
    not_blank("Plot twist option", value)
}

pub fn video_url(value: &str) -> Result {
    not_blank("Video URL", value)
}

pub fn challenge_window(start: DateTime<Utc>, end: DateTime<Utc>) -> Result {
    if end <= start {
        return Err(ValidationError::EndsBeforeStart);
    }
    Ok(())
}
