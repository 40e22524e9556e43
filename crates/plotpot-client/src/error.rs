//! Client-side errors and their user-facing rendering.

use thiserror::Error;

use plotpot_types::BackendError;

use crate::validation::ValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClientError {
    /// Rejected before any request was made
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("User not logged in")]
    NotSignedIn,

    /// A single-row lookup by key matched nothing; carries the entity name
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error(transparent)]
    Backend(#[from] BackendError),

    /// A row came back that does not decode into the expected entity
    #[error("Malformed {0} row: {1}")]
    Decode(&'static str, String),
}

/// Categories the UI distinguishes when reporting a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AuthenticationRequired,
    AuthorizationDenied,
    NotFound,
    NetworkOrTimeout,
    Server,
    Unknown,
}

impl ClientError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ClientError::Validation(_) => ErrorKind::Validation,
            ClientError::NotSignedIn => ErrorKind::AuthenticationRequired,
            ClientError::NotFound(_) => ErrorKind::NotFound,
            ClientError::Decode(..) => ErrorKind::Unknown,
            ClientError::Backend(e) => match e {
                BackendError::Unauthenticated(_) => ErrorKind::AuthenticationRequired,
                BackendError::Forbidden(_) => ErrorKind::AuthorizationDenied,
                BackendError::NotFound(_) => ErrorKind::NotFound,
                BackendError::Network(_) | BackendError::Timeout => ErrorKind::NetworkOrTimeout,
                BackendError::Server(_) => ErrorKind::Server,
                BackendError::Conflict(_) | BackendError::Decode(_) => ErrorKind::Unknown,
                BackendError::Other(message) => classify_message(message),
            },
        }
    }

    /// The text published in `UiState::Error`.
    pub fn user_message(&self) -> String {
        match self.kind() {
            ErrorKind::Validation | ErrorKind::NotFound => self.to_string(),
            ErrorKind::AuthenticationRequired if matches!(self, ClientError::NotSignedIn) => self.to_string(),
            ErrorKind::AuthenticationRequired => "You are not logged in. Please sign in.".to_string(),
            ErrorKind::AuthorizationDenied => "You don't have permission to perform this action.".to_string(),
            ErrorKind::NetworkOrTimeout => "Network issue. Please try again later.".to_string(),
            ErrorKind::Server => "A server error occurred. Try again later.".to_string(),
            ErrorKind::Unknown => format!("An unexpected error occurred: {}", self.raw_message()),
        }
    }

    /// Underlying message without the category prefix.
    fn raw_message(&self) -> String {
        match self {
            ClientError::Backend(BackendError::Conflict(m) | BackendError::Other(m)) => m.clone(),
            other => other.to_string(),
        }
    }
}

/// Best-effort category for a backend failure only known as text.
///
/// Matches known substrings case-insensitively. This is a heuristic over
/// free-form messages and can misfile unusual wording as `Unknown`.
pub fn classify_message(message: &str) -> ErrorKind {
    let message = message.to_lowercase();
    let has = |needles: &[&str]| needles.iter().any(|n| message.contains(n));

    if has(&["unauthorized", "not logged in", "jwt expired", "invalid login"]) {
        ErrorKind::AuthenticationRequired
    } else if has(&["forbidden", "permission denied", "row-level security"]) {
        ErrorKind::AuthorizationDenied
    } else if has(&["timeout", "timed out", "unreachable"]) {
        ErrorKind::NetworkOrTimeout
    } else if has(&["internal server error"]) {
        ErrorKind::Server
    } else if has(&["not found"]) {
        ErrorKind::NotFound
    } else {
        ErrorKind::Unknown
    }
}
