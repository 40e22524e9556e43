//! Mapping of HTTP failures onto [`BackendError`].
//!
//! PostgREST and the auth service both return JSON error bodies; the status
//! code plus the body's error code decide the category.

use plotpot_types::BackendError;
use serde_json::Value;

/// Error code and human message extracted from an error body.
#[derive(Debug, Default, PartialEq)]
pub struct ErrorBody {
    pub code: Option<String>,
    pub message: String,
}

impl ErrorBody {
    pub fn parse(body: &str) -> Self {
        let Ok(Value::Object(map)) = serde_json::from_str::<Value>(body) else {
            return Self {
                code: None,
                message: body.trim().to_string(),
            };
        };

        let text = |keys: &[&str]| {
            keys.iter()
                .find_map(|k| map.get(*k).and_then(Value::as_str))
                .map(str::to_string)
        };

        Self {
            code: text(&["code", "error_code", "error"]),
            message: text(&["message", "msg", "error_description", "error"])
                .unwrap_or_else(|| body.trim().to_string()),
        }
    }
}

pub fn from_status(status: u16, body: ErrorBody) -> BackendError {
    let ErrorBody { code, message } = body;
    let code = code.as_deref();

    match (status, code) {
        (_, Some("invalid_grant" | "invalid_credentials")) => BackendError::Unauthenticated(message),
        (401, _) | (_, Some("PGRST301" | "PGRST302")) => BackendError::Unauthenticated(message),
        (403, _) | (_, Some("42501")) => BackendError::Forbidden(message),
        (404, _) | (_, Some("PGRST116")) => BackendError::NotFound(message),
        (409, _) | (_, Some("23505" | "23503" | "user_already_exists" | "email_exists")) => {
            BackendError::Conflict(message)
        }
        (408 | 504, _) => BackendError::Timeout,
        (500..=599, _) => BackendError::Server(message),
        _ => BackendError::Other(message),
    }
}

pub fn from_transport(e: reqwest::Error) -> BackendError {
    if e.is_timeout() {
        BackendError::Timeout
    } else if e.is_connect() {
        BackendError::Network(e.to_string())
    } else if e.is_decode() {
        BackendError::Decode(e.to_string())
    } else {
        BackendError::Other(e.to_string())
    }
}
