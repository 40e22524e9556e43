//! Environment-driven client configuration.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_DB_PATH: &str = "plotpot.db";
pub const DEFAULT_JWT_SECRET: &str = "dev-secret-change-me";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// Embedded SQLite store
    Local,
    /// Hosted PostgREST + auth service
    Rest,
}

/// Connection details for the hosted service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestConfig {
    pub url: String,
    pub api_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub backend: BackendKind,
    /// Present whenever `backend` is `Rest`
    pub rest: Option<RestConfig>,
    pub db_path: PathBuf,
    pub jwt_secret: String,
    pub timeout: Duration,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("PLOTPOT_BACKEND must be \"local\" or \"rest\", got {0:?}")]
    UnknownBackend(String),

    #[error("{0} is required for the rest backend")]
    Missing(&'static str),

    #[error("PLOTPOT_TIMEOUT_SECS must be a positive number of seconds, got {0:?}")]
    InvalidTimeout(String),
}

impl ClientConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key/value source. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let backend = match var("PLOTPOT_BACKEND").as_deref().map(str::trim) {
            None | Some("local") => BackendKind::Local,
            Some("rest") => BackendKind::Rest,
            Some(other) => return Err(ConfigError::UnknownBackend(other.to_string())),
        };

        let rest = match backend {
            BackendKind::Rest => Some(RestConfig {
                url: var("PLOTPOT_SUPABASE_URL").ok_or(ConfigError::Missing("PLOTPOT_SUPABASE_URL"))?,
                api_key: var("PLOTPOT_SUPABASE_KEY").ok_or(ConfigError::Missing("PLOTPOT_SUPABASE_KEY"))?,
            }),
            BackendKind::Local => None,
        };

        let timeout = match var("PLOTPOT_TIMEOUT_SECS") {
            None => DEFAULT_TIMEOUT_SECS,
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => secs,
                _ => return Err(ConfigError::InvalidTimeout(raw)),
            },
        };

        Ok(Self {
            backend,
            rest,
            db_path: PathBuf::from(var("PLOTPOT_DB_PATH").unwrap_or_else(|| DEFAULT_DB_PATH.into())),
            jwt_secret: var("PLOTPOT_JWT_SECRET").unwrap_or_else(|| DEFAULT_JWT_SECRET.into()),
            timeout: Duration::from_secs(timeout),
        })
    }
}
