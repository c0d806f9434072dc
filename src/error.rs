//! Error types shared across the crate.
//!
//! Range parse failures never escape the coordinate model: they are logged and
//! treated as "no overlap". Everything else surfaces through [`AuditError`].

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while building a [`PackageCoordinate`](crate::model::PackageCoordinate)
/// or an [`InclusionPath`](crate::model::InclusionPath).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CoordinateError {
    #[error("package coordinate is missing its {0}")]
    MissingField(&'static str),

    #[error("invalid package coordinate '{0}'")]
    Malformed(String),

    #[error("an inclusion path must contain at least one package")]
    EmptyPath,
}

/// Failures of the persistent cache store.
#[derive(Debug, Error)]
pub enum CacheError {
    /// The store could not be opened; callers fall back to an in-memory cache.
    #[error("cache file {path} is unavailable: {reason}")]
    Unavailable { path: PathBuf, reason: String },

    /// A transactional commit failed; nothing from the batch was written.
    #[error("failed to commit {entries} cache entries to {path}: {reason}")]
    Write {
        path: PathBuf,
        entries: usize,
        reason: String,
    },

    #[error("failed to read cache file {path}: {reason}")]
    Read { path: PathBuf, reason: String },
}

/// Failures of the remote bulk lookup.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The remote service answered 429 Too Many Requests.
    #[error("too many requests (429): the vulnerability service is rate limiting this client")]
    RateLimited,

    #[error("vulnerability service returned {reason} ({code})")]
    Status { code: u16, reason: String },

    #[error("request to vulnerability service failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("could not decode vulnerability service response: {0}")]
    Decode(String),
}

/// Top-level error returned by the lookup service and the auditor.
#[derive(Debug, Error)]
pub enum AuditError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Coordinate(#[from] CoordinateError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("too many requests (429): configure OSS Index credentials for an increased rate limit")]
    RateLimitedWithoutCredentials,

    #[error("background cache task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
}

impl AuditError {
    /// Returns true when the remote service refused the request because of rate limiting.
    pub fn is_rate_limited(&self) -> bool {
        matches!(
            self,
            AuditError::Transport(TransportError::RateLimited)
                | AuditError::RateLimitedWithoutCredentials
        )
    }
}

pub type Result<T, E = AuditError> = std::result::Result<T, E>;
