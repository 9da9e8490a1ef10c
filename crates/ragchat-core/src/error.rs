use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read {}: {source}", .path.display())]
    LoadIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Snapshot at {} is corrupt or missing: {reason}", .path.display())]
    SnapshotCorruptOrMissing { path: PathBuf, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),

    #[error("Failed to persist snapshot to {}: {reason}", .path.display())]
    Persist { path: PathBuf, reason: String },

    #[error("An index rebuild is already in progress")]
    RebuildInProgress,

    #[error("Index is not ready")]
    NotReady,
}

impl Error {
    pub fn load_io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::LoadIo { path: path.into(), source }
    }

    pub fn corrupt(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::SnapshotCorruptOrMissing { path: path.into(), reason: reason.to_string() }
    }

    pub fn persist(path: impl Into<PathBuf>, reason: impl fmt::Display) -> Self {
        Self::Persist { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Failure talking to the embedding or chat model provider.
#[derive(Debug, Clone, Error)]
#[error("{kind} error from model provider: {message}")]
pub struct ProviderError {
    pub kind: ProviderErrorKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    Timeout,
    Auth,
    RateLimited,
    Unavailable,
    BadResponse,
    Transport,
}

impl ProviderError {
    pub fn new(kind: ProviderErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into() }
    }

    /// Timeouts, throttling and upstream outages may succeed on a later attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ProviderErrorKind::Timeout
                | ProviderErrorKind::RateLimited
                | ProviderErrorKind::Unavailable
                | ProviderErrorKind::Transport
        )
    }
}

impl fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Timeout => "timeout",
            Self::Auth => "authentication",
            Self::RateLimited => "rate limit",
            Self::Unavailable => "unavailable",
            Self::BadResponse => "bad response",
            Self::Transport => "transport",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_kinds() {
        assert!(ProviderError::new(ProviderErrorKind::Timeout, "slow").is_retryable());
        assert!(ProviderError::new(ProviderErrorKind::RateLimited, "429").is_retryable());
        assert!(!ProviderError::new(ProviderErrorKind::Auth, "401").is_retryable());
        assert!(!ProviderError::new(ProviderErrorKind::BadResponse, "junk").is_retryable());
    }

    #[test]
    fn provider_error_converts() {
        let err: Error = ProviderError::new(ProviderErrorKind::Timeout, "no reply in 60s").into();
        assert!(matches!(err, Error::Provider(_)));
        assert_eq!(err.to_string(), "timeout error from model provider: no reply in 60s");
    }
}
