use std::fmt::{Display, Formatter};
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::resolver::SourceAttempt;

/// Fetch-level error classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchErrorKind {
    Timeout,
    Connection,
    RateLimited,
    InvalidResponse,
    Internal,
}

/// Structured error returned by caller-supplied fetch operations.
///
/// Only [`FetchErrorKind::Timeout`] and [`FetchErrorKind::Connection`] are
/// transient; every other kind propagates through a retry policy on first
/// occurrence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchError {
    kind: FetchErrorKind,
    message: String,
}

impl FetchError {
    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Timeout, message)
    }

    pub fn connection(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Connection, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::RateLimited, message)
    }

    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::InvalidResponse, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(FetchErrorKind::Internal, message)
    }

    fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub const fn kind(&self) -> FetchErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Whether this is a transient network error worth retrying.
    pub const fn is_transient(&self) -> bool {
        matches!(
            self.kind,
            FetchErrorKind::Timeout | FetchErrorKind::Connection
        )
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            FetchErrorKind::Timeout => "fetch.timeout",
            FetchErrorKind::Connection => "fetch.connection",
            FetchErrorKind::RateLimited => "fetch.rate_limited",
            FetchErrorKind::InvalidResponse => "fetch.invalid_response",
            FetchErrorKind::Internal => "fetch.internal",
        }
    }
}

impl Display for FetchError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for FetchError {}

/// Outcome of a call rejected or failed behind a circuit breaker.
///
/// The breaker never swallows the wrapped operation's error: it is returned
/// untouched as [`BreakerError::Inner`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BreakerError<E> {
    /// The breaker rejected the call without invoking the operation.
    Open { name: String, retry_in: Duration },
    /// The wrapped operation failed.
    Inner(E),
}

impl<E> BreakerError<E> {
    pub const fn is_open(&self) -> bool {
        matches!(self, Self::Open { .. })
    }

    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(error) => Some(error),
        }
    }
}

impl<E: Display> Display for BreakerError<E> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Open { name, retry_in } => write!(
                f,
                "circuit '{name}' is open; retry in {}ms",
                retry_in.as_millis()
            ),
            Self::Inner(error) => error.fmt(f),
        }
    }
}

impl<E> std::error::Error for BreakerError<E>
where
    E: std::error::Error + 'static,
{
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Open { .. } => None,
            Self::Inner(error) => Some(error),
        }
    }
}

/// Errors surfaced by the source fallback resolver.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("no source produced data after {} attempt(s)", .attempts.len())]
    SourceExhausted { attempts: Vec<SourceAttempt> },
}

/// Structural failures of the disk-backed error stream.
#[derive(Debug, Error)]
pub enum StreamError {
    #[error("failed to create error file directory {}", .path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write error file {}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to read error file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to remove error file {}", .path.display())]
    Remove {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed error record at {}:{line}", .path.display())]
    Decode {
        path: PathBuf,
        line: u64,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode error record: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Invalid or unreadable ingestion configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("invalid config value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    #[error("source '{name}' is configured more than once")]
    DuplicateSource { name: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Contract violations when building event envelopes.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("source cannot be empty")]
    EmptySource,
    #[error("entity_id cannot be empty")]
    EmptyEntityId,
    #[error("schema_version cannot be empty")]
    EmptySchemaVersion,
    #[error("row {row} is missing field '{field}'")]
    MissingField { row: usize, field: String },
    #[error("row {row} field '{field}' is not a valid event time: {value}")]
    InvalidEventTime {
        row: usize,
        field: String,
        value: String,
    },
}

/// Top-level error type for core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error(transparent)]
    Envelope(#[from] EnvelopeError),
}
