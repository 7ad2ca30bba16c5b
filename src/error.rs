use serde::Serialize;
use thiserror::Error;

/// Machine-readable error classification, used when serializing errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SourceUnavailable,
    SinkWriteFailure,
    InvalidConfiguration,
}

/// Structured error payload for callers forwarding faults as events.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorReport {
    pub kind: ErrorKind,
    pub message: String,
}

/// Crate-wide error type.
///
/// Every variant is fatal to the run that produced it. Shards already
/// written before the fault are left in place.
#[derive(Debug, Error)]
pub enum SplitError {
    // ── Input ─────────────────────────────────────────────────────────────────
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    // ── Output ────────────────────────────────────────────────────────────────
    #[error("Sink write failure: {0}")]
    SinkWriteFailure(String),

    // ── Setup ─────────────────────────────────────────────────────────────────
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl SplitError {
    /// Returns the classification of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            SplitError::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            SplitError::SinkWriteFailure(_) => ErrorKind::SinkWriteFailure,
            SplitError::InvalidConfiguration(_) => ErrorKind::InvalidConfiguration,
        }
    }

    /// Returns the context message without the kind prefix.
    pub fn message(&self) -> &str {
        match self {
            SplitError::SourceUnavailable(msg)
            | SplitError::SinkWriteFailure(msg)
            | SplitError::InvalidConfiguration(msg) => msg,
        }
    }

    /// Whether a bounded retry may succeed.
    ///
    /// Only sink failures qualify; a broken source or a bad configuration
    /// will fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SplitError::SinkWriteFailure(_))
    }

    /// Converts the error into a serializable report.
    pub fn to_report(&self) -> ErrorReport {
        ErrorReport {
            kind: self.kind(),
            message: self.message().to_string(),
        }
    }
}

impl Serialize for SplitError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        self.to_report().serialize(serializer)
    }
}
