//! Error types for hubsync.
//!
//! `SyncError` is the single error type returned by stores, collaborators and
//! components. `PushError` is the aggregate returned for a whole push event:
//! per-file failures are collected by an [`ErrorAccumulator`] instead of
//! aborting the event.

use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for hubsync.
#[derive(Debug, Error)]
pub enum SyncError {
    // Lookup errors
    #[error("Repository not found: {repo_type}/{namespace}/{name}")]
    RepoNotFound {
        repo_type: String,
        namespace: String,
        name: String,
    },

    #[error("Manifest {path} not found at {reference}")]
    ManifestNotFound { path: String, reference: String },

    // Content errors
    #[error("Failed to parse {file}: {message}")]
    ManifestParse { file: String, message: String },

    #[error("Invalid push event: {message}")]
    InvalidEvent { message: String },

    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // Collaborator errors
    #[error("{service} unavailable: {message}")]
    Upstream { service: String, message: String },

    #[error("Request timeout after {0:?}")]
    Timeout(Duration),

    #[error("Push processing cancelled")]
    Cancelled,

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    #[error("Configuration error: {message}")]
    Config { message: String },
}

/// Result type alias for hubsync operations.
pub type Result<T> = std::result::Result<T, SyncError>;

/// Coarse classification used by the push error policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Repository or manifest absent.
    NotFound,
    /// Content could not be parsed.
    Parse,
    /// Tag or association store failure.
    Store,
    /// Git server, moderation backend or timeout.
    Upstream,
    /// Cancellation token fired.
    Cancelled,
    /// Malformed input or configuration.
    Invalid,
}

impl SyncError {
    /// Shorthand for a database error without an underlying rusqlite error.
    pub fn database(message: impl Into<String>) -> Self {
        SyncError::Database {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for an unreachable collaborator.
    pub fn upstream(service: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::Upstream {
            service: service.into(),
            message: message.into(),
        }
    }

    /// Shorthand for a manifest parse failure.
    pub fn parse(file: impl Into<String>, message: impl Into<String>) -> Self {
        SyncError::ManifestParse {
            file: file.into(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::RepoNotFound { .. } | SyncError::ManifestNotFound { .. } => {
                ErrorKind::NotFound
            }
            SyncError::ManifestParse { .. } => ErrorKind::Parse,
            SyncError::Database { .. } | SyncError::Io { .. } => ErrorKind::Store,
            SyncError::Upstream { .. } | SyncError::Timeout(_) => ErrorKind::Upstream,
            SyncError::Cancelled => ErrorKind::Cancelled,
            SyncError::InvalidEvent { .. } | SyncError::Config { .. } => ErrorKind::Invalid,
        }
    }

    /// Check if redelivering the push could succeed where this attempt failed.
    ///
    /// Outages are retryable; missing or malformed content is not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Store | ErrorKind::Upstream | ErrorKind::Cancelled
        )
    }

    /// Check if the reconciler may log and skip this error.
    pub fn is_skippable(&self) -> bool {
        matches!(self.kind(), ErrorKind::NotFound | ErrorKind::Parse)
    }
}

impl From<rusqlite::Error> for SyncError {
    fn from(err: rusqlite::Error) -> Self {
        SyncError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl SyncError {
    /// Map a transport error of an HTTP collaborator.
    ///
    /// Timeouts carry the client's configured limit; everything else means the
    /// collaborator is unreachable.
    pub fn from_http(service: &str, timeout: Duration, err: reqwest::Error) -> Self {
        if err.is_timeout() {
            SyncError::Timeout(timeout)
        } else {
            SyncError::upstream(service, err.to_string())
        }
    }
}

impl From<crate::cancel::CancelledError> for SyncError {
    fn from(_: crate::cancel::CancelledError) -> Self {
        SyncError::Cancelled
    }
}

/// Aggregate error for a push event: every failure that occurred, in order.
#[derive(Debug)]
pub struct PushError {
    errors: Vec<SyncError>,
}

impl PushError {
    pub fn errors(&self) -> &[SyncError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<SyncError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// True if any contained error is an outage worth a redelivery.
    pub fn is_retryable(&self) -> bool {
        self.errors.iter().any(SyncError::is_retryable)
    }
}

impl fmt::Display for PushError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, err) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}", err)?;
        }
        Ok(())
    }
}

impl std::error::Error for PushError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.errors
            .first()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

impl From<SyncError> for PushError {
    fn from(err: SyncError) -> Self {
        PushError { errors: vec![err] }
    }
}

/// Collects errors across a push event without short-circuiting.
#[derive(Debug, Default)]
pub struct ErrorAccumulator {
    errors: Vec<SyncError>,
}

impl ErrorAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, err: SyncError) {
        self.errors.push(err);
    }

    /// Record the error of a failed result and hand back the success value.
    pub fn record<T>(&mut self, result: Result<T>) -> Option<T> {
        match result {
            Ok(value) => Some(value),
            Err(err) => {
                self.errors.push(err);
                None
            }
        }
    }

    /// Merge another aggregate into this one.
    pub fn absorb(&mut self, result: std::result::Result<(), PushError>) {
        if let Err(err) = result {
            self.errors.extend(err.errors);
        }
    }

    pub fn extend(&mut self, errors: impl IntoIterator<Item = SyncError>) {
        self.errors.extend(errors);
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn into_result(self) -> std::result::Result<(), PushError> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(PushError {
                errors: self.errors,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SyncError::RepoNotFound {
            repo_type: "model".into(),
            namespace: "acme".into(),
            name: "bert".into(),
        };
        assert_eq!(err.to_string(), "Repository not found: model/acme/bert");
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            SyncError::parse("config.json", "bad").kind(),
            ErrorKind::Parse
        );
        assert_eq!(SyncError::database("locked").kind(), ErrorKind::Store);
        assert_eq!(
            SyncError::Timeout(Duration::from_secs(1)).kind(),
            ErrorKind::Upstream
        );
    }

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::upstream("git", "connection refused").is_retryable());
        assert!(SyncError::database("disk I/O error").is_retryable());
        assert!(!SyncError::parse("README.md", "bad yaml").is_retryable());
        assert!(!SyncError::ManifestNotFound {
            path: "config.json".into(),
            reference: "refs/heads/main".into()
        }
        .is_retryable());
    }

    #[test]
    fn test_accumulator_empty_is_ok() {
        let acc = ErrorAccumulator::new();
        assert!(acc.into_result().is_ok());
    }

    #[test]
    fn test_accumulator_joins_errors() {
        let mut acc = ErrorAccumulator::new();
        assert_eq!(acc.record(Ok::<_, SyncError>(3)), Some(3));
        acc.record::<()>(Err(SyncError::parse("README.md", "bad yaml")));
        acc.push(SyncError::upstream("git", "timeout"));

        let err = acc.into_result().unwrap_err();
        assert_eq!(err.len(), 2);
        assert!(err.is_retryable());
        assert_eq!(
            err.to_string(),
            "Failed to parse README.md: bad yaml\ngit unavailable: timeout"
        );
    }

    #[test]
    fn test_push_error_not_retryable_for_content_errors() {
        let err = PushError::from(SyncError::parse("README.md", "bad yaml"));
        assert!(!err.is_retryable());
    }
}
