//! Error types for oneki-core.
//!
//! The variants follow the failure taxonomy of the subsystem: validation and
//! authorization failures never change state, persistence failures are rolled
//! back and retryable, handler faults close the session, and transport
//! permission failures are reported softly by their callers.

use thiserror::Error;

use crate::host::HostError;
use crate::store::StoreError;

/// Result type alias using oneki-core Error
pub type Result<T> = std::result::Result<T, Error>;

/// Bad user input, rejected before any state changes
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    #[error("text is {actual} characters, the limit is {max}")]
    TooLong { max: usize, actual: usize },

    #[error("text contains a link")]
    ContainsLink,

    #[error("value must not be empty")]
    Empty,

    #[error("at most {max} entries are allowed")]
    TooMany { max: usize },
}

/// Core error types for oneki operations
#[derive(Error, Debug)]
pub enum Error {
    // Input errors
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationFailure),

    #[error("User {user} may not drive session {session}")]
    Unauthorized { session: String, user: String },

    // Cache errors
    #[error("Failed to persist {scope} entry {key}: {source}")]
    Persistence {
        scope: &'static str,
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("{scope} entry not present: {key}")]
    NotPresent { scope: &'static str, key: String },

    // Session errors
    /// A view handler panicked
    #[error("Handler fault: {0}")]
    HandlerFault(String),

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Session closed: {0}")]
    SessionClosed(String),

    // Transport errors
    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // Store errors outside of a cache mutation (startup load, diagnostics)
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Translation error: {0}")]
    Translation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a persistence error for a cache mutation
    pub fn persistence(scope: &'static str, key: impl ToString, source: StoreError) -> Self {
        Self::Persistence {
            scope,
            key: key.to_string(),
            source,
        }
    }

    /// Create a not-present error for a cache removal
    pub fn not_present(scope: &'static str, key: impl ToString) -> Self {
        Self::NotPresent {
            scope,
            key: key.to_string(),
        }
    }

    /// Short name of the variant, used in failure reports
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "Validation",
            Self::Unauthorized { .. } => "Unauthorized",
            Self::Persistence { .. } => "Persistence",
            Self::NotPresent { .. } => "NotPresent",
            Self::HandlerFault(_) => "HandlerFault",
            Self::SessionNotFound(_) => "SessionNotFound",
            Self::SessionClosed(_) => "SessionClosed",
            Self::PermissionDenied(_) => "PermissionDenied",
            Self::Transport(_) => "Transport",
            Self::Store(_) => "Store",
            Self::Translation(_) => "Translation",
            Self::Config(_) => "Config",
            Self::Serialization(_) => "Serialization",
            Self::Io(_) => "Io",
            Self::Other(_) => "Other",
        }
    }

    /// Whether retrying the same call may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Persistence { .. } | Self::Store(_))
    }

    /// Check if this error is a not-present error
    pub fn is_not_present(&self) -> bool {
        matches!(self, Self::NotPresent { .. })
    }

    /// Check if this error is a permission failure from the transport
    pub fn is_permission_denied(&self) -> bool {
        matches!(self, Self::PermissionDenied(_))
    }
}

impl From<HostError> for Error {
    fn from(e: HostError) -> Self {
        match e {
            HostError::PermissionDenied(message) => Error::PermissionDenied(message),
            other => Error::Transport(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_is_retryable() {
        let err = Error::persistence("prefixes", 42, StoreError::unavailable("offline"));
        assert!(err.is_retryable());
        assert!(err.to_string().contains("prefixes"));
        assert!(err.to_string().contains("42"));
    }

    #[test]
    fn test_not_present() {
        let err = Error::not_present("blacklist", "user:7");
        assert!(err.is_not_present());
        assert!(!err.is_retryable());
        assert_eq!(err.kind(), "NotPresent");
    }

    #[test]
    fn test_handler_fault_kind() {
        let err = Error::HandlerFault("index out of bounds".into());
        assert_eq!(err.kind(), "HandlerFault");
        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Handler fault: index out of bounds");
    }

    #[test]
    fn test_host_permission_maps_to_permission_denied() {
        let err: Error = HostError::PermissionDenied("rename".into()).into();
        assert!(err.is_permission_denied());

        let err: Error = HostError::Delivery("socket closed".into()).into();
        assert!(matches!(err, Error::Transport(_)));
    }
}
