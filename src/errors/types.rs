//! Error type definitions for the company identity resolver
//!
//! This module defines the error types used throughout the crate. The hierarchy
//! mirrors the layers: repositories wrap database failures, the lookup layer
//! classifies transport and HTTP outcomes, and `ResolutionError` is what a caller
//! of `resolve_batch` can observe.

use thiserror::Error;

/// Top-level resolution error type
///
/// Row-level failures never surface here; they degrade to the next tier. What
/// remains are conditions that make it impossible to produce a valid output row.
#[derive(Error, Debug)]
pub enum ResolutionError {
    /// Configuration errors (invalid budget, unreadable override table, ...)
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// No salt configured for temporary id generation
    #[error("Temporary id salt is missing; fallback ids cannot be generated")]
    MissingSalt,

    /// Rows left without an identifier because temp ids are not permitted
    #[error("{count} rows could not be resolved and temporary ids are disabled")]
    UnresolvedRows { count: usize },

    /// Repository layer errors
    #[error("Repository error: {0}")]
    Repository(#[from] RepositoryError),

    /// Deferred queue errors
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    /// External lookup errors
    #[error("Lookup error: {0}")]
    Lookup(#[from] LookupError),

    /// Unknown-company export failures
    #[error("Export error: {message}")]
    Export { message: String },

    /// Generic internal errors
    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Repository layer specific errors
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database errors from SeaORM
    #[error("Database error: {0}")]
    Database(#[from] sea_orm::DbErr),

    /// Constraint violations (unique, foreign key, etc.)
    #[error("Constraint violation: {constraint} - {message}")]
    ConstraintViolation { constraint: String, message: String },

    /// Record not found
    #[error("Record not found: {table} with {field} = {value}")]
    RecordNotFound {
        table: String,
        field: String,
        value: String,
    },

    /// A stored column holds a value the domain model cannot represent
    #[error("Invalid stored value: {field} - {message}")]
    InvalidValue { field: String, message: String },
}

/// External lookup specific errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// Request did not complete within the configured timeout
    #[error("Lookup timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Connection could not be established
    #[error("Connection failed: {message}")]
    Connection { message: String },

    /// The service rejected the bearer credential
    #[error("Authentication failed: status {status}")]
    AuthenticationFailed { status: u16 },

    /// Rate limiting by the service
    #[error("Rate limited by lookup service")]
    RateLimited,

    /// Unexpected HTTP status
    #[error("HTTP error: status {status}")]
    Http { status: u16 },

    /// Response body could not be decoded
    #[error("Parse error: {message}")]
    Parse { message: String },

    /// Request could not be built or sent for another reason
    #[error("Request error: {message}")]
    Request { message: String },
}

/// Deferred queue specific errors
#[derive(Error, Debug)]
pub enum QueueError {
    /// Repository failure while persisting queue state
    #[error("Queue persistence failed: {0}")]
    Repository(#[from] RepositoryError),

    /// A lifecycle transition was requested from the wrong state
    #[error("Invalid transition for '{key}': {from} -> {to}")]
    InvalidTransition {
        key: String,
        from: String,
        to: String,
    },
}

impl From<sea_orm::DbErr> for QueueError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Repository(RepositoryError::Database(err))
    }
}

/// Convenience methods for creating common error types
impl ResolutionError {
    /// Create a configuration error
    pub fn configuration<S: Into<String>>(message: S) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an export error
    pub fn export<S: Into<String>>(message: S) -> Self {
        Self::Export {
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal<S: Into<String>>(message: S) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether this error makes the whole batch unusable
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::MissingSalt | Self::UnresolvedRows { .. } | Self::Configuration { .. }
        )
    }
}

impl LookupError {
    /// Transport-level failures are the only ones worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Connection { .. })
    }
}

impl RepositoryError {
    /// Create an invalid value error
    pub fn invalid_value<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        Self::InvalidValue {
            field: field.into(),
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_transport_errors_are_retryable() {
        assert!(LookupError::Timeout { timeout_ms: 5000 }.is_retryable());
        assert!(
            LookupError::Connection {
                message: "refused".into()
            }
            .is_retryable()
        );
        assert!(!LookupError::AuthenticationFailed { status: 401 }.is_retryable());
        assert!(!LookupError::Http { status: 404 }.is_retryable());
        assert!(!LookupError::RateLimited.is_retryable());
    }

    #[test]
    fn test_fatal_classification() {
        assert!(ResolutionError::MissingSalt.is_fatal());
        assert!(ResolutionError::UnresolvedRows { count: 2 }.is_fatal());
        assert!(!ResolutionError::export("disk full").is_fatal());
    }

    #[test]
    fn test_error_display() {
        let err = ResolutionError::UnresolvedRows { count: 3 };
        assert_eq!(
            err.to_string(),
            "3 rows could not be resolved and temporary ids are disabled"
        );

        let err = QueueError::InvalidTransition {
            key: "abc".into(),
            from: "done".into(),
            to: "processing".into(),
        };
        assert_eq!(err.to_string(), "Invalid transition for 'abc': done -> processing");
    }
}
