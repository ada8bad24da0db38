//! Error types for store operations.

use std::io;
use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors that can occur while reading the source or writing the destination.
#[derive(Debug, Error)]
pub enum StoreError {
    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A stored document could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store cannot be reached (connection lost, pool exhausted).
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// A row violated a destination constraint.
    #[error("constraint violation on {key:?}: {message}")]
    Constraint {
        /// Natural key of the offending row.
        key: String,
        /// Description of the violation.
        message: String,
    },

    /// A value did not fit the destination column type.
    #[error("type mismatch on column {column}: {message}")]
    TypeMismatch {
        /// Destination column name.
        column: String,
        /// Description of the mismatch.
        message: String,
    },

    /// Transaction-level failure (begin, commit or rollback).
    #[error("transaction error: {0}")]
    Transaction(String),

    /// A filter referenced a column that is not on the allow-list.
    #[error("column {column:?} is not filterable for {kind}")]
    UnknownColumn {
        /// Entity kind the filter was built for.
        kind: String,
        /// Rejected column name.
        column: String,
    },

    /// Another process holds the directory lock.
    #[error("{0} is locked by another process")]
    Locked(String),

    /// Stored data is corrupted or inconsistent.
    #[error("store corrupted: {0}")]
    Corrupted(String),
}

impl StoreError {
    /// Creates a constraint violation error.
    pub fn constraint(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Constraint {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Returns true if the error concerns a single row and leaves the
    /// surrounding transaction usable.
    pub fn is_record_level(&self) -> bool {
        matches!(
            self,
            StoreError::Constraint { .. } | StoreError::TypeMismatch { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_level_classification() {
        assert!(StoreError::constraint("E001", "duplicate").is_record_level());
        assert!(StoreError::TypeMismatch {
            column: "isRoster".into(),
            message: "expected boolean".into(),
        }
        .is_record_level());

        assert!(!StoreError::Unavailable("connection reset".into()).is_record_level());
        assert!(!StoreError::Transaction("commit failed".into()).is_record_level());
    }

    #[test]
    fn error_display() {
        let err = StoreError::UnknownColumn {
            kind: "employee".into(),
            column: "password".into(),
        };
        assert_eq!(
            err.to_string(),
            "column \"password\" is not filterable for employee"
        );
    }
}
