//! Error types for pooldb.
//!
//! This module defines all error types using `thiserror`. Pool errors cover the
//! connection lifecycle; database errors cover statement execution and always
//! carry enough context (statement text, binds, failing unit) to diagnose the
//! failure without re-running it.

use crate::models::{BindValue, DatabaseType};
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum PoolError {
    #[error("Invalid pool configuration: {message}")]
    InvalidConfig { message: String },

    #[error("Pool initialization failed: {message}")]
    InitFailed { message: String, suggestion: String },

    #[error("Connection acquire failed: {message}")]
    AcquireFailed { message: String },
}

impl PoolError {
    /// Create an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create an initialization error with a helpful suggestion.
    pub fn init_failed(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::InitFailed {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create an acquire error.
    pub fn acquire_failed(message: impl Into<String>) -> Self {
        Self::AcquireFailed {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::InitFailed { suggestion, .. } => Some(suggestion),
            Self::AcquireFailed { .. } => {
                Some("Increase max_size or acquire_timeout, or release connections sooner")
            }
            Self::InvalidConfig { .. } => None,
        }
    }

    /// Acquire failures are transient; configuration and init failures are not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::AcquireFailed { .. })
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error("Statement failed: {cause} (sql: {sql}, binds: {binds:?})")]
    ExecutionFailed {
        sql: String,
        binds: Vec<BindValue>,
        #[source]
        cause: sqlx::Error,
    },

    #[error("Transaction failed at unit {failed_index}: {cause}")]
    TransactionFailed {
        failed_index: usize,
        #[source]
        cause: Box<DbError>,
        /// Secondary failure raised while rolling back, if any
        rollback_error: Option<String>,
    },

    #[error("Transaction commit failed: {cause}")]
    CommitFailed {
        #[source]
        cause: sqlx::Error,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("{operation} is not supported by {backend}")]
    Unsupported {
        operation: String,
        backend: DatabaseType,
    },
}

impl DbError {
    /// Create an execution error that records the failing statement and its binds.
    pub fn execution(sql: impl Into<String>, binds: &[BindValue], cause: sqlx::Error) -> Self {
        Self::ExecutionFailed {
            sql: sql.into(),
            binds: binds.to_vec(),
            cause,
        }
    }

    /// Create a transaction error for the unit at `failed_index`.
    ///
    /// A rollback failure is logged and attached but never replaces `cause`.
    pub fn transaction_failed(
        failed_index: usize,
        cause: DbError,
        rollback_error: Option<sqlx::Error>,
    ) -> Self {
        let rollback_error = rollback_error.map(|e| {
            error!(
                failed_index = failed_index,
                error = %e,
                "Rollback failed after transaction error"
            );
            e.to_string()
        });
        Self::TransactionFailed {
            failed_index,
            cause: Box::new(cause),
            rollback_error,
        }
    }

    /// Create a commit error.
    pub fn commit_failed(cause: sqlx::Error) -> Self {
        Self::CommitFailed { cause }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an unsupported operation error.
    pub fn unsupported(operation: impl Into<String>, backend: DatabaseType) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            backend,
        }
    }

    /// Driver SQLSTATE (or vendor) code of the underlying statement failure.
    pub fn sql_state(&self) -> Option<String> {
        match self {
            Self::ExecutionFailed { cause, .. } | Self::CommitFailed { cause } => cause
                .as_database_error()
                .and_then(|db_err| db_err.code())
                .map(|code| code.to_string()),
            Self::TransactionFailed { cause, .. } => cause.sql_state(),
            _ => None,
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Pool(err) => err.suggestion(),
            Self::ExecutionFailed { cause, .. } => Some(cause_suggestion(cause)),
            Self::TransactionFailed { cause, .. } => cause.suggestion(),
            Self::CommitFailed { .. } => {
                Some("The transaction outcome is unknown; verify the data before retrying")
            }
            Self::Unsupported { .. } => Some("Use a backend that supports this operation"),
            Self::InvalidInput { .. } => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Pool(err) => err.is_retryable(),
            Self::ExecutionFailed { cause, .. } => is_transient(cause),
            Self::TransactionFailed { cause, .. } => cause.is_retryable(),
            _ => false,
        }
    }
}

/// Connectivity-class driver failures that may succeed on a fresh attempt.
fn is_transient(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Io(_) | sqlx::Error::PoolTimedOut | sqlx::Error::WorkerCrashed
    )
}

fn cause_suggestion(err: &sqlx::Error) -> &'static str {
    match err {
        sqlx::Error::Database(db_err) => {
            if db_err.is_unique_violation() {
                "A row with the same key already exists"
            } else if db_err.is_foreign_key_violation() {
                "Referenced row does not exist; insert the parent row first"
            } else if db_err.is_check_violation() {
                "A CHECK constraint rejected the values"
            } else {
                "Check the SQL syntax and referenced objects"
            }
        }
        sqlx::Error::ColumnNotFound(_) => "Check the column names in the statement",
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            "Check that bind and column types match"
        }
        sqlx::Error::Io(_) | sqlx::Error::Tls(_) | sqlx::Error::Protocol(_) => {
            "Check network connectivity and database server status"
        }
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed => {
            "The pool could not provide a connection; check pool sizing"
        }
        _ => "Inspect the underlying driver error",
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;
