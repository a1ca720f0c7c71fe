//! Error types for stax.
//!
//! This module provides the error hierarchy for every stage of a stack
//! reconciliation: configuration loading, remote calls, changeset planning
//! and execution.

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for stax.
#[derive(Debug, Error)]
pub enum StaxError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Errors returned by the remote provisioning service.
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),

    /// Changeset planning errors.
    #[error("Planning error: {0}")]
    Plan(#[from] PlanError),

    /// Execution errors.
    #[error("Reconciliation error: {0}")]
    Reconcile(#[from] ReconcileError),

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file was not found.
    #[error("Configuration file not found: {path}")]
    FileNotFound {
        /// Path to the missing file.
        path: PathBuf,
    },

    /// A file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// Validation failed.
    #[error("Configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation error.
        message: String,
        /// Field that failed validation.
        field: Option<String>,
    },

    /// A stack references an account that is not configured.
    #[error("Account '{account}' is not defined in the configuration")]
    UnknownAccount {
        /// The account name.
        account: String,
    },

    /// A template exceeds the inline size limit and there is nowhere to upload it.
    #[error("Template for {stack} is {size} bytes (limit {limit}) and no bucket is configured")]
    MissingBucket {
        /// Stack the template belongs to.
        stack: String,
        /// Template size in bytes.
        size: usize,
        /// Inline size limit in bytes.
        limit: usize,
    },
}

/// Errors returned by the remote provisioning service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The named stack does not exist.
    #[error("Stack {stack} does not exist")]
    StackNotFound {
        /// Name of the missing stack.
        stack: String,
    },

    /// The caller identity does not match the configured account.
    #[error("Profile mismatch for account {account}: expected id {expected}, found {found}")]
    AccountMismatch {
        /// Configured account name.
        account: String,
        /// Configured account id.
        expected: String,
        /// Account id reported by the service.
        found: String,
    },

    /// The service is rate limiting read requests.
    #[error("{operation} throttled: {message}")]
    Throttled {
        /// Operation that was throttled.
        operation: String,
        /// Message from the service.
        message: String,
    },

    /// Any other service error, message kept verbatim.
    #[error("{operation} failed: {message}")]
    ServiceError {
        /// Operation that failed.
        operation: String,
        /// Message from the service.
        message: String,
    },

    /// Object storage error while uploading a template.
    #[error("S3 error: {message}")]
    Storage {
        /// Description of the storage error.
        message: String,
    },
}

/// Changeset planning errors.
#[derive(Debug, Error)]
pub enum PlanError {
    /// The service finished computing the changeset with a failure.
    #[error("Changeset for {stack} failed: {reason}")]
    ChangeSetFailed {
        /// Stack the changeset belongs to.
        stack: String,
        /// Status reason reported by the service.
        reason: String,
    },

    /// A changeset belongs to a different stack than the one being reconciled.
    #[error("Changeset stack name {found} does not match {expected}")]
    StackNameMismatch {
        /// Stack being reconciled.
        expected: String,
        /// Stack named by the changeset.
        found: String,
    },

    /// A template could not be read or rendered.
    #[error("Invalid template for {stack}: {message}")]
    InvalidTemplate {
        /// Stack the template belongs to.
        stack: String,
        /// Description of the problem.
        message: String,
    },
}

/// Execution errors.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The changeset is older than the configured timeout.
    #[error(
        "Refusing to execute changeset {change_set} that is older than {timeout_minutes} minute(s) (age: {age_minutes} minute(s))"
    )]
    StaleChangeSet {
        /// Changeset id.
        change_set: String,
        /// Age of the changeset in whole minutes.
        age_minutes: i64,
        /// Configured timeout in minutes.
        timeout_minutes: u32,
    },

    /// The stack settled in a failure state.
    #[error("Stack {stack} finished in {status}")]
    StackFailed {
        /// Stack name.
        stack: String,
        /// Terminal status.
        status: String,
    },

    /// Maximum retry attempts exceeded.
    #[error("Maximum retry attempts ({attempts}) exceeded for {resource}")]
    MaxRetriesExceeded {
        /// Number of attempts made.
        attempts: u32,
        /// Resource that failed.
        resource: String,
    },

    /// Reconciliation was aborted.
    #[error("Reconciliation aborted: {reason}")]
    Aborted {
        /// Reason for abort.
        reason: String,
    },
}

/// Result type alias for stax operations.
pub type Result<T> = std::result::Result<T, StaxError>;

impl StaxError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Returns true if this error means the stack does not exist.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::StackNotFound { .. }))
    }

    /// Returns true if this error is retryable.
    ///
    /// Only throttling of read requests is retried; every other remote
    /// failure is surfaced to the caller.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Remote(RemoteError::Throttled { .. }))
    }
}

impl ConfigError {
    /// Creates a validation error for a specific field.
    #[must_use]
    pub fn validation(message: impl Into<String>, field: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: Some(field.into()),
        }
    }

    /// Creates a validation error without a specific field.
    #[must_use]
    pub fn validation_general(message: impl Into<String>) -> Self {
        Self::ValidationError {
            message: message.into(),
            field: None,
        }
    }

    /// Creates a parse error for a file.
    #[must_use]
    pub fn parse(message: impl Into<String>, location: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: Some(location.into()),
        }
    }
}

impl RemoteError {
    /// Creates a service error for an operation.
    #[must_use]
    pub fn service(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ServiceError {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Creates a not-found error for a stack.
    #[must_use]
    pub fn not_found(stack: impl Into<String>) -> Self {
        Self::StackNotFound {
            stack: stack.into(),
        }
    }

    /// Creates a storage error.
    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_throttling_is_retryable() {
        let throttled = StaxError::from(RemoteError::Throttled {
            operation: String::from("DescribeStacks"),
            message: String::from("Rate exceeded"),
        });
        assert!(throttled.is_retryable());

        let failed = StaxError::from(RemoteError::service("ExecuteChangeSet", "boom"));
        assert!(!failed.is_retryable());
    }

    #[test]
    fn test_not_found_predicate() {
        assert!(StaxError::from(RemoteError::not_found("orders-api")).is_not_found());
        assert!(!StaxError::internal("other").is_not_found());
    }

    #[test]
    fn test_stale_message_is_operator_facing() {
        let err = StaxError::from(ReconcileError::StaleChangeSet {
            change_set: String::from("stax-1"),
            age_minutes: 31,
            timeout_minutes: 30,
        });
        assert!(
            err.to_string()
                .contains("Refusing to execute changeset stax-1 that is older than 30 minute(s)")
        );
    }
}
