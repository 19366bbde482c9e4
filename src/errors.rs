// Copyright 2025 Cowboy AI, LLC.

//! Error types for substrate operations
//!
//! Every failure in the crate is folded into [`DomainError`]. The variants
//! fall into a small number of [`ErrorCategory`] classes which decide
//! retry behaviour in the repository layer and status codes at the HTTP
//! edge.

use thiserror::Error;

/// Coarse classification of a [`DomainError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// Malformed input; never retried
    Validation,
    /// The entity does not exist in the caller's tenant
    NotFound,
    /// Unique constraint or state machine violation
    Conflict,
    /// Store connection or timeout failure; retried with backoff
    TransientStorage,
    /// Publish failed after the local mutation committed
    TransientBus,
    /// The call's deadline elapsed
    Cancelled,
    /// Invariant violation; the process should restart
    Fatal,
    /// Anything else
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ErrorCategory::Validation => "validation",
            ErrorCategory::NotFound => "not_found",
            ErrorCategory::Conflict => "conflict",
            ErrorCategory::TransientStorage => "transient_storage",
            ErrorCategory::TransientBus => "transient_bus",
            ErrorCategory::Cancelled => "cancelled",
            ErrorCategory::Fatal => "fatal",
            ErrorCategory::Internal => "internal",
        };
        f.write_str(name)
    }
}

/// Errors that can occur in substrate operations
#[derive(Debug, Clone, Error)]
pub enum DomainError {
    /// Entity not found
    #[error("Entity not found: {entity_type} with id {id}")]
    EntityNotFound {
        /// Type of entity that wasn't found
        entity_type: String,
        /// ID that was searched for
        id: String,
    },

    /// Validation error
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Unique constraint or business state conflict
    #[error("Conflict: {reason}")]
    Conflict {
        /// What collided
        reason: String,
    },

    /// Optimistic concurrency conflict
    #[error("Concurrency conflict: expected version {expected}, but found {actual}")]
    ConcurrencyConflict {
        /// Expected version
        expected: u64,
        /// Actual version
        actual: u64,
    },

    /// Invalid state transition
    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition {
        /// Current state
        from: String,
        /// Attempted target state
        to: String,
    },

    /// Store connectivity failure
    #[error("Transient storage error: {0}")]
    TransientStorage(String),

    /// Bus publish failure after commit
    #[error("Transient bus error: {0}")]
    TransientBus(String),

    /// Deadline elapsed or caller cancelled
    #[error("Operation cancelled: {0}")]
    Cancelled(String),

    /// Invariant violation
    #[error("Invariant violation: {0}")]
    InvariantViolation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// Configuration could not be loaded or is inconsistent
    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    /// Non-transient store failure
    #[error("Storage error: {0}")]
    StorageError(String),

    /// Generic internal error
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type for substrate operations
pub type DomainResult<T> = Result<T, DomainError>;

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::SerializationError(err.to_string())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => DomainError::EntityNotFound {
                entity_type: "row".to_string(),
                id: "unknown".to_string(),
            },
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DomainError::TransientStorage(err.to_string())
            }
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                DomainError::Conflict {
                    reason: db.message().to_string(),
                }
            }
            sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
                DomainError::SerializationError(err.to_string())
            }
            _ => DomainError::StorageError(err.to_string()),
        }
    }
}

impl DomainError {
    /// Shorthand for [`DomainError::EntityNotFound`]
    pub fn not_found(entity_type: impl Into<String>, id: impl ToString) -> Self {
        DomainError::EntityNotFound {
            entity_type: entity_type.into(),
            id: id.to_string(),
        }
    }

    /// Shorthand for [`DomainError::ValidationError`]
    pub fn validation(msg: impl Into<String>) -> Self {
        DomainError::ValidationError(msg.into())
    }

    /// Shorthand for [`DomainError::Conflict`]
    pub fn conflict(reason: impl Into<String>) -> Self {
        DomainError::Conflict {
            reason: reason.into(),
        }
    }

    /// The taxonomy class of this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            DomainError::EntityNotFound { .. } => ErrorCategory::NotFound,
            DomainError::ValidationError(_) | DomainError::SerializationError(_) => {
                ErrorCategory::Validation
            }
            DomainError::Conflict { .. }
            | DomainError::ConcurrencyConflict { .. }
            | DomainError::InvalidStateTransition { .. } => ErrorCategory::Conflict,
            DomainError::TransientStorage(_) => ErrorCategory::TransientStorage,
            DomainError::TransientBus(_) => ErrorCategory::TransientBus,
            DomainError::Cancelled(_) => ErrorCategory::Cancelled,
            DomainError::InvariantViolation(_) | DomainError::ConfigurationError(_) => {
                ErrorCategory::Fatal
            }
            DomainError::StorageError(_) | DomainError::InternalError(_) => {
                ErrorCategory::Internal
            }
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        self.category() == ErrorCategory::NotFound
    }

    /// Check if this is a validation error
    pub fn is_validation_error(&self) -> bool {
        self.category() == ErrorCategory::Validation
    }

    /// Check if this is a concurrency error
    pub fn is_concurrency_error(&self) -> bool {
        matches!(self, DomainError::ConcurrencyConflict { .. })
    }

    /// Whether the repository layer may retry the failed call
    pub fn is_retryable(&self) -> bool {
        self.category() == ErrorCategory::TransientStorage
    }
}
