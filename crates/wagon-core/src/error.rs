//! Error taxonomy for the delivery engine.
//!
//! Errors carry a machine-readable kind so callers can branch on them
//! (missing data vs. validation vs. infrastructure failure) without string
//! matching. Queue-domain rejections have their own enum because they are
//! business-rule outcomes, not failures: the worker skips the item and moves
//! on.

use thiserror::Error;

use crate::models::QueueError;

/// Result type alias using [`CoreError`].
pub type Result<T> = std::result::Result<T, CoreError>;

/// Error type shared across the engine.
#[derive(Debug, Error)]
pub enum CoreError {
    /// A lookup matched no rows.
    ///
    /// Not necessarily a failure: list queries treat it as an empty result,
    /// while required-entity lookups upgrade it to [`CoreError::Validation`].
    #[error("no data found")]
    NoData,

    /// Caller input failed validation.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A component was constructed with invalid settings.
    ///
    /// Only ever returned from constructors, never at runtime.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// A store operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// A webhook dispatch failed.
    ///
    /// The engine does not distinguish transport failures from non-2xx
    /// responses: every delivery error is retriable.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// A queue item rejected a delivery attempt.
    #[error(transparent)]
    Queue(#[from] QueueError),
}

impl CoreError {
    /// Creates a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Creates a database error.
    pub fn database(message: impl Into<String>) -> Self {
        Self::Database(message.into())
    }

    /// Creates a delivery error.
    pub fn delivery(message: impl Into<String>) -> Self {
        Self::Delivery(message.into())
    }

    /// Returns true if this error is the no-rows marker.
    pub const fn is_no_data(&self) -> bool {
        matches!(self, Self::NoData)
    }

    /// Returns the machine-readable error code.
    pub const fn code(&self) -> &'static str {
        match self {
            Self::NoData => "NO_DATA",
            Self::Validation(_) => "VALIDATION",
            Self::Configuration(_) => "CONFIGURATION",
            Self::Database(_) => "DATABASE",
            Self::Delivery(_) => "DELIVERY",
            Self::Queue(err) => err.code(),
        }
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => Self::NoData,
            _ => Self::Database(err.to_string()),
        }
    }
}
