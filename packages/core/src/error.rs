//! Error Types
//!
//! Per-key outcomes of driver calls (`Ok`/`Empty`/`NotFound`/`BadRequest`) are values,
//! see [`crate::drivers::EntityResult`]. The enums here cover the failures that abort a
//! whole call: a driver used after disposal, a client that cannot be reached, or an
//! invalid configuration.

use thiserror::Error;

/// Driver-level failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DriverError {
    /// Request could not be interpreted (null/empty key, malformed batch)
    #[error("Bad request: {0}")]
    BadRequest(String),

    /// Key was never resolved by this driver
    #[error("Entity not found: {key}")]
    NotFound { key: String },

    /// Driver state is inconsistent
    #[error("Internal driver error: {0}")]
    Internal(String),

    /// Driver was disposed and no longer accepts calls
    #[error("Driver disposed: {driver}")]
    Disposed { driver: String },
}

impl DriverError {
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::BadRequest(msg.into())
    }

    pub fn not_found(key: impl Into<String>) -> Self {
        Self::NotFound { key: key.into() }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn disposed(driver: impl Into<String>) -> Self {
        Self::Disposed {
            driver: driver.into(),
        }
    }
}

/// Failures reported by an [`crate::engine::EntitiesClient`]
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ClientError {
    /// Backend could not be reached
    #[error("Client unavailable: {0}")]
    Unavailable(String),

    /// A single request failed
    #[error("Request '{operation}' failed: {message}")]
    Request { operation: String, message: String },

    /// Caller abandoned the request
    #[error("Request cancelled")]
    Cancelled,

    /// Underlying driver failure
    #[error("Driver error: {0}")]
    Driver(#[from] DriverError),
}

impl ClientError {
    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::Unavailable(msg.into())
    }

    pub fn request(operation: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Request {
            operation: operation.into(),
            message: message.into(),
        }
    }
}

/// Configuration validation failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

impl ConfigError {
    pub fn invalid_value(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}
