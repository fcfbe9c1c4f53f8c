//! Error types and handling for thermorig
//!
//! This module defines the error types used throughout the application,
//! providing consistent error handling and reporting.

use thiserror::Error;

/// Result type alias for thermorig operations
pub type Result<T> = std::result::Result<T, ThermorigError>;

/// Main error type for thermorig
#[derive(Debug, Error)]
pub enum ThermorigError {
    /// Configuration-related errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    /// Serial port cannot be opened or has gone away. An absent device is an
    /// expected operating condition, surfaced as a rejected start.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Short, garbled, mismatched or CRC-failed Modbus response
    #[error("Frame error: {message}")]
    Frame { message: String },

    /// Device explicitly signalled a Modbus exception
    #[error("Modbus exception response: code {code}")]
    Exception { code: u8 },

    /// Structurally valid frame carrying a physically implausible value
    #[error("Out-of-range value: {quantity} = {value}")]
    OutOfRange { quantity: String, value: f64 },

    /// Start requested against a session in the wrong state (or not found)
    #[error("Session state error: {message}")]
    SessionState { message: String },

    /// A field read or reconnect attempt used all retries
    #[error("Retries exhausted: {message}")]
    RetryExhausted { message: String },

    /// Storage layer errors
    #[error("Storage error: {message}")]
    Storage { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {message}")]
    Serialization { message: String },

    /// File I/O errors
    #[error("I/O error: {message}")]
    Io { message: String },

    /// Timeout errors
    #[error("Timeout error: {message}")]
    Timeout { message: String },

    /// Validation errors
    #[error("Validation error: {field} - {message}")]
    Validation { field: String, message: String },

    /// Generic errors with context
    #[error("Error: {message}")]
    Generic { message: String },
}

impl ThermorigError {
    /// Create a new configuration error
    pub fn config<S: Into<String>>(message: S) -> Self {
        ThermorigError::Config {
            message: message.into(),
        }
    }

    /// Create a new connection error
    pub fn connection<S: Into<String>>(message: S) -> Self {
        ThermorigError::Connection {
            message: message.into(),
        }
    }

    /// Create a new frame error
    pub fn frame<S: Into<String>>(message: S) -> Self {
        ThermorigError::Frame {
            message: message.into(),
        }
    }

    /// Create a new out-of-range error
    pub fn out_of_range<S: Into<String>>(quantity: S, value: f64) -> Self {
        ThermorigError::OutOfRange {
            quantity: quantity.into(),
            value,
        }
    }

    /// Create a new session state error
    pub fn session_state<S: Into<String>>(message: S) -> Self {
        ThermorigError::SessionState {
            message: message.into(),
        }
    }

    /// Create a new retry-exhausted error
    pub fn retry_exhausted<S: Into<String>>(message: S) -> Self {
        ThermorigError::RetryExhausted {
            message: message.into(),
        }
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(message: S) -> Self {
        ThermorigError::Storage {
            message: message.into(),
        }
    }

    /// Create a new I/O error
    pub fn io<S: Into<String>>(message: S) -> Self {
        ThermorigError::Io {
            message: message.into(),
        }
    }

    /// Create a new timeout error
    pub fn timeout<S: Into<String>>(message: S) -> Self {
        ThermorigError::Timeout {
            message: message.into(),
        }
    }

    /// Create a new validation error
    pub fn validation<F: Into<String>, M: Into<String>>(field: F, message: M) -> Self {
        ThermorigError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create a new generic error
    pub fn generic<S: Into<String>>(message: S) -> Self {
        ThermorigError::Generic {
            message: message.into(),
        }
    }
}

impl From<std::io::Error> for ThermorigError {
    fn from(err: std::io::Error) -> Self {
        ThermorigError::io(err.to_string())
    }
}

impl From<serde_yaml::Error> for ThermorigError {
    fn from(err: serde_yaml::Error) -> Self {
        ThermorigError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for ThermorigError {
    fn from(err: serde_json::Error) -> Self {
        ThermorigError::Serialization {
            message: err.to_string(),
        }
    }
}

impl From<chrono::ParseError> for ThermorigError {
    fn from(err: chrono::ParseError) -> Self {
        ThermorigError::validation("datetime", err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ThermorigError::config("test config error");
        assert!(matches!(err, ThermorigError::Config { .. }));

        let err = ThermorigError::connection("port missing");
        assert!(matches!(err, ThermorigError::Connection { .. }));

        let err = ThermorigError::session_state("not idle");
        assert!(matches!(err, ThermorigError::SessionState { .. }));

        let err = ThermorigError::out_of_range("voltage", 812.0);
        assert!(matches!(err, ThermorigError::OutOfRange { .. }));
    }

    #[test]
    fn test_error_display() {
        let err = ThermorigError::config("test error");
        assert_eq!(format!("{}", err), "Configuration error: test error");

        let err = ThermorigError::validation("serial.port", "cannot be empty");
        assert_eq!(
            format!("{}", err),
            "Validation error: serial.port - cannot be empty"
        );

        let err = ThermorigError::Exception { code: 2 };
        assert_eq!(format!("{}", err), "Modbus exception response: code 2");
    }
}
