//! Unified error handling for Capybarish
//!
//! Every fallible operation in the crate returns [`CapyResult`]. Programmer errors
//! (type mismatches, duplicate names, invalid QoS) are reported immediately;
//! network-facing failures are swallowed at the point of occurrence and never
//! surface through this type.

use thiserror::Error;

/// Main error type for Capybarish operations
#[derive(Debug, Error)]
pub enum CapyError {
    /// I/O related errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration parsing or validation errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Encoding/decoding of wire records
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// A payload or topic did not carry the expected message type
    #[error("Type mismatch: expected {expected}, got {found}")]
    TypeMismatch { expected: String, found: String },

    /// A topic was reopened with a policy it cannot honour
    #[error("Incompatible QoS on topic '{topic}': {message}")]
    QosIncompatible { topic: String, message: String },

    /// Already exists errors (for creation operations)
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Resource not found errors
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid input/argument errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Socket setup errors (runtime send/recv errors are never reported)
    #[error("Network error: {0}")]
    Network(String),

    /// The owning registry or context has been shut down
    #[error("Shut down: {0}")]
    Shutdown(String),

    /// Generic internal errors (use sparingly)
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results using CapyError
pub type CapyResult<T> = Result<T, CapyError>;

impl From<toml::de::Error> for CapyError {
    fn from(err: toml::de::Error) -> Self {
        CapyError::Config(format!("TOML parse error: {}", err))
    }
}

impl From<serde_yaml::Error> for CapyError {
    fn from(err: serde_yaml::Error) -> Self {
        CapyError::Config(format!("YAML error: {}", err))
    }
}

impl From<ctrlc::Error> for CapyError {
    fn from(err: ctrlc::Error) -> Self {
        CapyError::Internal(format!("Signal handler error: {}", err))
    }
}

impl From<&str> for CapyError {
    fn from(msg: &str) -> Self {
        CapyError::Internal(msg.to_string())
    }
}

impl From<String> for CapyError {
    fn from(msg: String) -> Self {
        CapyError::Internal(msg)
    }
}

impl CapyError {
    /// Create a configuration error with a custom message
    pub fn config<S: Into<String>>(msg: S) -> Self {
        CapyError::Config(msg.into())
    }

    /// Create a serialization error
    pub fn serialization<S: Into<String>>(msg: S) -> Self {
        CapyError::Serialization(msg.into())
    }

    /// Create a type mismatch error from two type names
    pub fn type_mismatch<S: Into<String>, T: Into<String>>(expected: S, found: T) -> Self {
        CapyError::TypeMismatch {
            expected: expected.into(),
            found: found.into(),
        }
    }

    /// Create a QoS incompatibility error for a topic
    pub fn qos_incompatible<S: Into<String>, T: Into<String>>(topic: S, message: T) -> Self {
        CapyError::QosIncompatible {
            topic: topic.into(),
            message: message.into(),
        }
    }

    /// Create a network setup error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        CapyError::Network(msg.into())
    }

    /// Create a not found error
    pub fn not_found<S: Into<String>>(resource: S) -> Self {
        CapyError::NotFound(resource.into())
    }

    /// Create an invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        CapyError::InvalidInput(msg.into())
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, CapyError::NotFound(_))
    }

    /// Check if this is a type mismatch
    pub fn is_type_mismatch(&self) -> bool {
        matches!(self, CapyError::TypeMismatch { .. })
    }

    /// Check if this reports use after shutdown
    pub fn is_shutdown(&self) -> bool {
        matches!(self, CapyError::Shutdown(_))
    }
}
