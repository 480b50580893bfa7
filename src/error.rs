//! Error types for the adapter core.

use thiserror::Error;

use crate::wire::error::{classify_error, DriverError, ErrorClass};

#[derive(Error, Debug)]
pub enum AdapterError {
    /// A statement failed on the server. The class carries the server's code
    /// and message verbatim.
    #[error("{0}")]
    Statement(ErrorClass),

    /// The connection is unusable; `reconnect` must succeed before further use.
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Type conversion error: {0}")]
    Type(String),

    #[error("Unsupported by {dialect}: {feature}")]
    Unsupported { dialect: String, feature: String },

    #[error("Transaction error: {0}")]
    Transaction(String),
}

impl AdapterError {
    /// The classified server failure, if this is one.
    pub fn class(&self) -> Option<&ErrorClass> {
        match self {
            AdapterError::Statement(class) => Some(class),
            _ => None,
        }
    }

    pub fn is_unique_violation(&self) -> bool {
        matches!(self, AdapterError::Statement(ErrorClass::UniqueViolation { .. }))
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(
            self,
            AdapterError::Statement(ErrorClass::ForeignKeyViolation { .. })
        )
    }
}

impl From<DriverError> for AdapterError {
    fn from(err: DriverError) -> Self {
        if err.is_connection_failure() {
            AdapterError::ConnectionLost(err.to_string())
        } else {
            AdapterError::Statement(classify_error(&err))
        }
    }
}

pub type Result<T> = std::result::Result<T, AdapterError>;
