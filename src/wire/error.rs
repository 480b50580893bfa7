//! Driver errors and server error classification.

use std::fmt;
use std::io;

/// Result type for driver operations.
pub type DriverResult<T> = Result<T, DriverError>;

/// Errors reported by the transport/driver layer.
#[derive(Debug)]
pub enum DriverError {
    /// I/O error during communication.
    Io(io::Error),

    /// Protocol error (unexpected message, invalid format, etc.).
    Protocol(String),

    /// Server returned an error.
    ///
    /// `code` is `None` when the error payload carried no SQLSTATE.
    Server {
        severity: String,
        code: Option<String>,
        message: String,
        detail: Option<String>,
        hint: Option<String>,
    },

    /// The connection is closed, timed out or otherwise no longer usable.
    Connection(String),
}

impl DriverError {
    /// Convenience constructor for a server error with a code.
    pub fn server(code: impl Into<String>, message: impl Into<String>) -> Self {
        DriverError::Server {
            severity: "ERROR".to_string(),
            code: Some(code.into()),
            message: message.into(),
            detail: None,
            hint: None,
        }
    }

    /// Whether the connection must be considered dead after this error.
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, DriverError::Io(_) | DriverError::Connection(_))
    }

    /// SQLSTATE code, when the server supplied one.
    pub fn code(&self) -> Option<&str> {
        match self {
            DriverError::Server { code, .. } => code.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverError::Io(e) => write!(f, "I/O error: {}", e),
            DriverError::Protocol(msg) => write!(f, "Protocol error: {}", msg),
            DriverError::Server {
                severity,
                code,
                message,
                detail,
                hint,
            } => {
                match code {
                    Some(code) => write!(f, "{}: {} ({})", severity, message, code)?,
                    None => write!(f, "{}: {}", severity, message)?,
                }
                if let Some(d) = detail {
                    write!(f, "\nDetail: {}", d)?;
                }
                if let Some(h) = hint {
                    write!(f, "\nHint: {}", h)?;
                }
                Ok(())
            }
            DriverError::Connection(msg) => write!(f, "Connection error: {}", msg),
        }
    }
}

impl std::error::Error for DriverError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DriverError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for DriverError {
    fn from(e: io::Error) -> Self {
        DriverError::Io(e)
    }
}

// ============================================================================
// Classification
// ============================================================================

pub const UNIQUE_VIOLATION: &str = "23501";
pub const FK_REFERENCING_VIOLATION: &str = "23503";
pub const FK_REFERENCED_VIOLATION: &str = "23504";
pub const STALE_STATEMENT: &str = "0A50A";

/// Classified statement failure.
///
/// Every variant keeps the server's code and message verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorClass {
    UniqueViolation { code: String, message: String },
    ForeignKeyViolation { code: String, message: String },
    /// The prepared statement no longer matches the schema.
    StaleStatement { code: String, message: String },
    Unknown { code: Option<String>, message: String },
}

impl ErrorClass {
    pub fn message(&self) -> &str {
        match self {
            ErrorClass::UniqueViolation { message, .. }
            | ErrorClass::ForeignKeyViolation { message, .. }
            | ErrorClass::StaleStatement { message, .. }
            | ErrorClass::Unknown { message, .. } => message,
        }
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            ErrorClass::UniqueViolation { code, .. }
            | ErrorClass::ForeignKeyViolation { code, .. }
            | ErrorClass::StaleStatement { code, .. } => Some(code),
            ErrorClass::Unknown { code, .. } => code.as_deref(),
        }
    }

    #[inline]
    pub fn is_stale(&self) -> bool {
        matches!(self, ErrorClass::StaleStatement { .. })
    }
}

impl fmt::Display for ErrorClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ErrorClass::UniqueViolation { .. } => "Unique violation",
            ErrorClass::ForeignKeyViolation { .. } => "Foreign key violation",
            ErrorClass::StaleStatement { .. } => "Stale statement",
            ErrorClass::Unknown { .. } => "Statement failed",
        };
        match self.code() {
            Some(code) => write!(f, "{}: {} ({})", label, self.message(), code),
            None => write!(f, "{}: {}", label, self.message()),
        }
    }
}

/// Map a server code to its class. Never fails: a missing or unrecognized
/// code is `Unknown`.
pub fn classify(code: Option<&str>, message: &str) -> ErrorClass {
    let message = message.to_string();
    match code {
        Some(UNIQUE_VIOLATION) => ErrorClass::UniqueViolation {
            code: UNIQUE_VIOLATION.to_string(),
            message,
        },
        Some(c @ (FK_REFERENCING_VIOLATION | FK_REFERENCED_VIOLATION)) => {
            ErrorClass::ForeignKeyViolation {
                code: c.to_string(),
                message,
            }
        }
        Some(STALE_STATEMENT) => ErrorClass::StaleStatement {
            code: STALE_STATEMENT.to_string(),
            message,
        },
        other => ErrorClass::Unknown {
            code: other.map(str::to_string),
            message,
        },
    }
}

/// Classify a driver error. Non-server errors have no code and classify as
/// `Unknown` with their rendered text as the message.
pub fn classify_error(err: &DriverError) -> ErrorClass {
    match err {
        DriverError::Server { code, message, .. } => classify(code.as_deref(), message),
        other => classify(None, &other.to_string()),
    }
}
