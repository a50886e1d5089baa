//! Error types for the wicket protocol

use thiserror::Error;

/// Result type alias for protocol operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while encoding, decoding or moving datagrams
#[derive(Debug, Error)]
pub enum Error {
    /// A field of the handshake parameter string could not be understood
    #[error("bad parameter `{field}`: {reason}")]
    MalformedParameters { field: String, reason: String },

    /// The interface or transport has been closed
    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn malformed(field: &str, reason: impl Into<String>) -> Self {
        Error::MalformedParameters {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Check if the error came from a bad parameter string
    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedParameters { .. })
    }
}
