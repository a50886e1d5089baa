//! Error types for wicket-tun

use std::io;
use thiserror::Error;

/// Result type alias for wicket-tun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during TUN device and route operations
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from underlying system calls
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Device creation error
    #[error("device creation error: {0}")]
    DeviceCreation(String),

    /// Route management error
    #[error("route error: {0}")]
    Route(String),

    /// Invalid network prefix
    #[error("invalid network prefix: {0}")]
    InvalidPrefix(String),

    /// Operation not supported on this platform
    #[error("operation not supported: {0}")]
    NotSupported(String),
}

impl Error {
    /// Check if the error is a permission-related error
    pub fn is_permission_denied(&self) -> bool {
        match self {
            Error::Io(e) => e.kind() == io::ErrorKind::PermissionDenied,
            Error::DeviceCreation(msg) | Error::Route(msg) => {
                msg.contains("Operation not permitted") || msg.contains("Permission denied")
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_denied_detection() {
        let err = Error::Io(io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(err.is_permission_denied());

        let err = Error::DeviceCreation("Operation not permitted (os error 1)".into());
        assert!(err.is_permission_denied());

        let err = Error::Config("no address".into());
        assert!(!err.is_permission_denied());
    }
}
