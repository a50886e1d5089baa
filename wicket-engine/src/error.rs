//! Error types for the tunnel engine

use thiserror::Error;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running a tunnel connection
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Failed to parse configuration file
    #[error("failed to parse config: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error on the tunnel socket
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Transport or interface failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The gateway stopped answering
    #[error("timeout: {0}")]
    Timeout(String),

    /// The gateway pushed a parameter string that could not be understood
    #[error("bad parameter `{field}`: {reason}")]
    MalformedParameters { field: String, reason: String },

    /// The tunnel socket could not be excluded from the tunnel
    #[error("failed to protect tunnel socket: {0}")]
    Protect(#[source] std::io::Error),

    /// The gateway host name could not be resolved
    #[error("failed to resolve {0}")]
    Resolve(String),

    /// The host refused to create the virtual interface
    #[error("interface provider error: {0}")]
    Provider(String),

    /// Too many consecutive failed attempts
    #[error("giving up after {0} failed attempts")]
    GaveUp(u32),

    /// Stop requested
    #[error("cancelled")]
    Cancelled,
}

impl Error {
    /// Check if the connection should retry after this error
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Error::Timeout(_) | Error::Io(_) | Error::Transport(_))
    }

    /// Check if this error ends the connection without retrying
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Config(_)
                | Error::ConfigParse(_)
                | Error::MalformedParameters { .. }
                | Error::Protect(_)
                | Error::Resolve(_)
                | Error::Provider(_)
        )
    }

    /// Check if this is a configuration error
    pub fn is_config_error(&self) -> bool {
        matches!(self, Error::Config(_) | Error::ConfigParse(_))
    }

    /// Check if the connection was told to stop
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }
}

impl From<wicket_protocol::Error> for Error {
    fn from(err: wicket_protocol::Error) -> Self {
        match err {
            wicket_protocol::Error::MalformedParameters { field, reason } => {
                Error::MalformedParameters { field, reason }
            }
            wicket_protocol::Error::Io(e) => Error::Io(e),
            other => Error::Transport(other.to_string()),
        }
    }
}
