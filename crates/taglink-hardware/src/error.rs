//! Reader driver errors.

use taglink_protocol::ProtocolError;

pub type Result<T> = std::result::Result<T, HardwareError>;

#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// The reader did not finish the handshake in time.
    #[error("Operation timeout after {duration_ms}ms")]
    Timeout { duration_ms: u64 },

    /// TCP connect refused, reset or answered with a failing status.
    #[error("Connection to {address} failed: {message}")]
    ConnectionFailed { address: String, message: String },

    #[error("Invalid reader address: {0}")]
    InvalidAddress(String),

    /// Driver used out of order, e.g. connect before a callback is set.
    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl HardwareError {
    pub fn timeout(duration_ms: u64) -> Self {
        Self::Timeout { duration_ms }
    }

    pub fn connection_failed(address: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConnectionFailed {
            address: address.into(),
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::ConfigurationError {
            message: message.into(),
        }
    }
}

impl From<HardwareError> for taglink_core::Error {
    fn from(err: HardwareError) -> Self {
        taglink_core::Error::Connection(err.to_string())
    }
}
