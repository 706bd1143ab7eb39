use std::net::SocketAddr;
use thiserror::Error;

/// Errors raised by the subscriber transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Failed to bind the listener
    #[error("Failed to bind to {addr}: {source}")]
    BindFailed {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// Low-level I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Line framing or JSON encoding failed
    #[error("Codec error: {0}")]
    Codec(String),
}

impl From<tokio_util::codec::LinesCodecError> for TransportError {
    fn from(err: tokio_util::codec::LinesCodecError) -> Self {
        match err {
            tokio_util::codec::LinesCodecError::Io(e) => Self::Io(e),
            other => Self::Codec(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for TransportError {
    fn from(err: serde_json::Error) -> Self {
        Self::Codec(err.to_string())
    }
}

impl From<TransportError> for taglink_core::Error {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Io(e) => Self::Io(e),
            other => Self::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransportError>;
