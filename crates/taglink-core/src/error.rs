use thiserror::Error;

/// Workspace-wide error taxonomy.
///
/// Each crate keeps its own detailed error enum and converts into this one
/// at the boundaries where callers only care about the failure class.
#[derive(Error, Debug)]
pub enum Error {
    // Reader link errors
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Reader already connected")]
    AlreadyConnected,

    // Data errors
    #[error("Malformed reading: {0}")]
    MalformedReading(String),

    // Fan-out errors
    #[error("Delivery to subscriber {subscriber} failed: {reason}")]
    Delivery { subscriber: String, reason: String },

    // Store errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, Error>;
