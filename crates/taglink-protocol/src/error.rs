use thiserror::Error;

/// Errors raised while framing LLRP messages.
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("Frame too large: {size} bytes (max: {max_size})")]
    FrameTooLarge { size: usize, max_size: usize },

    #[error("Unsupported LLRP version: {0}")]
    UnsupportedVersion(u8),

    #[error("Invalid message length {length}: shorter than the {header_len}-byte header")]
    InvalidLength { length: u32, header_len: usize },

    #[error("Stream ended inside a frame ({remaining} bytes left)")]
    Truncated { remaining: usize },

    #[error("Message type {0} does not fit in 10 bits")]
    InvalidMessageType(u16),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
