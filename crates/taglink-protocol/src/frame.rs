//! LLRP frame representation.
//!
//! # Wire format
//!
//! ```text
//!  0                   1                   2                   3
//! +-----+-------+-------------------+-------------------------------+
//! | rsv | ver   | message type      | message length (incl. header) |
//! | 3b  | 3b    | 10b               | 32b                           |
//! +-----+-------+-------------------+-------------------------------+
//! | message id (32b)                | payload ...                   |
//! +---------------------------------+-------------------------------+
//! ```
//!
//! All integers are big-endian.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{ProtocolError, Result};
use crate::message_type::MessageType;

/// Size of the fixed LLRP message header in bytes.
pub const HEADER_LEN: usize = 10;

/// Protocol version carried in every header (LLRP 1.0.1).
pub const LLRP_VERSION: u8 = 1;

const VERSION_SHIFT: u16 = 10;
const VERSION_MASK: u16 = 0b111;
const TYPE_MASK: u16 = 0x03FF;

/// One LLRP message: decoded header plus opaque payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlrpFrame {
    pub version: u8,
    pub message_type: MessageType,
    pub message_id: u32,
    pub payload: Bytes,
}

impl LlrpFrame {
    /// Create a version-1 frame.
    pub fn new(message_type: MessageType, message_id: u32, payload: impl Into<Bytes>) -> Self {
        Self {
            version: LLRP_VERSION,
            message_type,
            message_id,
            payload: payload.into(),
        }
    }

    /// `KEEPALIVE_ACK` answering the keepalive with `message_id`.
    pub fn keepalive_ack(message_id: u32) -> Self {
        Self::new(MessageType::KeepaliveAck, message_id, Bytes::new())
    }

    /// `CLOSE_CONNECTION` request.
    pub fn close_connection(message_id: u32) -> Self {
        Self::new(MessageType::CloseConnection, message_id, Bytes::new())
    }

    /// Total encoded size, header included.
    pub fn encoded_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Write header and payload into `dst`.
    ///
    /// # Errors
    ///
    /// Fails when the type code does not fit in 10 bits or the frame is
    /// longer than a 32-bit length field can express.
    pub fn write_to(&self, dst: &mut BytesMut) -> Result<()> {
        let code = self.message_type.code();
        if code > TYPE_MASK {
            return Err(ProtocolError::InvalidMessageType(code));
        }

        let length = u32::try_from(self.encoded_len()).map_err(|_| ProtocolError::FrameTooLarge {
            size: self.encoded_len(),
            max_size: u32::MAX as usize,
        })?;

        let first = ((u16::from(self.version) & VERSION_MASK) << VERSION_SHIFT) | code;

        dst.reserve(self.encoded_len());
        dst.put_u16(first);
        dst.put_u32(length);
        dst.put_u32(self.message_id);
        dst.extend_from_slice(&self.payload);
        Ok(())
    }
}

/// Header fields parsed from the first [`HEADER_LEN`] bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub version: u8,
    pub message_type: MessageType,
    pub length: u32,
    pub message_id: u32,
}

impl Header {
    /// Parse a header; the caller guarantees at least [`HEADER_LEN`] bytes.
    pub(crate) fn parse(src: &[u8]) -> Self {
        let first = u16::from_be_bytes([src[0], src[1]]);
        Self {
            version: ((first >> VERSION_SHIFT) & VERSION_MASK) as u8,
            message_type: MessageType::from_code(first & TYPE_MASK),
            length: u32::from_be_bytes([src[2], src[3], src[4], src[5]]),
            message_id: u32::from_be_bytes([src[6], src[7], src[8], src[9]]),
        }
    }
}
