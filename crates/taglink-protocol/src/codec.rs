//! Tokio codec for LLRP message framing.
//!
//! `LlrpCodec` splits a reader byte stream into [`LlrpFrame`]s using the
//! length field of the 10-byte header, and writes frames back with a
//! correct header. It is meant to be used with `tokio_util::codec::Framed`:
//!
//! ```rust,no_run
//! use futures::{SinkExt, StreamExt};
//! use tokio::net::TcpStream;
//! use tokio_util::codec::Framed;
//! use taglink_protocol::{LlrpCodec, LlrpFrame, MessageType};
//!
//! # async fn example() -> taglink_protocol::Result<()> {
//! let stream = TcpStream::connect("192.168.1.100:5084").await?;
//! let mut framed = Framed::new(stream, LlrpCodec::new());
//!
//! while let Some(frame) = framed.next().await {
//!     let frame = frame?;
//!     if frame.message_type == MessageType::Keepalive {
//!         framed.send(LlrpFrame::keepalive_ack(frame.message_id)).await?;
//!     }
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # DoS Protection
//!
//! A declared length above `max_frame_size` (default 1 MB) is rejected as
//! soon as the header is read, before any payload is buffered.

use bytes::{Buf, BytesMut};
use tokio_util::codec::{Decoder, Encoder};
use tracing::trace;

use crate::error::{ProtocolError, Result};
use crate::frame::{HEADER_LEN, Header, LLRP_VERSION, LlrpFrame};

/// Default maximum frame size in bytes (1 MB).
///
/// Large inventories produce big `RO_ACCESS_REPORT`s, but nothing close to
/// this.
const DEFAULT_MAX_FRAME_SIZE: usize = 1024 * 1024;

/// Tokio codec for LLRP frames.
#[derive(Debug, Clone)]
pub struct LlrpCodec {
    max_frame_size: usize,
}

impl LlrpCodec {
    /// Create a codec with the default maximum frame size.
    pub fn new() -> Self {
        Self {
            max_frame_size: DEFAULT_MAX_FRAME_SIZE,
        }
    }

    /// Create a codec with a custom maximum frame size.
    ///
    /// ```
    /// use taglink_protocol::LlrpCodec;
    ///
    /// let codec = LlrpCodec::with_max_frame_size(64 * 1024);
    /// assert_eq!(codec.max_frame_size(), 64 * 1024);
    /// ```
    pub fn with_max_frame_size(max_frame_size: usize) -> Self {
        Self { max_frame_size }
    }

    /// Current maximum frame size.
    pub fn max_frame_size(&self) -> usize {
        self.max_frame_size
    }
}

impl Default for LlrpCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for LlrpCodec {
    type Item = LlrpFrame;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        if src.len() < HEADER_LEN {
            src.reserve(HEADER_LEN - src.len());
            return Ok(None);
        }

        let header = Header::parse(&src[..HEADER_LEN]);

        if header.version != LLRP_VERSION {
            return Err(ProtocolError::UnsupportedVersion(header.version));
        }

        let length = header.length as usize;
        if length < HEADER_LEN {
            return Err(ProtocolError::InvalidLength {
                length: header.length,
                header_len: HEADER_LEN,
            });
        }
        if length > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: length,
                max_size: self.max_frame_size,
            });
        }

        if src.len() < length {
            src.reserve(length - src.len());
            return Ok(None);
        }

        src.advance(HEADER_LEN);
        let payload = src.split_to(length - HEADER_LEN).freeze();

        trace!(
            message_type = %header.message_type,
            message_id = header.message_id,
            length,
            "decoded LLRP frame"
        );

        Ok(Some(LlrpFrame {
            version: header.version,
            message_type: header.message_type,
            message_id: header.message_id,
            payload,
        }))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => Err(ProtocolError::Truncated {
                remaining: src.len(),
            }),
        }
    }
}

impl Encoder<LlrpFrame> for LlrpCodec {
    type Error = ProtocolError;

    fn encode(&mut self, item: LlrpFrame, dst: &mut BytesMut) -> Result<()> {
        if item.encoded_len() > self.max_frame_size {
            return Err(ProtocolError::FrameTooLarge {
                size: item.encoded_len(),
                max_size: self.max_frame_size,
            });
        }

        item.write_to(dst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MessageType;

    fn encode(frame: LlrpFrame) -> BytesMut {
        let mut buffer = BytesMut::new();
        LlrpCodec::new().encode(frame, &mut buffer).unwrap();
        buffer
    }

    #[test]
    fn test_codec_default() {
        assert_eq!(LlrpCodec::default().max_frame_size(), DEFAULT_MAX_FRAME_SIZE);
    }

    #[test]
    fn test_decode_complete_frame() {
        let mut buffer = encode(LlrpFrame::new(MessageType::RoAccessReport, 9, vec![1, 2, 3, 4]));

        let frame = LlrpCodec::new().decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.message_type, MessageType::RoAccessReport);
        assert_eq!(frame.message_id, 9);
        assert_eq!(&frame.payload[..], &[1, 2, 3, 4]);
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_decode_partial_header() {
        let mut buffer = BytesMut::from(&[0x04, 0x3E, 0, 0][..]);
        assert!(LlrpCodec::new().decode(&mut buffer).unwrap().is_none());
        assert_eq!(buffer.len(), 4);
    }

    #[test]
    fn test_decode_partial_payload() {
        let full = encode(LlrpFrame::new(MessageType::RoAccessReport, 1, vec![0u8; 20]));
        let mut buffer = BytesMut::from(&full[..15]);

        let mut codec = LlrpCodec::new();
        assert!(codec.decode(&mut buffer).unwrap().is_none());

        buffer.extend_from_slice(&full[15..]);
        let frame = codec.decode(&mut buffer).unwrap().unwrap();
        assert_eq!(frame.payload.len(), 20);
    }

    #[test]
    fn test_decode_multiple_frames_in_buffer() {
        let mut buffer = encode(LlrpFrame::new(MessageType::Keepalive, 1, Vec::new()));
        buffer.extend_from_slice(&encode(LlrpFrame::new(MessageType::Keepalive, 2, Vec::new())));

        let mut codec = LlrpCodec::new();
        assert_eq!(codec.decode(&mut buffer).unwrap().unwrap().message_id, 1);
        assert_eq!(codec.decode(&mut buffer).unwrap().unwrap().message_id, 2);
        assert!(codec.decode(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_decode_rejects_bad_version() {
        // version 2, type 62
        let mut buffer = BytesMut::from(&[0x08, 0x3E, 0, 0, 0, 10, 0, 0, 0, 1][..]);
        let result = LlrpCodec::new().decode(&mut buffer);
        assert!(matches!(result, Err(ProtocolError::UnsupportedVersion(2))));
    }

    #[test]
    fn test_decode_rejects_short_length() {
        let mut buffer = BytesMut::from(&[0x04, 0x3E, 0, 0, 0, 4, 0, 0, 0, 1][..]);
        let result = LlrpCodec::new().decode(&mut buffer);
        assert!(matches!(result, Err(ProtocolError::InvalidLength { length: 4, .. })));
    }

    #[test]
    fn test_decode_rejects_oversized_frame() {
        let mut codec = LlrpCodec::with_max_frame_size(64);
        let mut buffer = BytesMut::from(&[0x04, 0x3D, 0, 0, 0x10, 0, 0, 0, 0, 1][..]);
        let result = codec.decode(&mut buffer);
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { size: 4096, max_size: 64 })));
    }

    #[test]
    fn test_decode_eof_with_leftover_bytes() {
        let mut buffer = BytesMut::from(&[0x04, 0x3E, 0][..]);
        let result = LlrpCodec::new().decode_eof(&mut buffer);
        assert!(matches!(result, Err(ProtocolError::Truncated { remaining: 3 })));
    }

    #[test]
    fn test_decode_eof_clean() {
        let mut buffer = BytesMut::new();
        assert!(LlrpCodec::new().decode_eof(&mut buffer).unwrap().is_none());
    }

    #[test]
    fn test_encode_respects_max_size() {
        let mut codec = LlrpCodec::with_max_frame_size(12);
        let frame = LlrpFrame::new(MessageType::RoAccessReport, 1, vec![0u8; 8]);
        let result = codec.encode(frame, &mut BytesMut::new());
        assert!(matches!(result, Err(ProtocolError::FrameTooLarge { size: 18, max_size: 12 })));
    }
}
