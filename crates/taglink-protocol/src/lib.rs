//! LLRP message framing.
//!
//! Only the 10-byte message header is interpreted here; message bodies
//! (parameters, TLVs) are carried as opaque payload bytes and decoded by
//! the hardware layer's report decoder.

pub mod codec;
pub mod error;
pub mod frame;
pub mod message_type;

pub use codec::LlrpCodec;
pub use error::{ProtocolError, Result};
pub use frame::{HEADER_LEN, LLRP_VERSION, LlrpFrame};
pub use message_type::MessageType;
