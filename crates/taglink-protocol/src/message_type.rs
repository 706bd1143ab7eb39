//! LLRP message type codes.
//!
//! The set below covers the messages the reader link exchanges during a
//! session. Any other code is preserved as [`MessageType::Other`] so frames
//! can still be passed through untouched.
//!
//! ```text
//! reader -> client   READER_EVENT_NOTIFICATION (63)   connection attempt result
//! reader -> client   KEEPALIVE (62)                   must be answered
//! client -> reader   KEEPALIVE_ACK (72)
//! reader -> client   RO_ACCESS_REPORT (61)            tag report batch
//! client -> reader   CLOSE_CONNECTION (14)
//! reader -> client   CLOSE_CONNECTION_RESPONSE (4)
//! ```

use std::fmt;

/// LLRP message type (10-bit code from the message header).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MessageType {
    GetReaderCapabilities,
    SetReaderConfig,
    CloseConnectionResponse,
    CloseConnection,
    AddRospec,
    StartRospec,
    EnableRospec,
    RoAccessReport,
    Keepalive,
    ReaderEventNotification,
    KeepaliveAck,
    ErrorMessage,
    Other(u16),
}

impl MessageType {
    /// Numeric type code.
    pub fn code(&self) -> u16 {
        match self {
            Self::GetReaderCapabilities => 1,
            Self::SetReaderConfig => 3,
            Self::CloseConnectionResponse => 4,
            Self::CloseConnection => 14,
            Self::AddRospec => 20,
            Self::StartRospec => 22,
            Self::EnableRospec => 24,
            Self::RoAccessReport => 61,
            Self::Keepalive => 62,
            Self::ReaderEventNotification => 63,
            Self::KeepaliveAck => 72,
            Self::ErrorMessage => 100,
            Self::Other(code) => *code,
        }
    }

    /// Map a numeric code to a message type.
    pub fn from_code(code: u16) -> Self {
        match code {
            1 => Self::GetReaderCapabilities,
            3 => Self::SetReaderConfig,
            4 => Self::CloseConnectionResponse,
            14 => Self::CloseConnection,
            20 => Self::AddRospec,
            22 => Self::StartRospec,
            24 => Self::EnableRospec,
            61 => Self::RoAccessReport,
            62 => Self::Keepalive,
            63 => Self::ReaderEventNotification,
            72 => Self::KeepaliveAck,
            100 => Self::ErrorMessage,
            other => Self::Other(other),
        }
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Self::GetReaderCapabilities => "GET_READER_CAPABILITIES",
            Self::SetReaderConfig => "SET_READER_CONFIG",
            Self::CloseConnectionResponse => "CLOSE_CONNECTION_RESPONSE",
            Self::CloseConnection => "CLOSE_CONNECTION",
            Self::AddRospec => "ADD_ROSPEC",
            Self::StartRospec => "START_ROSPEC",
            Self::EnableRospec => "ENABLE_ROSPEC",
            Self::RoAccessReport => "RO_ACCESS_REPORT",
            Self::Keepalive => "KEEPALIVE",
            Self::ReaderEventNotification => "READER_EVENT_NOTIFICATION",
            Self::KeepaliveAck => "KEEPALIVE_ACK",
            Self::ErrorMessage => "ERROR_MESSAGE",
            Self::Other(code) => return write!(f, "MESSAGE_{code}"),
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(MessageType::CloseConnection, 14)]
    #[case(MessageType::RoAccessReport, 61)]
    #[case(MessageType::Keepalive, 62)]
    #[case(MessageType::ReaderEventNotification, 63)]
    #[case(MessageType::KeepaliveAck, 72)]
    fn test_known_codes(#[case] message_type: MessageType, #[case] code: u16) {
        assert_eq!(message_type.code(), code);
        assert_eq!(MessageType::from_code(code), message_type);
    }

    #[test]
    fn test_unknown_code_is_preserved() {
        let message_type = MessageType::from_code(1023);
        assert_eq!(message_type, MessageType::Other(1023));
        assert_eq!(message_type.code(), 1023);
        assert_eq!(message_type.to_string(), "MESSAGE_1023");
    }

    #[test]
    fn test_display() {
        assert_eq!(MessageType::Keepalive.to_string(), "KEEPALIVE");
        assert_eq!(MessageType::RoAccessReport.to_string(), "RO_ACCESS_REPORT");
    }
}
