//! Low-level wire types and constants.
//!
//! This module defines:
//! - Message type IDs for datagram frames.
//! - The stream frame delimiter.
//! - Field length limits and validators shared by both codecs.
//!
//! The actual encode/decode logic lives in `text_codec` / `binary_codec`.

/// Stream transport frame delimiter.
pub const LINE_DELIMITER: &[u8; 2] = b"\r\n";

/// Size of the datagram header: `[type: u8][message_id: u16 BE]`.
pub const DATAGRAM_HEADER_LEN: usize = 3;

/// Datagram message types.
///
/// These IDs are used in the first byte of each binary frame.
#[repr(u8)]
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum WireType {
    /// Acknowledgment; the header id is the confirmed message id.
    Confirm = 0x00,

    Reply = 0x01,

    Auth = 0x02,

    Join = 0x03,

    Msg = 0x04,

    Err = 0xFE,

    Bye = 0xFF,
}

impl WireType {
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0x00 => Some(WireType::Confirm),
            0x01 => Some(WireType::Reply),
            0x02 => Some(WireType::Auth),
            0x03 => Some(WireType::Join),
            0x04 => Some(WireType::Msg),
            0xFE => Some(WireType::Err),
            0xFF => Some(WireType::Bye),
            _ => None,
        }
    }
}

pub const MAX_USERNAME_LEN: usize = 20;
pub const MAX_CHANNEL_ID_LEN: usize = 20;
pub const MAX_SECRET_LEN: usize = 128;
pub const MAX_DISPLAY_NAME_LEN: usize = 20;
pub const MAX_CONTENT_LEN: usize = 1400;

fn is_id_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-' || c == '.'
}

/// `[A-Za-z0-9_.-]{1,20}`
pub fn validate_username(s: &str) -> bool {
    (1..=MAX_USERNAME_LEN).contains(&s.len()) && s.chars().all(is_id_char)
}

/// Same alphabet as usernames.
pub fn validate_channel_id(s: &str) -> bool {
    (1..=MAX_CHANNEL_ID_LEN).contains(&s.len()) && s.chars().all(is_id_char)
}

/// `[A-Za-z0-9_-]{1,128}`
pub fn validate_secret(s: &str) -> bool {
    (1..=MAX_SECRET_LEN).contains(&s.len())
        && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
}

/// Printable ASCII without spaces, 1..=20.
pub fn validate_display_name(s: &str) -> bool {
    (1..=MAX_DISPLAY_NAME_LEN).contains(&s.len()) && s.bytes().all(|b| (0x21..=0x7E).contains(&b))
}

/// Printable ASCII including spaces, 1..=1400.
pub fn validate_content(s: &str) -> bool {
    (1..=MAX_CONTENT_LEN).contains(&s.len()) && s.bytes().all(|b| (0x20..=0x7E).contains(&b))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_type_roundtrips_known_ids() {
        for t in [
            WireType::Confirm,
            WireType::Reply,
            WireType::Auth,
            WireType::Join,
            WireType::Msg,
            WireType::Err,
            WireType::Bye,
        ] {
            assert_eq!(WireType::from_u8(t as u8), Some(t));
        }
        assert_eq!(WireType::from_u8(0x42), None);
    }

    #[test]
    fn field_validators() {
        assert!(validate_username("alice_01"));
        assert!(!validate_username(""));
        assert!(!validate_username("has space"));
        assert!(!validate_username(&"a".repeat(21)));

        assert!(validate_display_name("Al!ce"));
        assert!(!validate_display_name("Al ice"));

        assert!(validate_content("hello there, world"));
        assert!(!validate_content("tab\there"));
        assert!(!validate_content(""));

        assert!(validate_secret("abc-123"));
        assert!(!validate_secret("abc.123"));
    }
}
