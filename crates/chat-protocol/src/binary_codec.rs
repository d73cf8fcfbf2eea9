//! Binary encoding/decoding for the datagram transport.
//!
//! Framing model (one message per datagram):
//!
//! ```text
//! [0]    : msg_type (WireType as u8)
//! [1..3] : message_id (u16 BE)
//! [3..]  : body (depends on msg_type), strings NUL-terminated
//!
//! CONFIRM (0x00):  [no body] header id = confirmed message id
//! REPLY   (0x01):  result (u8, 1 = OK) | ref_message_id (u16 BE) | content\0
//! AUTH    (0x02):  username\0 | display_name\0 | secret\0
//! JOIN    (0x03):  channel_id\0 | display_name\0
//! MSG     (0x04):  display_name\0 | content\0
//! ERR     (0xFE):  display_name\0 | content\0
//! BYE     (0xFF):  [optional display_name\0]
//! ```

use chat_core::{Auth, Bye, ChatMessage, Confirm, Join, Reply, TextMessage};

use crate::error::ProtocolError;
use crate::wire_types::{
    validate_channel_id, validate_content, validate_display_name, validate_secret,
    validate_username, WireType, DATAGRAM_HEADER_LEN,
};

/// A decoded datagram: header id plus logical message.
///
/// For `Confirm` the header id equals `Confirm::ref_message_id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Datagram {
    pub message_id: u16,
    pub message: ChatMessage,
}

/// Decode a single datagram.
pub fn decode_datagram(buf: &[u8]) -> Result<Datagram, ProtocolError> {
    if buf.len() < DATAGRAM_HEADER_LEN {
        return Err(ProtocolError::Truncated);
    }

    let msg_type = buf[0];
    let message_id = u16::from_be_bytes([buf[1], buf[2]]);
    let wire_type = WireType::from_u8(msg_type).ok_or(ProtocolError::UnknownMessageType(msg_type))?;

    let mut body = Cursor::new(&buf[DATAGRAM_HEADER_LEN..]);

    let message = match wire_type {
        WireType::Confirm => ChatMessage::Confirm(Confirm {
            ref_message_id: message_id,
        }),
        WireType::Reply => {
            let ok = match body.u8()? {
                0 => false,
                1 => true,
                _ => return Err(ProtocolError::InvalidField("result")),
            };
            let ref_message_id = body.u16_be()?;
            let content = body.string(validate_content, "content")?;
            ChatMessage::Reply(Reply {
                ok,
                ref_message_id,
                content,
            })
        }
        WireType::Auth => ChatMessage::Auth(Auth {
            username: body.string(validate_username, "username")?,
            display_name: body.string(validate_display_name, "display_name")?,
            secret: body.string(validate_secret, "secret")?,
        }),
        WireType::Join => ChatMessage::Join(Join {
            channel_id: body.string(validate_channel_id, "channel_id")?,
            display_name: body.string(validate_display_name, "display_name")?,
        }),
        WireType::Msg => ChatMessage::Msg(decode_text(&mut body)?),
        WireType::Err => ChatMessage::Err(decode_text(&mut body)?),
        WireType::Bye => {
            let display_name = if body.is_empty() {
                None
            } else {
                Some(body.string(validate_display_name, "display_name")?)
            };
            ChatMessage::Bye(Bye { display_name })
        }
    };

    Ok(Datagram {
        message_id,
        message,
    })
}

fn decode_text(body: &mut Cursor<'_>) -> Result<TextMessage, ProtocolError> {
    Ok(TextMessage {
        display_name: body.string(validate_display_name, "display_name")?,
        content: body.string(validate_content, "content")?,
    })
}

/// Encode a single message as a datagram carrying `message_id`.
///
/// `Confirm` ignores `message_id` and puts its `ref_message_id` in the
/// header. The encoded bytes are appended to `out`.
pub fn encode_datagram(
    msg: &ChatMessage,
    message_id: u16,
    out: &mut Vec<u8>,
) -> Result<(), ProtocolError> {
    match msg {
        ChatMessage::Confirm(c) => {
            put_header(out, WireType::Confirm, c.ref_message_id);
        }
        ChatMessage::Reply(r) => {
            put_header(out, WireType::Reply, message_id);
            out.push(u8::from(r.ok));
            out.extend_from_slice(&r.ref_message_id.to_be_bytes());
            put_string(out, &r.content, validate_content, "content")?;
        }
        ChatMessage::Auth(a) => {
            put_header(out, WireType::Auth, message_id);
            put_string(out, &a.username, validate_username, "username")?;
            put_string(out, &a.display_name, validate_display_name, "display_name")?;
            put_string(out, &a.secret, validate_secret, "secret")?;
        }
        ChatMessage::Join(j) => {
            put_header(out, WireType::Join, message_id);
            put_string(out, &j.channel_id, validate_channel_id, "channel_id")?;
            put_string(out, &j.display_name, validate_display_name, "display_name")?;
        }
        ChatMessage::Msg(m) => {
            put_header(out, WireType::Msg, message_id);
            put_text(out, m)?;
        }
        ChatMessage::Err(m) => {
            put_header(out, WireType::Err, message_id);
            put_text(out, m)?;
        }
        ChatMessage::Bye(b) => {
            put_header(out, WireType::Bye, message_id);
            if let Some(name) = &b.display_name {
                put_string(out, name, validate_display_name, "display_name")?;
            }
        }
    }
    Ok(())
}

fn put_header(out: &mut Vec<u8>, wire_type: WireType, message_id: u16) {
    out.push(wire_type as u8);
    out.extend_from_slice(&message_id.to_be_bytes());
}

fn put_text(out: &mut Vec<u8>, m: &TextMessage) -> Result<(), ProtocolError> {
    put_string(out, &m.display_name, validate_display_name, "display_name")?;
    put_string(out, &m.content, validate_content, "content")
}

fn put_string(
    out: &mut Vec<u8>,
    value: &str,
    validate: fn(&str) -> bool,
    field: &'static str,
) -> Result<(), ProtocolError> {
    if !validate(value) {
        return Err(ProtocolError::InvalidField(field));
    }
    out.extend_from_slice(value.as_bytes());
    out.push(0);
    Ok(())
}

// -----------------------------------------------------------------------------
// Helpers
// -----------------------------------------------------------------------------

struct Cursor<'a> {
    buf: &'a [u8],
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Cursor { buf }
    }

    fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    fn u8(&mut self) -> Result<u8, ProtocolError> {
        let (&b, rest) = self.buf.split_first().ok_or(ProtocolError::Truncated)?;
        self.buf = rest;
        Ok(b)
    }

    fn u16_be(&mut self) -> Result<u16, ProtocolError> {
        if self.buf.len() < 2 {
            return Err(ProtocolError::Truncated);
        }
        let v = u16::from_be_bytes([self.buf[0], self.buf[1]]);
        self.buf = &self.buf[2..];
        Ok(v)
    }

    /// Read a NUL-terminated string and validate it.
    fn string(
        &mut self,
        validate: fn(&str) -> bool,
        field: &'static str,
    ) -> Result<String, ProtocolError> {
        let nul = self
            .buf
            .iter()
            .position(|&b| b == 0)
            .ok_or(ProtocolError::Truncated)?;
        let s = std::str::from_utf8(&self.buf[..nul]).map_err(|_| ProtocolError::InvalidField(field))?;
        if !validate(s) {
            return Err(ProtocolError::InvalidField(field));
        }
        self.buf = &self.buf[nul + 1..];
        Ok(s.to_string())
    }
}
