//! Message types used by the chat core.
//!
//! These are **transport-agnostic** logical messages. The stream
//! transport carries them as CRLF-terminated text lines, the datagram
//! transport as binary frames with an explicit message id; both decode
//! into the same [`ChatMessage`].
//!
//! Note: text / binary encoders live in the `chat-protocol` crate;
//! this module is purely logical.

use std::fmt;

/// A single chat protocol message, in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatMessage {
    /// Authenticate and pick a display name.
    Auth(Auth),

    /// Move to another channel.
    Join(Join),

    /// Chat text addressed to the current channel.
    Msg(TextMessage),

    /// Error notification; the sender is about to leave.
    Err(TextMessage),

    /// Server answer to `Auth` / `Join`.
    Reply(Reply),

    /// Graceful goodbye.
    Bye(Bye),

    /// Datagram acknowledgment. Never produced by the stream codec.
    Confirm(Confirm),
}

/// `AUTH {username} AS {display_name} USING {secret}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Auth {
    pub username: String,
    pub display_name: String,
    pub secret: String,
}

/// `JOIN {channel_id} AS {display_name}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Join {
    pub channel_id: String,
    pub display_name: String,
}

/// Body shared by `MSG` and `ERR`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextMessage {
    pub display_name: String,
    pub content: String,
}

/// `REPLY {OK|NOK} IS {content}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub ok: bool,

    /// Id of the inbound message this reply answers.
    ///
    /// Only meaningful on the datagram transport; the text encoding
    /// has no place for it and decodes it as `0`.
    pub ref_message_id: u16,

    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Bye {
    pub display_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Confirm {
    pub ref_message_id: u16,
}

/// Discriminant of a [`ChatMessage`], used for traffic logs.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum MessageKind {
    Auth,
    Join,
    Msg,
    Err,
    Reply,
    Bye,
    Confirm,
}

impl MessageKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MessageKind::Auth => "AUTH",
            MessageKind::Join => "JOIN",
            MessageKind::Msg => "MSG",
            MessageKind::Err => "ERR",
            MessageKind::Reply => "REPLY",
            MessageKind::Bye => "BYE",
            MessageKind::Confirm => "CONFIRM",
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl ChatMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            ChatMessage::Auth(_) => MessageKind::Auth,
            ChatMessage::Join(_) => MessageKind::Join,
            ChatMessage::Msg(_) => MessageKind::Msg,
            ChatMessage::Err(_) => MessageKind::Err,
            ChatMessage::Reply(_) => MessageKind::Reply,
            ChatMessage::Bye(_) => MessageKind::Bye,
            ChatMessage::Confirm(_) => MessageKind::Confirm,
        }
    }

    /// Convenience constructor for a `MSG`.
    pub fn msg(display_name: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Msg(TextMessage {
            display_name: display_name.into(),
            content: content.into(),
        })
    }

    /// Convenience constructor for an `ERR`.
    pub fn err(display_name: impl Into<String>, content: impl Into<String>) -> Self {
        ChatMessage::Err(TextMessage {
            display_name: display_name.into(),
            content: content.into(),
        })
    }

    pub fn reply(ok: bool, ref_message_id: u16, content: impl Into<String>) -> Self {
        ChatMessage::Reply(Reply {
            ok,
            ref_message_id,
            content: content.into(),
        })
    }

    pub fn bye() -> Self {
        ChatMessage::Bye(Bye::default())
    }
}
