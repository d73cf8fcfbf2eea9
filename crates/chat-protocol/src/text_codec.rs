//! Text codec for the stream transport.
//!
//! One message per line, keywords case-insensitive, fields separated by a
//! single space:
//!
//! - `AUTH {Username} AS {DisplayName} USING {Secret}`
//! - `JOIN {ChannelID} AS {DisplayName}`
//! - `MSG FROM {DisplayName} IS {MessageContent}`
//! - `ERR FROM {DisplayName} IS {MessageContent}`
//! - `REPLY {OK|NOK} IS {MessageContent}`
//! - `BYE` (optionally `BYE FROM {DisplayName}`)
//!
//! `MessageContent` runs to the end of the line and may contain spaces.
//! Framing (`\r\n`) is handled by [`crate::framing`]; this module works on
//! single lines without the delimiter.

use chat_core::{Auth, Bye, ChatMessage, Join, Reply, TextMessage};

use crate::error::ProtocolError;
use crate::wire_types::{
    validate_channel_id, validate_content, validate_display_name, validate_secret,
    validate_username, LINE_DELIMITER,
};

/// Parse a single line (delimiter already stripped) into a `ChatMessage`.
pub fn parse_line(line: &str) -> Result<ChatMessage, ProtocolError> {
    let (keyword, rest) = match line.split_once(' ') {
        Some((k, r)) => (k, r),
        None => (line, ""),
    };

    match keyword.to_ascii_uppercase().as_str() {
        "AUTH" => parse_auth(rest),
        "JOIN" => parse_join(rest),
        "MSG" => parse_text(rest, "MSG").map(ChatMessage::Msg),
        "ERR" => parse_text(rest, "ERR").map(ChatMessage::Err),
        "REPLY" => parse_reply(rest),
        "BYE" => parse_bye(rest),
        _ => Err(ProtocolError::UnknownKeyword(keyword.to_string())),
    }
}

/// Parse a raw frame, checking UTF-8 first.
pub fn parse_frame(frame: &[u8]) -> Result<ChatMessage, ProtocolError> {
    let line = std::str::from_utf8(frame).map_err(|_| ProtocolError::InvalidUtf8)?;
    parse_line(line)
}

fn parse_auth(rest: &str) -> Result<ChatMessage, ProtocolError> {
    // {Username} AS {DisplayName} USING {Secret}
    let tokens: Vec<&str> = rest.split(' ').collect();
    if tokens.len() != 5
        || !tokens[1].eq_ignore_ascii_case("AS")
        || !tokens[3].eq_ignore_ascii_case("USING")
    {
        return Err(ProtocolError::Malformed("AUTH"));
    }

    let auth = Auth {
        username: checked(tokens[0], validate_username, "username")?,
        display_name: checked(tokens[2], validate_display_name, "display_name")?,
        secret: checked(tokens[4], validate_secret, "secret")?,
    };
    Ok(ChatMessage::Auth(auth))
}

fn parse_join(rest: &str) -> Result<ChatMessage, ProtocolError> {
    // {ChannelID} AS {DisplayName}
    let tokens: Vec<&str> = rest.split(' ').collect();
    if tokens.len() != 3 || !tokens[1].eq_ignore_ascii_case("AS") {
        return Err(ProtocolError::Malformed("JOIN"));
    }

    Ok(ChatMessage::Join(Join {
        channel_id: checked(tokens[0], validate_channel_id, "channel_id")?,
        display_name: checked(tokens[2], validate_display_name, "display_name")?,
    }))
}

fn parse_text(rest: &str, what: &'static str) -> Result<TextMessage, ProtocolError> {
    // FROM {DisplayName} IS {MessageContent}
    let mut parts = rest.splitn(4, ' ');
    let (from, name, is, content) = match (parts.next(), parts.next(), parts.next(), parts.next()) {
        (Some(f), Some(n), Some(i), Some(c)) => (f, n, i, c),
        _ => return Err(ProtocolError::Malformed(what)),
    };
    if !from.eq_ignore_ascii_case("FROM") || !is.eq_ignore_ascii_case("IS") {
        return Err(ProtocolError::Malformed(what));
    }

    Ok(TextMessage {
        display_name: checked(name, validate_display_name, "display_name")?,
        content: checked(content, validate_content, "content")?,
    })
}

fn parse_reply(rest: &str) -> Result<ChatMessage, ProtocolError> {
    // {OK|NOK} IS {MessageContent}
    let mut parts = rest.splitn(3, ' ');
    let (status, is, content) = match (parts.next(), parts.next(), parts.next()) {
        (Some(s), Some(i), Some(c)) => (s, i, c),
        _ => return Err(ProtocolError::Malformed("REPLY")),
    };
    if !is.eq_ignore_ascii_case("IS") {
        return Err(ProtocolError::Malformed("REPLY"));
    }

    let ok = if status.eq_ignore_ascii_case("OK") {
        true
    } else if status.eq_ignore_ascii_case("NOK") {
        false
    } else {
        return Err(ProtocolError::InvalidField("result"));
    };

    Ok(ChatMessage::Reply(Reply {
        ok,
        ref_message_id: 0,
        content: checked(content, validate_content, "content")?,
    }))
}

fn parse_bye(rest: &str) -> Result<ChatMessage, ProtocolError> {
    if rest.is_empty() {
        return Ok(ChatMessage::Bye(Bye::default()));
    }

    match rest.split_once(' ') {
        Some((from, name)) if from.eq_ignore_ascii_case("FROM") => Ok(ChatMessage::Bye(Bye {
            display_name: Some(checked(name, validate_display_name, "display_name")?),
        })),
        _ => Err(ProtocolError::Malformed("BYE")),
    }
}

fn checked(
    value: &str,
    validate: fn(&str) -> bool,
    field: &'static str,
) -> Result<String, ProtocolError> {
    if validate(value) {
        Ok(value.to_string())
    } else {
        Err(ProtocolError::InvalidField(field))
    }
}

/// Format a `ChatMessage` as a single line, without the delimiter.
pub fn format_line(msg: &ChatMessage) -> Result<String, ProtocolError> {
    let line = match msg {
        ChatMessage::Auth(a) => format!(
            "AUTH {} AS {} USING {}",
            a.username, a.display_name, a.secret
        ),
        ChatMessage::Join(j) => format!("JOIN {} AS {}", j.channel_id, j.display_name),
        ChatMessage::Msg(m) => format!("MSG FROM {} IS {}", m.display_name, m.content),
        ChatMessage::Err(m) => format!("ERR FROM {} IS {}", m.display_name, m.content),
        ChatMessage::Reply(r) => {
            let status = if r.ok { "OK" } else { "NOK" };
            format!("REPLY {} IS {}", status, r.content)
        }
        ChatMessage::Bye(b) => match &b.display_name {
            Some(name) => format!("BYE FROM {}", name),
            None => "BYE".to_string(),
        },
        ChatMessage::Confirm(_) => return Err(ProtocolError::Unsupported("CONFIRM")),
    };

    // Anything the parser would reject must not go out either.
    if line.bytes().any(|b| b == b'\r' || b == b'\n') {
        return Err(ProtocolError::InvalidField("content"));
    }
    Ok(line)
}

/// Encode a message as a complete stream frame (line + `\r\n`).
///
/// The encoded bytes are appended to `out`.
pub fn encode_line(msg: &ChatMessage, out: &mut Vec<u8>) -> Result<(), ProtocolError> {
    let line = format_line(msg)?;
    out.extend_from_slice(line.as_bytes());
    out.extend_from_slice(LINE_DELIMITER);
    Ok(())
}
