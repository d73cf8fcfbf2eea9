//! Traffic log: one line per message crossing the wire.

use std::fmt;

use chat_core::ChatMessage;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Recv,
    Send,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Recv => f.write_str("RECV"),
            Direction::Send => f.write_str("SEND"),
        }
    }
}

/// Record a message as `RECV 127.0.0.1:5000 | MSG`.
pub fn log_io(direction: Direction, peer: impl fmt::Display, msg: &ChatMessage) {
    info!(target: "chat::traffic", "{} {} | {}", direction, peer, msg.kind());
}
