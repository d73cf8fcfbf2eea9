//! Error types for the chat server.

use std::io;
use std::path::PathBuf;

use chat_protocol::ProtocolError;
use thiserror::Error;

use crate::types::Endpoint;

/// Failure of a single session operation.
///
/// None of these escape the owning session task; callers log them and,
/// for fatal ones, tear the session down.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Retry budget exhausted without a matching acknowledgment.
    #[error("{endpoint} did not confirm message {message_id} after {attempts} attempts")]
    Unreachable {
        endpoint: Endpoint,
        message_id: u16,
        attempts: u32,
    },

    /// The peer fell too far behind; its outbox is full.
    #[error("{endpoint} is not keeping up, outbox full")]
    Backlogged { endpoint: Endpoint },

    /// A stream write made no progress within the write timeout.
    #[error("{endpoint} stalled writing a frame")]
    Stalled { endpoint: Endpoint },

    /// Write failure on a stream connection.
    #[error("i/o error: {0}")]
    Io(#[from] io::Error),

    /// The message cannot be encoded for this transport.
    #[error("encode error: {0}")]
    Encode(#[from] ProtocolError),

    /// The session was already torn down.
    #[error("session closed")]
    Closed,

    /// Cancellation fired while the operation was in flight.
    #[error("cancelled")]
    Cancelled,
}

impl SessionError {
    /// True if the session can no longer be used and must be disconnected.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            SessionError::Unreachable { .. }
                | SessionError::Backlogged { .. }
                | SessionError::Stalled { .. }
                | SessionError::Io(_)
        )
    }
}

/// Invalid or unreadable configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config file: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid value {value:?} for {key}: {reason}")]
    Env {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Failure to hand an item to a bounded queue.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    #[error("queue closed")]
    Closed,

    #[error("cancelled while waiting for queue capacity")]
    Cancelled,
}
