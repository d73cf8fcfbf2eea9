//! chat-protocol
//!
//! Wire-level encoding/decoding for the chat server.
//!
//! This crate is responsible for turning logical chat messages
//! (`chat_core::ChatMessage`) into bytes and back again.
//!
//! - [`text_codec`]   : CRLF-delimited text lines (stream transport)
//! - [`binary_codec`] : binary datagrams with message ids (datagram transport)
//! - [`framing`]      : incremental reassembly of text lines from a byte stream

pub mod wire_types;
pub mod error;
pub mod framing;
pub mod text_codec;
pub mod binary_codec;

pub use error::ProtocolError;
pub use framing::LineFramer;
pub use binary_codec::{decode_datagram, encode_datagram, Datagram};
pub use text_codec::{encode_line, format_line, parse_frame, parse_line};
