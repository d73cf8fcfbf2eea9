//! chat-server
//!
//! Async chat server speaking the same protocol over two transports:
//! CRLF-framed text over TCP and binary datagrams with confirm/retransmit
//! reliability over UDP. Both feed one chat loop and one broadcast loop.

pub mod config;
pub mod error;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

mod broadcast_task;
mod chat_task;
mod datagram_server;
mod queue;
mod stream_server;
mod traffic;

pub use config::Config;
pub use server::{Server, ServerHandle};
