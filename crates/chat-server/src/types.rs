//! Shared types for the chat server.
//!
//! This module defines:
//! - `Endpoint`: transport + remote address, the registry key
//! - `Envelope`: a decoded inbound message paired with its session
//! - `ChannelBroadcast`: a message addressed to every member of a channel
//! - queue aliases between transports, the chat worker and the dispatcher
//! - `ServerContext`: the handles every component is given explicitly

use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;

use chat_core::ChatMessage;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::registry::Registry;
use crate::session::Session;

/// Which transport a session arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Transport {
    Stream,
    Datagram,
}

/// Transport-level identity of a peer.
///
/// TCP and UDP may legitimately share an `ip:port`, so the transport is
/// part of the key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub transport: Transport,
    pub addr: SocketAddr,
}

impl Endpoint {
    pub fn stream(addr: SocketAddr) -> Self {
        Endpoint {
            transport: Transport::Stream,
            addr,
        }
    }

    pub fn datagram(addr: SocketAddr) -> Self {
        Endpoint {
            transport: Transport::Datagram,
            addr,
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.addr)
    }
}

/// A live session, whichever transport it uses.
pub type SessionRef = Arc<dyn Session>;

/// Message flowing from a transport into the chat worker.
#[derive(Debug)]
pub struct Envelope {
    pub session: SessionRef,

    /// Transport message id (always `0` on the stream transport).
    pub message_id: u16,

    pub message: ChatMessage,
}

/// Message flowing from anywhere into the broadcast dispatcher.
#[derive(Debug, Clone)]
pub struct ChannelBroadcast {
    pub channel_id: String,

    /// Session excluded from the fan-out (usually the author).
    pub origin: Option<Endpoint>,

    pub message: ChatMessage,
}

/// Channel from transports → chat worker.
pub type InboundTx = mpsc::Sender<Envelope>;
pub type InboundRx = mpsc::Receiver<Envelope>;

/// Per-session outbox feeding that session's writer task.
pub type OutboundTx = mpsc::Sender<ChatMessage>;
pub type OutboundRx = mpsc::Receiver<ChatMessage>;

/// Channel from chat worker / sessions → broadcast dispatcher.
pub type BroadcastTx = mpsc::Sender<ChannelBroadcast>;
pub type BroadcastRx = mpsc::Receiver<ChannelBroadcast>;

/// Handles shared by listeners, sessions and workers.
#[derive(Debug, Clone)]
pub struct ServerContext {
    pub config: Arc<Config>,
    pub registry: Registry,
    pub inbound: InboundTx,
    pub broadcasts: BroadcastTx,

    /// Root cancellation; fires once on server shutdown.
    pub shutdown: CancellationToken,
}

/// Asks a listener to stop admitting new peers.
///
/// Established sessions keep running.
#[derive(Debug, Clone)]
pub struct StopHandle(CancellationToken);

impl StopHandle {
    pub(crate) fn new(token: CancellationToken) -> Self {
        StopHandle(token)
    }

    pub fn stop(&self) {
        self.0.cancel();
    }
}
