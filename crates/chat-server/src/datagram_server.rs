//! UDP listener: one receive loop for every datagram peer.
//!
//! All peers share a single socket, so the loop demultiplexes by source
//! address:
//! - `CONFIRM` is routed to the peer's session and resolves its pending send,
//! - any other valid datagram from an unknown address opens a new session,
//! - application messages are confirmed, deduplicated and queued.
//!
//! Undecodable datagrams are logged and skipped. Once stopped, the loop
//! admits no new peers but keeps serving known ones until shutdown, since
//! their sender tasks still need confirmations.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chat_core::ChatMessage;
use chat_protocol::binary_codec::{self, Datagram};
use tokio::net::UdpSocket;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::queue;
use crate::session::datagram::{DatagramSession, InboundStatus, Reliability};
use crate::session::Session;
use crate::traffic::{self, Direction};
use crate::types::{Envelope, ServerContext, SessionRef, StopHandle};

/// Largest datagram we are willing to read.
const MAX_DATAGRAM_LEN: usize = 65_507;

pub struct DatagramListener {
    socket: Arc<UdpSocket>,
    ctx: ServerContext,
    reliability: Reliability,
    stop: CancellationToken,

    /// Concrete handles for the sessions this socket owns. A torn-down
    /// session stays here until its sender task has drained, then is
    /// pruned or replaced on next contact.
    sessions: HashMap<SocketAddr, Arc<DatagramSession>>,
}

impl DatagramListener {
    pub async fn bind(addr: &str, ctx: ServerContext) -> io::Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let reliability = ctx.config.reliability();
        Ok(DatagramListener {
            socket: Arc::new(socket),
            ctx,
            reliability,
            stop: CancellationToken::new(),
            sessions: HashMap::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.stop.clone())
    }

    /// Receive datagrams until the server shuts down.
    pub async fn run(mut self) {
        if let Ok(addr) = self.socket.local_addr() {
            info!("UDP listening on {}", addr);
        }

        let mut buf = vec![0u8; MAX_DATAGRAM_LEN];
        loop {
            let received = tokio::select! {
                biased;
                _ = self.ctx.shutdown.cancelled() => break,
                res = self.socket.recv_from(&mut buf) => res,
            };

            let (len, peer) = match received {
                Ok(r) => r,
                Err(e) => {
                    // e.g. ICMP port unreachable surfacing on some platforms
                    debug!("UDP receive error: {}", e);
                    continue;
                }
            };

            match binary_codec::decode_datagram(&buf[..len]) {
                Ok(datagram) => {
                    if !self.dispatch(peer, datagram).await {
                        break;
                    }
                }
                Err(e) => warn!("{}: skipping malformed datagram: {}", peer, e),
            }
        }

        info!("UDP listener stopped");
    }

    /// Handle one decoded datagram. Returns `false` if the loop must exit.
    async fn dispatch(&mut self, peer: SocketAddr, datagram: Datagram) -> bool {
        let Datagram {
            message_id,
            message,
        } = datagram;

        traffic::log_io(Direction::Recv, peer, &message);

        if let ChatMessage::Confirm(confirm) = message {
            // A closed session may still be draining its outbox.
            match self.sessions.get(&peer) {
                Some(session) if session.resolve_ack(confirm.ref_message_id) => {}
                _ => trace!("{}: stale confirmation for {}", peer, confirm.ref_message_id),
            }
            return true;
        }

        let session = match self.session_for(peer) {
            Some(session) => session,
            None => {
                debug!("{}: not accepting new peers, dropping {}", peer, message.kind());
                return true;
            }
        };
        let status = session.accept_inbound(message_id);

        // Confirm duplicates too: our previous confirmation may have been lost.
        if let Err(e) = session.send_confirm(message_id).await {
            warn!("{}: failed to confirm {}: {}", peer, message_id, e);
        }

        if status == InboundStatus::Duplicate {
            debug!("{}: duplicate message {} dropped", peer, message_id);
            return true;
        }

        let envelope = Envelope {
            session,
            message_id,
            message,
        };
        match queue::enqueue(&self.ctx.inbound, envelope, &self.ctx.shutdown).await {
            Ok(()) => true,
            Err(e) => {
                debug!("Inbound queue unavailable: {}", e);
                false
            }
        }
    }

    fn live_session(&self, peer: SocketAddr) -> Option<Arc<DatagramSession>> {
        self.sessions
            .get(&peer)
            .filter(|s| !s.state().is_closed())
            .cloned()
    }

    /// Existing live session for `peer`, or a freshly registered one.
    ///
    /// `None` once the listener has been stopped and `peer` is new.
    fn session_for(&mut self, peer: SocketAddr) -> Option<Arc<DatagramSession>> {
        if let Some(session) = self.live_session(peer) {
            return Some(session);
        }
        if self.stop.is_cancelled() {
            return None;
        }

        self.sessions.retain(|_, s| !s.state().is_flushed());

        let session = DatagramSession::spawn(peer, self.socket.clone(), self.reliability, &self.ctx);
        let registered: SessionRef = session.clone();
        self.ctx.registry.add(session.endpoint(), registered);
        self.sessions.insert(peer, session.clone());
        debug!("New UDP session for {}", peer);
        Some(session)
    }
}
