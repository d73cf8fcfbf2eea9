//! Datagram (UDP) session and its reliable-delivery engine.
//!
//! UDP may lose, duplicate or reorder datagrams, so every application
//! message carries a 16-bit id and must be confirmed by the receiver.
//!
//! Outbound: `send` queues into the outbox and a per-session sender task
//! delivers one message at a time:
//! 1. reserve the next id and encode,
//! 2. transmit, then wait up to `ack_timeout` for a `CONFIRM` with that id,
//! 3. retransmit up to `max_retransmissions` times,
//! 4. give up with `SessionError::Unreachable` and disconnect.
//!
//! Inbound (driven by the listener's receive loop):
//! - `CONFIRM` resolves the pending send if the id matches, otherwise it
//!   is a stale duplicate and is ignored;
//! - application messages are confirmed every time they arrive, but only
//!   the first copy of each id is passed on to chat logic.

use std::collections::HashSet;
use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chat_core::{ChatMessage, Confirm};
use chat_protocol::binary_codec;
use tokio::net::UdpSocket;
use tokio::sync::oneshot;
use tracing::{debug, trace, warn};

use crate::error::SessionError;
use crate::session::{Session, SessionState};
use crate::traffic::{self, Direction};
use crate::types::{Endpoint, OutboundRx, ServerContext};

/// Inbound ids older than this (modulo 2^16) are forgotten, so a long
/// session that wraps the id space is not mistaken for a replay.
const SEEN_WINDOW: u16 = 1 << 15;

/// Retransmission policy for one datagram session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reliability {
    /// How long a single attempt waits for its confirmation.
    pub ack_timeout: Duration,

    /// Attempts after the first; `max_retransmissions + 1` in total.
    pub max_retransmissions: u32,
}

/// Outcome of recording an inbound message id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundStatus {
    /// First time this id is seen; deliver it.
    Fresh,
    /// Already delivered; confirm again but drop.
    Duplicate,
}

#[derive(Debug)]
struct PendingAck {
    message_id: u16,
    done: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Ledger {
    next_outbound: u16,
    last_inbound: Option<u16>,
    seen_inbound: HashSet<u16>,
    pending: Option<PendingAck>,
}

pub struct DatagramSession {
    state: SessionState,
    socket: Arc<UdpSocket>,
    reliability: Reliability,
    ledger: Mutex<Ledger>,
}

impl std::fmt::Debug for DatagramSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatagramSession")
            .field("state", &self.state)
            .field("reliability", &self.reliability)
            .finish_non_exhaustive()
    }
}

impl DatagramSession {
    /// Create the session for `addr` and start its sender task.
    pub fn spawn(
        addr: SocketAddr,
        socket: Arc<UdpSocket>,
        reliability: Reliability,
        ctx: &ServerContext,
    ) -> Arc<Self> {
        let (state, outbox) = SessionState::new(Endpoint::datagram(addr), ctx);
        let session = Arc::new(DatagramSession {
            state,
            socket,
            reliability,
            ledger: Mutex::new(Ledger::default()),
        });
        tokio::spawn(send_loop(session.clone(), outbox));
        session
    }

    fn addr(&self) -> SocketAddr {
        self.state.endpoint().addr
    }

    fn ledger(&self) -> MutexGuard<'_, Ledger> {
        self.ledger.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Record an inbound application message id.
    pub fn accept_inbound(&self, message_id: u16) -> InboundStatus {
        let mut ledger = self.ledger();
        if !ledger.seen_inbound.insert(message_id) {
            return InboundStatus::Duplicate;
        }
        ledger
            .seen_inbound
            .remove(&message_id.wrapping_sub(SEEN_WINDOW));
        ledger.last_inbound = Some(message_id);
        InboundStatus::Fresh
    }

    /// Most recently accepted inbound id.
    pub fn last_inbound_id(&self) -> Option<u16> {
        self.ledger().last_inbound
    }

    /// Match a `CONFIRM` against the in-flight send.
    ///
    /// Returns `false` for stale or unknown ids.
    pub fn resolve_ack(&self, message_id: u16) -> bool {
        let pending = {
            let mut ledger = self.ledger();
            match &ledger.pending {
                Some(p) if p.message_id == message_id => ledger.pending.take(),
                _ => None,
            }
        };

        match pending {
            Some(p) => {
                // The sender may have timed out in the meantime; that is fine.
                let _ = p.done.send(());
                true
            }
            None => false,
        }
    }

    /// Acknowledge an inbound message. Unreliable by nature.
    pub async fn send_confirm(&self, message_id: u16) -> io::Result<()> {
        let confirm = ChatMessage::Confirm(Confirm {
            ref_message_id: message_id,
        });
        let mut frame = Vec::with_capacity(3);
        binary_codec::encode_datagram(&confirm, message_id, &mut frame)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;

        self.socket.send_to(&frame, self.addr()).await?;
        traffic::log_io(Direction::Send, self.state.endpoint(), &confirm);
        Ok(())
    }

    fn arm(&self, message_id: u16) -> oneshot::Receiver<()> {
        let (done, rx) = oneshot::channel();
        self.ledger().pending = Some(PendingAck { message_id, done });
        rx
    }

    fn disarm(&self, message_id: u16) {
        let mut ledger = self.ledger();
        if matches!(&ledger.pending, Some(p) if p.message_id == message_id) {
            ledger.pending = None;
        }
    }

    /// Deliver one message and wait for its confirmation.
    ///
    /// Only the sender task calls this, so at most one message is in
    /// flight and the pending-ack slot never holds more than one entry.
    async fn send_reliable(&self, msg: &ChatMessage) -> Result<(), SessionError> {
        let shutdown = self.state.shutdown_token().clone();

        let message_id = self.next_sequence();
        let mut frame = Vec::with_capacity(64);
        binary_codec::encode_datagram(msg, message_id, &mut frame)?;

        // Armed before the first transmit so a fast confirmation is not missed.
        let mut confirmed = self.arm(message_id);
        let attempts = self.reliability.max_retransmissions + 1;

        for attempt in 1..=attempts {
            match self.socket.send_to(&frame, self.addr()).await {
                Ok(_) => traffic::log_io(Direction::Send, self.state.endpoint(), msg),
                Err(e) => warn!("{}: send attempt {} failed: {}", self.addr(), attempt, e),
            }

            tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    self.disarm(message_id);
                    return Err(SessionError::Cancelled);
                }
                res = tokio::time::timeout(self.reliability.ack_timeout, &mut confirmed) => {
                    match res {
                        Ok(Ok(())) => {
                            trace!("{}: message {} confirmed", self.addr(), message_id);
                            return Ok(());
                        }
                        // Pending slot dropped; nothing left to wait on.
                        Ok(Err(_)) => break,
                        Err(_elapsed) => {}
                    }
                }
            }

            if attempt < attempts {
                debug!(
                    "{}: no confirmation for {}, retransmitting ({}/{})",
                    self.addr(),
                    message_id,
                    attempt,
                    self.reliability.max_retransmissions
                );
            }
        }

        self.disarm(message_id);
        Err(SessionError::Unreachable {
            endpoint: self.state.endpoint(),
            message_id,
            attempts,
        })
    }
}

#[async_trait]
impl Session for DatagramSession {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn next_sequence(&self) -> u16 {
        let mut ledger = self.ledger();
        let id = ledger.next_outbound;
        ledger.next_outbound = id.wrapping_add(1);
        id
    }
}

/// Drain the outbox one confirmed message at a time.
///
/// Datagrams are connectionless, so after disconnect there is nothing to
/// close: the task delivers what was queued and exits.
async fn send_loop(session: Arc<DatagramSession>, mut outbox: OutboundRx) {
    let endpoint = session.endpoint();
    let shutdown = session.state.shutdown_token().clone();

    loop {
        let msg = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            msg = outbox.recv() => match msg {
                Some(msg) => msg,
                None => break,
            },
        };

        match session.send_reliable(&msg).await {
            Ok(()) => {}
            Err(SessionError::Cancelled) => break,
            Err(e) if e.is_fatal() => {
                debug!("{}: {}", endpoint, e);
                session.disconnect().await;
                break;
            }
            Err(e) => debug!("{}: dropping {}: {}", endpoint, msg.kind(), e),
        }
    }

    session.state.mark_flushed();
}
