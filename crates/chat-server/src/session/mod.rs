//! Transport-agnostic sessions.
//!
//! Chat logic only ever sees [`Session`] trait objects. The two variants,
//! [`stream::StreamSession`] and [`datagram::DatagramSession`], differ in
//! how their writer task reaches the peer. Everything else (chat profile,
//! outbox, registry membership, departure notice) lives in the shared
//! [`SessionState`].
//!
//! `send` only ever queues into the session's bounded outbox, so a slow or
//! silent peer holds up its own writer task and nobody else.

pub mod datagram;
pub mod stream;

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chat_core::{departure_notice, ChatMessage, ChatProfile};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SessionError;
use crate::queue;
use crate::registry::Registry;
use crate::types::{BroadcastTx, ChannelBroadcast, Endpoint, OutboundRx, OutboundTx, ServerContext};

/// Capabilities every session offers to chat logic.
#[async_trait]
pub trait Session: Send + Sync + fmt::Debug {
    /// State shared by all transports.
    fn state(&self) -> &SessionState;

    fn endpoint(&self) -> Endpoint {
        self.state().endpoint()
    }

    /// Reserve the next outbound sequence number. Wraps at `u16::MAX`.
    fn next_sequence(&self) -> u16;

    /// Queue `msg` for the session's writer task. Never waits on the peer.
    ///
    /// Does not tear the session down by itself: on a fatal error
    /// (`SessionError::is_fatal`) the caller must call `disconnect`.
    fn send(&self, msg: ChatMessage) -> Result<(), SessionError> {
        self.state().enqueue(msg)
    }

    /// Tear the session down. Idempotent.
    ///
    /// Messages queued before the call are still written; nothing queued
    /// after it is.
    async fn disconnect(&self) {
        self.state().release().await;
    }
}

/// Send `msg`, disconnecting the session if the failure is fatal.
pub async fn deliver(session: &dyn Session, msg: ChatMessage) -> Result<(), SessionError> {
    let res = session.send(msg);
    if let Err(e) = &res {
        if e.is_fatal() {
            debug!("{} unusable, disconnecting: {}", session.endpoint(), e);
            session.disconnect().await;
        }
    }
    res
}

/// Per-session state common to both transports.
pub struct SessionState {
    endpoint: Endpoint,
    profile: Mutex<ChatProfile>,
    closed: AtomicBool,
    registry: Registry,
    broadcasts: BroadcastTx,

    /// Sender half of the outbox; taken on release so the writer drains
    /// what is left and stops.
    outbox: Mutex<Option<OutboundTx>>,

    /// Child of the server shutdown token; fired on disconnect.
    cancel: CancellationToken,

    /// Server-wide shutdown. Writers only stop early for this one.
    shutdown: CancellationToken,

    /// Fired once the writer task has exited.
    flushed: CancellationToken,
}

impl fmt::Debug for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionState")
            .field("endpoint", &self.endpoint)
            .field("profile", &*self.lock_profile())
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl SessionState {
    /// Create the state and the receiving end of its outbox.
    pub fn new(endpoint: Endpoint, ctx: &ServerContext) -> (Self, OutboundRx) {
        let (outbox, outbox_rx) = mpsc::channel(ctx.config.outbox_capacity);
        let state = SessionState {
            endpoint,
            profile: Mutex::new(ChatProfile::new()),
            closed: AtomicBool::new(false),
            registry: ctx.registry.clone(),
            broadcasts: ctx.broadcasts.clone(),
            outbox: Mutex::new(Some(outbox)),
            cancel: ctx.shutdown.child_token(),
            shutdown: ctx.shutdown.clone(),
            flushed: CancellationToken::new(),
        };
        (state, outbox_rx)
    }

    pub fn endpoint(&self) -> Endpoint {
        self.endpoint
    }

    /// Snapshot of the chat profile.
    pub fn profile(&self) -> ChatProfile {
        self.lock_profile().clone()
    }

    pub fn update_profile<F: FnOnce(&mut ChatProfile)>(&self, f: F) {
        f(&mut self.lock_profile());
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Fires when the session is torn down or the server shuts down.
    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Fires only when the whole server shuts down.
    pub fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Put `msg` in the outbox without waiting.
    ///
    /// A full outbox means the peer cannot keep up, which is fatal.
    pub fn enqueue(&self, msg: ChatMessage) -> Result<(), SessionError> {
        let outbox = self.lock_outbox();
        let tx = match outbox.as_ref() {
            Some(tx) if !self.is_closed() => tx,
            _ => return Err(SessionError::Closed),
        };
        tx.try_send(msg).map_err(|e| match e {
            TrySendError::Full(_) => SessionError::Backlogged {
                endpoint: self.endpoint,
            },
            TrySendError::Closed(_) => SessionError::Closed,
        })
    }

    /// Called by the writer task on exit.
    pub(crate) fn mark_flushed(&self) {
        self.flushed.cancel();
    }

    pub fn is_flushed(&self) -> bool {
        self.flushed.is_cancelled()
    }

    /// Wait until the writer task has exited.
    pub async fn flushed(&self) {
        self.flushed.cancelled().await;
    }

    /// Shared part of the disconnect protocol.
    ///
    /// Only the first call does anything: it closes the outbox, removes the
    /// session from the registry, queues a departure notice if the session
    /// had joined a channel, and fires the session's cancellation token.
    /// Returns `false` on every later call.
    pub async fn release(&self) -> bool {
        {
            let mut outbox = self.lock_outbox();
            if self.closed.swap(true, Ordering::AcqRel) {
                return false;
            }
            outbox.take();
        }

        self.registry.remove_session(&self.endpoint, self);

        let profile = self.profile();
        if profile.has_joined() {
            let notice = ChannelBroadcast {
                channel_id: profile.channel_id.clone(),
                origin: Some(self.endpoint),
                message: departure_notice(&profile),
            };
            if let Err(e) = queue::enqueue(&self.broadcasts, notice, &self.shutdown).await {
                debug!("{}: departure notice dropped: {}", self.endpoint, e);
            }
        }

        self.cancel.cancel();
        debug!("{} disconnected", self.endpoint);
        true
    }

    fn lock_profile(&self) -> MutexGuard<'_, ChatProfile> {
        self.profile.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn lock_outbox(&self) -> MutexGuard<'_, Option<OutboundTx>> {
        self.outbox.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! In-memory session and context for unit tests.

    use std::sync::atomic::AtomicU16;
    use std::sync::Arc;

    use super::*;
    use crate::config::Config;
    use crate::types::{BroadcastRx, InboundRx, SessionRef};

    pub(crate) fn context(capacity: usize) -> (ServerContext, InboundRx, BroadcastRx) {
        context_with(Config {
            queue_capacity: capacity,
            ..Config::default()
        })
    }

    pub(crate) fn context_with(config: Config) -> (ServerContext, InboundRx, BroadcastRx) {
        let (inbound, inbound_rx) = queue::bounded(config.queue_capacity);
        let (broadcasts, broadcast_rx) = queue::bounded(config.queue_capacity);
        let ctx = ServerContext {
            config: Arc::new(config),
            registry: Registry::new(),
            inbound,
            broadcasts,
            shutdown: CancellationToken::new(),
        };
        (ctx, inbound_rx, broadcast_rx)
    }

    /// Records sent messages instead of writing to a socket.
    #[derive(Debug)]
    pub(crate) struct FakeSession {
        state: SessionState,
        sequence: AtomicU16,
        pub(crate) sent: Mutex<Vec<ChatMessage>>,
        pub(crate) fail_sends: AtomicBool,
    }

    impl FakeSession {
        pub(crate) fn register(ctx: &ServerContext, endpoint: Endpoint) -> Arc<FakeSession> {
            let (state, _outbox) = SessionState::new(endpoint, ctx);
            let session = Arc::new(FakeSession {
                state,
                sequence: AtomicU16::new(0),
                sent: Mutex::new(Vec::new()),
                fail_sends: AtomicBool::new(false),
            });
            let as_ref: SessionRef = session.clone();
            ctx.registry.add(endpoint, as_ref);
            session
        }

        pub(crate) fn sent(&self) -> Vec<ChatMessage> {
            self.sent.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Session for FakeSession {
        fn state(&self) -> &SessionState {
            &self.state
        }

        fn next_sequence(&self) -> u16 {
            self.sequence.fetch_add(1, Ordering::Relaxed)
        }

        fn send(&self, msg: ChatMessage) -> Result<(), SessionError> {
            if self.state.is_closed() {
                return Err(SessionError::Closed);
            }
            if self.fail_sends.load(Ordering::Relaxed) {
                return Err(SessionError::Io(std::io::ErrorKind::BrokenPipe.into()));
            }
            self.next_sequence();
            self.sent.lock().unwrap().push(msg);
            Ok(())
        }
    }
}
