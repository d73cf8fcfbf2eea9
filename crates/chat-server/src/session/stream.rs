//! Stream (TCP) session.
//!
//! TCP already guarantees delivery and order, so the writer task just
//! frames each queued message and writes it. A write that makes no
//! progress within the configured timeout, or that fails, ends the
//! session. After disconnect the writer drains what was queued, then
//! shuts the write half down.

use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chat_core::ChatMessage;
use chat_protocol::text_codec;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::SessionError;
use crate::session::{Session, SessionState};
use crate::traffic::{self, Direction};
use crate::types::{Endpoint, OutboundRx, ServerContext};

pub struct StreamSession {
    state: SessionState,
    sequence: AtomicU16,
}

impl std::fmt::Debug for StreamSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamSession")
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl StreamSession {
    /// Create the session and start its writer task on `writer`.
    pub fn spawn(endpoint: Endpoint, writer: OwnedWriteHalf, ctx: &ServerContext) -> Arc<Self> {
        let (state, outbox) = SessionState::new(endpoint, ctx);
        let session = Arc::new(StreamSession {
            state,
            sequence: AtomicU16::new(0),
        });

        let write_timeout = ctx.config.write_timeout();
        tokio::spawn(write_loop(session.clone(), outbox, writer, write_timeout));
        session
    }
}

#[async_trait]
impl Session for StreamSession {
    fn state(&self) -> &SessionState {
        &self.state
    }

    fn next_sequence(&self) -> u16 {
        self.sequence.fetch_add(1, Ordering::AcqRel)
    }
}

async fn write_loop(
    session: Arc<StreamSession>,
    mut outbox: OutboundRx,
    mut writer: OwnedWriteHalf,
    write_timeout: Duration,
) {
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

        match write_frame(&mut writer, &msg, endpoint, write_timeout, &shutdown).await {
            Ok(()) => {
                // Numbered for bookkeeping only; the text encoding carries no id.
                session.next_sequence();
                traffic::log_io(Direction::Send, endpoint, &msg);
            }
            Err(SessionError::Cancelled) => break,
            Err(e) if e.is_fatal() => {
                debug!("{}: write failed: {}", endpoint, e);
                session.disconnect().await;
                break;
            }
            Err(e) => debug!("{}: dropping {}: {}", endpoint, msg.kind(), e),
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("{}: shutdown error: {}", endpoint, e);
    }
    session.state.mark_flushed();
}

async fn write_frame(
    writer: &mut OwnedWriteHalf,
    msg: &ChatMessage,
    endpoint: Endpoint,
    write_timeout: Duration,
    shutdown: &CancellationToken,
) -> Result<(), SessionError> {
    let mut frame = Vec::with_capacity(128);
    text_codec::encode_line(msg, &mut frame)?;

    let write = async {
        writer.write_all(&frame).await?;
        writer.flush().await
    };

    tokio::select! {
        biased;
        _ = shutdown.cancelled() => Err(SessionError::Cancelled),
        res = tokio::time::timeout(write_timeout, write) => match res {
            Ok(res) => res.map_err(SessionError::from),
            Err(_elapsed) => Err(SessionError::Stalled { endpoint }),
        },
    }
}
