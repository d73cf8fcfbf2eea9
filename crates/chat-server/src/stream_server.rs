//! TCP listener and per-connection reader.
//!
//! This module:
//! - Accepts TCP connections until stopped.
//! - Registers a `StreamSession` per connection.
//! - Spawns a reader task that reassembles CRLF frames, decodes them and
//!   pushes envelopes into the inbound queue.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use chat_protocol::{text_codec, LineFramer};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::queue;
use crate::session::stream::StreamSession;
use crate::session::Session;
use crate::traffic::{self, Direction};
use crate::types::{Endpoint, Envelope, ServerContext, SessionRef, StopHandle};

const READ_CHUNK: usize = 4096;

pub struct StreamListener {
    listener: TcpListener,
    ctx: ServerContext,
    stop: CancellationToken,
}

impl StreamListener {
    pub async fn bind(addr: &str, ctx: ServerContext) -> io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        Ok(StreamListener {
            listener,
            ctx,
            stop: CancellationToken::new(),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub fn stop_handle(&self) -> StopHandle {
        StopHandle::new(self.stop.clone())
    }

    /// Accept connections until stopped or the server shuts down.
    pub async fn run(self) {
        if let Ok(addr) = self.listener.local_addr() {
            info!("TCP listening on {}", addr);
        }

        loop {
            let accepted = tokio::select! {
                biased;
                _ = self.stop.cancelled() => break,
                _ = self.ctx.shutdown.cancelled() => break,
                res = self.listener.accept() => res,
            };

            match accepted {
                Ok((stream, _)) => self.admit(stream),
                Err(e) => warn!("TCP accept error: {}", e),
            }
        }

        info!("TCP listener stopped");
    }

    fn admit(&self, stream: TcpStream) {
        // A socket without a resolvable peer cannot be keyed; drop it.
        let peer = match stream.peer_addr() {
            Ok(peer) => peer,
            Err(e) => {
                debug!("Dropping connection without peer address: {}", e);
                return;
            }
        };

        let endpoint = Endpoint::stream(peer);
        let (read_half, write_half) = stream.into_split();
        let session = StreamSession::spawn(endpoint, write_half, &self.ctx);

        let registered: SessionRef = session.clone();
        self.ctx.registry.add(endpoint, registered);
        debug!("Accepted TCP connection from {}", peer);

        let ctx = self.ctx.clone();
        tokio::spawn(async move {
            read_connection(session, read_half, ctx).await;
        });
    }
}

/// Reader loop for one connection. Owns the read half until disconnect.
async fn read_connection(session: Arc<StreamSession>, mut reader: OwnedReadHalf, ctx: ServerContext) {
    let endpoint = session.endpoint();
    let cancel = session.state().cancel_token().clone();
    let mut framer = LineFramer::new(ctx.config.max_frame_len);
    let mut chunk = [0u8; READ_CHUNK];

    'conn: loop {
        let n = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            res = reader.read(&mut chunk) => match res {
                Ok(0) => {
                    debug!("{} closed the connection", endpoint);
                    break;
                }
                Ok(n) => n,
                Err(e) => {
                    debug!("{} read error: {}", endpoint, e);
                    break;
                }
            },
        };

        framer.extend(&chunk[..n]);

        loop {
            let frame = match framer.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break,
                Err(e) => {
                    warn!("{}: {}, closing connection", endpoint, e);
                    break 'conn;
                }
            };

            let message = match text_codec::parse_frame(&frame) {
                Ok(message) => message,
                Err(e) => {
                    warn!("{}: skipping malformed frame: {}", endpoint, e);
                    continue;
                }
            };

            traffic::log_io(Direction::Recv, endpoint, &message);

            let envelope = Envelope {
                session: session.clone(),
                message_id: 0,
                message,
            };
            if let Err(e) = queue::enqueue(&ctx.inbound, envelope, &cancel).await {
                debug!("{}: inbound queue unavailable: {}", endpoint, e);
                break 'conn;
            }
        }
    }

    session.disconnect().await;
}
