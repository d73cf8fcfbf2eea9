//! Top-level server wiring.
//!
//! This module:
//! - Creates the registry and the two bounded queues.
//! - Binds the TCP and UDP listeners on the configured address/port.
//! - Spawns:
//!   - both listener loops,
//!   - a single chat task that drains the inbound queue,
//!   - a single broadcast task that drains the broadcast queue.
//! - Shuts everything down cooperatively.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use chat_core::{ChatMessage, ChatRules};
use futures::future::join_all;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::broadcast_task;
use crate::chat_task;
use crate::config::Config;
use crate::datagram_server::DatagramListener;
use crate::queue;
use crate::registry::Registry;
use crate::session::Session;
use crate::stream_server::StreamListener;
use crate::types::{BroadcastRx, InboundRx, ServerContext, StopHandle};

/// A bound but not yet running server.
pub struct Server {
    ctx: ServerContext,
    stream: StreamListener,
    datagram: DatagramListener,
    inbound_rx: InboundRx,
    broadcast_rx: BroadcastRx,
    rules: ChatRules,
}

impl Server {
    /// Validate `config` and bind both listeners.
    pub async fn bind(config: Config) -> anyhow::Result<Self> {
        config.validate()?;
        let addr = config.socket_addr_string();

        let (inbound, inbound_rx) = queue::bounded(config.queue_capacity);
        let (broadcasts, broadcast_rx) = queue::bounded(config.queue_capacity);

        let ctx = ServerContext {
            config: Arc::new(config),
            registry: Registry::new(),
            inbound,
            broadcasts,
            shutdown: CancellationToken::new(),
        };

        let stream = StreamListener::bind(&addr, ctx.clone())
            .await
            .with_context(|| format!("failed to bind TCP listener on {}", addr))?;
        let datagram = DatagramListener::bind(&addr, ctx.clone())
            .await
            .with_context(|| format!("failed to bind UDP socket on {}", addr))?;

        Ok(Server {
            ctx,
            stream,
            datagram,
            inbound_rx,
            broadcast_rx,
            rules: ChatRules::new(),
        })
    }

    /// Start every task and return a handle to stop them.
    pub fn spawn(self) -> anyhow::Result<ServerHandle> {
        let Server {
            ctx,
            stream,
            datagram,
            inbound_rx,
            broadcast_rx,
            rules,
        } = self;

        let stream_addr = stream.local_addr()?;
        let datagram_addr = datagram.local_addr()?;
        let stream_stop = stream.stop_handle();
        let datagram_stop = datagram.stop_handle();

        let tasks = vec![
            tokio::spawn(stream.run()),
            tokio::spawn(datagram.run()),
            tokio::spawn(chat_task::run_chat_loop(inbound_rx, ctx.clone(), rules)),
            tokio::spawn(broadcast_task::run_broadcast_loop(broadcast_rx, ctx.clone())),
        ];

        Ok(ServerHandle {
            ctx,
            stream_stop,
            datagram_stop,
            stream_addr,
            datagram_addr,
            tasks,
        })
    }
}

/// Handle to a running server.
pub struct ServerHandle {
    ctx: ServerContext,
    stream_stop: StopHandle,
    datagram_stop: StopHandle,
    stream_addr: SocketAddr,
    datagram_addr: SocketAddr,
    tasks: Vec<JoinHandle<()>>,
}

impl ServerHandle {
    pub fn stream_addr(&self) -> SocketAddr {
        self.stream_addr
    }

    pub fn datagram_addr(&self) -> SocketAddr {
        self.datagram_addr
    }

    pub fn registry(&self) -> &Registry {
        &self.ctx.registry
    }

    /// Stop admitting new peers; existing sessions keep running.
    ///
    /// New TCP connections are no longer accepted and datagrams from
    /// unknown addresses are dropped.
    pub fn stop_accepting(&self) {
        self.stream_stop.stop();
        self.datagram_stop.stop();
    }

    /// Say goodbye to every session, then cancel every task.
    ///
    /// Each session gets `BYE` queued and is disconnected at once; its
    /// writer then has up to the grace period to drain. The UDP loop keeps
    /// running meanwhile to receive confirmations for those goodbyes.
    pub async fn shutdown(self) {
        self.stop_accepting();

        let sessions = self.ctx.registry.snapshot();
        info!("Shutting down, closing {} session(s)", sessions.len());

        for session in &sessions {
            if let Err(e) = session.send(ChatMessage::bye()) {
                debug!("{}: goodbye not queued: {}", session.endpoint(), e);
            }
            session.disconnect().await;
        }

        let drained = join_all(sessions.iter().map(|session| session.state().flushed()));
        if tokio::time::timeout(self.ctx.config.shutdown_grace(), drained)
            .await
            .is_err()
        {
            warn!("Shutdown grace period elapsed with goodbyes still pending");
        }

        self.ctx.shutdown.cancel();
        for task in self.tasks {
            let _ = task.await;
        }
        info!("Server stopped");
    }
}

/// Run the server until Ctrl-C.
pub async fn run(config: Config) -> anyhow::Result<()> {
    let handle = Server::bind(config).await?.spawn()?;
    info!(
        "Chat server ready (tcp {}, udp {})",
        handle.stream_addr(),
        handle.datagram_addr()
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl-C")?;

    handle.shutdown().await;
    Ok(())
}
