//! Broadcast dispatcher.
//!
//! Drains the broadcast queue in FIFO order and fans each message out to
//! the members of its channel. Fan-out only fills each recipient's outbox;
//! a slow or dead peer holds up its own writer task, never this loop.

use tracing::debug;

use crate::queue;
use crate::session::Session;
use crate::types::{BroadcastRx, ChannelBroadcast, ServerContext, SessionRef};

/// Run the fan-out loop until shutdown or queue close.
pub async fn run_broadcast_loop(mut broadcasts: BroadcastRx, ctx: ServerContext) {
    while let Some(broadcast) = queue::dequeue(&mut broadcasts, &ctx.shutdown).await {
        fan_out(broadcast, &ctx);
    }

    debug!("Broadcast loop shutting down");
}

fn fan_out(broadcast: ChannelBroadcast, ctx: &ServerContext) {
    let ChannelBroadcast {
        channel_id,
        origin,
        message,
    } = broadcast;

    for session in ctx.registry.channel_members(&channel_id, origin) {
        if let Err(e) = session.send(message.clone()) {
            debug!("{}: broadcast send failed: {}", session.endpoint(), e);
            if e.is_fatal() {
                detach_disconnect(session);
            }
        }
    }
}

/// Disconnect on a separate task: teardown enqueues a departure notice
/// into the very queue this loop drains.
fn detach_disconnect(session: SessionRef) {
    tokio::spawn(async move {
        session.disconnect().await;
    });
}
