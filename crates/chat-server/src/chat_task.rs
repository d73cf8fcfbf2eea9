//! Central chat loop.
//!
//! This task drains the inbound queue and applies `ChatRules` to every
//! envelope, whichever transport it came from:
//! - profile actions update the sending session,
//! - replies go straight back to the sender,
//! - channel messages go to the broadcast queue,
//! - disconnects tear the sender down.
//!
//! A single task handles all envelopes, so messages from one peer are
//! applied in arrival order.

use chat_core::{ChatAction, ChatRules, SessionPhase};
use tracing::debug;

use crate::queue;
use crate::session::{self, Session};
use crate::types::{ChannelBroadcast, Envelope, InboundRx, ServerContext};

/// Run the chat processing loop until shutdown or queue close.
pub async fn run_chat_loop(mut inbound: InboundRx, ctx: ServerContext, rules: ChatRules) {
    while let Some(envelope) = queue::dequeue(&mut inbound, &ctx.shutdown).await {
        handle_envelope(envelope, &ctx, &rules).await;
    }

    debug!("Chat loop shutting down");
}

async fn handle_envelope(envelope: Envelope, ctx: &ServerContext, rules: &ChatRules) {
    let Envelope {
        session,
        message_id,
        message,
    } = envelope;

    // Queued before the session went away; nobody is left to answer.
    if session.state().is_closed() {
        debug!("{}: dropping message for closed session", session.endpoint());
        return;
    }

    let profile = session.state().profile();
    let actions = rules.process(&profile, message_id, message, &ctx.registry);

    for action in actions {
        if !apply(session.as_ref(), action, ctx).await {
            break;
        }
    }
}

/// Apply one action. Returns `false` once the session is gone.
async fn apply(session: &dyn Session, action: ChatAction, ctx: &ServerContext) -> bool {
    match action {
        ChatAction::Authenticate {
            username,
            display_name,
            channel_id,
        } => session.state().update_profile(|p| {
            p.phase = SessionPhase::Open;
            p.username = username;
            p.display_name = display_name;
            p.channel_id = channel_id;
        }),
        ChatAction::Rename(name) => session.state().update_profile(|p| p.display_name = name),
        ChatAction::SwitchChannel(channel) => {
            session.state().update_profile(|p| p.channel_id = channel)
        }
        ChatAction::Send(msg) => {
            if let Err(e) = session::deliver(session, msg).await {
                debug!("{}: send failed: {}", session.endpoint(), e);
                return !session.state().is_closed();
            }
        }
        ChatAction::Broadcast {
            channel_id,
            message,
        } => {
            let broadcast = ChannelBroadcast {
                channel_id,
                origin: Some(session.endpoint()),
                message,
            };
            if let Err(e) = queue::enqueue(&ctx.broadcasts, broadcast, &ctx.shutdown).await {
                debug!("Broadcast queue unavailable: {}", e);
            }
        }
        ChatAction::Disconnect => {
            session.disconnect().await;
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use chat_core::{Auth, ChatMessage};

    use super::*;
    use crate::session::testing::{context, FakeSession};
    use crate::types::{Endpoint, SessionRef};

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::stream(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    fn auth(username: &str) -> ChatMessage {
        ChatMessage::Auth(Auth {
            username: username.into(),
            display_name: username.into(),
            secret: "pw".into(),
        })
    }

    fn envelope(session: &std::sync::Arc<FakeSession>, message_id: u16, message: ChatMessage) -> Envelope {
        let session: SessionRef = session.clone();
        Envelope {
            session,
            message_id,
            message,
        }
    }

    #[tokio::test]
    async fn auth_replies_and_announces_join() {
        let (ctx, _inbound, mut broadcasts) = context(8);
        let rules = ChatRules::new();
        let alice = FakeSession::register(&ctx, endpoint(2000));

        handle_envelope(envelope(&alice, 5, auth("alice")), &ctx, &rules).await;

        assert_eq!(alice.sent(), vec![ChatMessage::reply(true, 5, "Auth success.")]);
        let profile = alice.state().profile();
        assert!(profile.is_authenticated());
        assert_eq!(profile.channel_id, "default");

        let b = broadcasts.try_recv().unwrap();
        assert_eq!(b.channel_id, "default");
        assert_eq!(b.origin, Some(endpoint(2000)));
    }

    #[tokio::test]
    async fn duplicate_username_is_refused() {
        let (ctx, _inbound, _broadcasts) = context(8);
        let rules = ChatRules::new();
        let first = FakeSession::register(&ctx, endpoint(2001));
        let second = FakeSession::register(&ctx, endpoint(2002));

        handle_envelope(envelope(&first, 0, auth("bob")), &ctx, &rules).await;
        handle_envelope(envelope(&second, 0, auth("bob")), &ctx, &rules).await;

        assert_eq!(
            second.sent(),
            vec![ChatMessage::reply(false, 0, "Username already in use.")]
        );
        assert!(!second.state().profile().is_authenticated());
    }

    #[tokio::test]
    async fn bye_disconnects_and_stops_processing() {
        let (ctx, _inbound, _broadcasts) = context(8);
        let rules = ChatRules::new();
        let carol = FakeSession::register(&ctx, endpoint(2003));

        handle_envelope(envelope(&carol, 0, ChatMessage::bye()), &ctx, &rules).await;
        assert!(carol.state().is_closed());
        assert!(!ctx.registry.contains(&endpoint(2003)));

        // Anything still queued for the closed session is ignored.
        handle_envelope(envelope(&carol, 1, auth("carol")), &ctx, &rules).await;
        assert!(carol.sent().is_empty());
    }
}
