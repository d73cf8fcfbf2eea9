//! Chat rules.
//!
//! Decides what a single inbound message means for the session that sent
//! it, given that session's current [`ChatProfile`]. The result is a list
//! of [`ChatAction`]s, applied in order by the networking layer:
//! - profile changes (authenticate, rename, switch channel),
//! - replies to the sender,
//! - broadcasts to a channel (always excluding the sender),
//! - disconnect.
//!
//! Nothing here touches sockets, so the whole conversation can be
//! replayed in plain unit tests.

use crate::messages::{Auth, ChatMessage, Join, TextMessage};
use crate::profile::{ChatProfile, SessionPhase};

/// Channel every session lands in right after authentication.
pub const DEFAULT_CHANNEL: &str = "default";

/// Display name used for server-originated channel notices.
pub const SERVER_DISPLAY_NAME: &str = "Server";

/// One step the server must carry out for the sending session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatAction {
    /// Send a message back to the originating session.
    Send(ChatMessage),

    /// Mark the session authenticated under this identity, in `channel_id`.
    Authenticate {
        username: String,
        display_name: String,
        channel_id: String,
    },

    /// Update the session's display name.
    Rename(String),

    /// Move the session into another channel.
    SwitchChannel(String),

    /// Deliver `message` to every other member of `channel_id`.
    Broadcast {
        channel_id: String,
        message: ChatMessage,
    },

    /// Tear the session down.
    Disconnect,
}

/// Lookup the rules need from the outside world.
pub trait UserDirectory {
    /// True if another live session already authenticated as `username`.
    fn username_in_use(&self, username: &str) -> bool;
}

/// Stateless rule set; all per-session state lives in [`ChatProfile`].
#[derive(Debug, Clone)]
pub struct ChatRules {
    default_channel: String,
}

impl Default for ChatRules {
    fn default() -> Self {
        ChatRules {
            default_channel: DEFAULT_CHANNEL.to_string(),
        }
    }
}

impl ChatRules {
    pub fn new() -> Self {
        ChatRules::default()
    }

    /// Process one inbound message and return the actions to apply.
    ///
    /// `message_id` is the transport id of the inbound message (always `0`
    /// on the stream transport); replies reference it.
    pub fn process<D: UserDirectory + ?Sized>(
        &self,
        profile: &ChatProfile,
        message_id: u16,
        msg: ChatMessage,
        users: &D,
    ) -> Vec<ChatAction> {
        match (profile.phase, msg) {
            (_, ChatMessage::Bye(_)) | (_, ChatMessage::Err(_)) => vec![ChatAction::Disconnect],

            // Acknowledgments are absorbed by the datagram layer.
            (_, ChatMessage::Confirm(_)) => Vec::new(),

            (SessionPhase::Start, ChatMessage::Auth(auth)) => {
                self.process_auth(message_id, auth, users)
            }
            (SessionPhase::Start, _) => protocol_violation("You must authenticate first."),

            (SessionPhase::Open, ChatMessage::Auth(_)) => vec![ChatAction::Send(
                ChatMessage::reply(false, message_id, "Already authenticated."),
            )],
            (SessionPhase::Open, ChatMessage::Join(join)) => {
                self.process_join(profile, message_id, join)
            }
            (SessionPhase::Open, ChatMessage::Msg(text)) => self.process_msg(profile, text),
            (SessionPhase::Open, ChatMessage::Reply(_)) => {
                protocol_violation("Clients must not send REPLY.")
            }
        }
    }

    // -------------------------------------------------------------------------
    // Internal handlers
    // -------------------------------------------------------------------------

    fn process_auth<D: UserDirectory + ?Sized>(
        &self,
        message_id: u16,
        auth: Auth,
        users: &D,
    ) -> Vec<ChatAction> {
        if users.username_in_use(&auth.username) {
            return vec![ChatAction::Send(ChatMessage::reply(
                false,
                message_id,
                "Username already in use.",
            ))];
        }

        let joined = format!("{} has joined {}.", auth.display_name, self.default_channel);
        vec![
            ChatAction::Authenticate {
                username: auth.username,
                display_name: auth.display_name,
                channel_id: self.default_channel.clone(),
            },
            ChatAction::Send(ChatMessage::reply(true, message_id, "Auth success.")),
            ChatAction::Broadcast {
                channel_id: self.default_channel.clone(),
                message: ChatMessage::msg(SERVER_DISPLAY_NAME, joined),
            },
        ]
    }

    fn process_join(&self, profile: &ChatProfile, message_id: u16, join: Join) -> Vec<ChatAction> {
        let Join {
            channel_id,
            display_name,
        } = join;

        let mut actions = vec![ChatAction::Rename(display_name.clone())];

        if channel_id != profile.channel_id {
            if !profile.channel_id.is_empty() {
                actions.push(ChatAction::Broadcast {
                    channel_id: profile.channel_id.clone(),
                    message: ChatMessage::msg(
                        SERVER_DISPLAY_NAME,
                        format!("{} has left {}.", display_name, profile.channel_id),
                    ),
                });
            }
            actions.push(ChatAction::SwitchChannel(channel_id.clone()));
        }

        actions.push(ChatAction::Send(ChatMessage::reply(
            true,
            message_id,
            "Join success.",
        )));
        actions.push(ChatAction::Broadcast {
            message: ChatMessage::msg(
                SERVER_DISPLAY_NAME,
                format!("{} has joined {}.", display_name, channel_id),
            ),
            channel_id,
        });
        actions
    }

    fn process_msg(&self, profile: &ChatProfile, text: TextMessage) -> Vec<ChatAction> {
        vec![
            ChatAction::Rename(text.display_name.clone()),
            ChatAction::Broadcast {
                channel_id: profile.channel_id.clone(),
                message: ChatMessage::Msg(text),
            },
        ]
    }
}

/// Text of the notice sent to a channel when a joined session leaves.
pub fn departure_notice(profile: &ChatProfile) -> ChatMessage {
    ChatMessage::msg(
        SERVER_DISPLAY_NAME,
        format!("{} has left {}.", profile.display_name, profile.channel_id),
    )
}

fn protocol_violation(reason: &str) -> Vec<ChatAction> {
    vec![
        ChatAction::Send(ChatMessage::err(SERVER_DISPLAY_NAME, reason)),
        ChatAction::Send(ChatMessage::bye()),
        ChatAction::Disconnect,
    ]
}
