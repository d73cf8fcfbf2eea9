//! Per-session chat state.
//!
//! Both transports keep one [`ChatProfile`] per session. The chat rules
//! read it to decide what an inbound message means and the server
//! mutates it when applying the resulting actions.

/// Where a session is in the chat conversation.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum SessionPhase {
    /// Connected, not yet authenticated.
    #[default]
    Start,

    /// Authenticated and sitting in a channel.
    Open,
}

/// Chat identity of a single session.
///
/// `display_name` and `channel_id` are empty until authentication.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatProfile {
    pub phase: SessionPhase,
    pub username: String,
    pub display_name: String,
    pub channel_id: String,
}

impl ChatProfile {
    pub fn new() -> Self {
        ChatProfile::default()
    }

    /// True once the session has both a display name and a channel.
    ///
    /// Only such sessions announce their departure to the channel.
    pub fn has_joined(&self) -> bool {
        !self.display_name.is_empty() && !self.channel_id.is_empty()
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Open
    }
}
