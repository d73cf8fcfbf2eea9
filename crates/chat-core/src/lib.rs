//! chat-core
//!
//! Pure chat logic:
//! - messages (the logical message set shared by both transports)
//! - per-session chat profile (phase, display name, channel)
//! - chat rules (what to do with one inbound message)

pub mod messages;
pub mod profile;
pub mod rules;

pub use messages::{
    Auth,
    Bye,
    ChatMessage,
    Confirm,
    Join,
    MessageKind,
    Reply,
    TextMessage,
};

pub use profile::{ChatProfile, SessionPhase};
pub use rules::{
    departure_notice,
    ChatAction,
    ChatRules,
    UserDirectory,
    DEFAULT_CHANNEL,
    SERVER_DISPLAY_NAME,
};
