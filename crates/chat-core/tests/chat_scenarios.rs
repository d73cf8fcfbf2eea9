// crates/chat-core/tests/chat_scenarios.rs
use std::collections::HashSet;

use chat_core::{ChatAction, ChatMessage, ChatProfile, ChatRules, SessionPhase, UserDirectory};
use chat_protocol::text_codec::{format_line, parse_line};

#[derive(Default)]
struct Directory(HashSet<String>);

impl UserDirectory for Directory {
    fn username_in_use(&self, username: &str) -> bool {
        self.0.contains(username)
    }
}

/// Apply profile-changing actions and collect what would go on the wire.
fn apply(profile: &mut ChatProfile, actions: Vec<ChatAction>) -> (Vec<String>, bool) {
    let mut out = Vec::new();
    let mut disconnected = false;

    for action in actions {
        match action {
            ChatAction::Authenticate {
                username,
                display_name,
                channel_id,
            } => {
                profile.phase = SessionPhase::Open;
                profile.username = username;
                profile.display_name = display_name;
                profile.channel_id = channel_id;
            }
            ChatAction::Rename(name) => profile.display_name = name,
            ChatAction::SwitchChannel(channel) => profile.channel_id = channel,
            ChatAction::Send(msg) => out.push(format_line(&msg).unwrap()),
            ChatAction::Broadcast { channel_id, message } => {
                out.push(format!("[{}] {}", channel_id, format_line(&message).unwrap()))
            }
            ChatAction::Disconnect => disconnected = true,
        }
    }
    (out, disconnected)
}

#[test]
fn scripted_conversation_produces_expected_wire_output() {
    const SCRIPT: &str = "\
AUTH alice AS Alice USING secret
MSG FROM Alice IS hi everyone
JOIN general AS Ally
MSG FROM Ally IS anyone here?
BYE";

    let rules = ChatRules::new();
    let users = Directory::default();
    let mut profile = ChatProfile::new();
    let mut transcript = Vec::new();
    let mut disconnected = false;

    for line in SCRIPT.lines() {
        let msg = parse_line(line).expect("script lines are valid");
        let actions = rules.process(&profile, 0, msg, &users);
        let (out, bye) = apply(&mut profile, actions);
        transcript.extend(out);
        disconnected |= bye;
    }

    assert_eq!(
        transcript,
        vec![
            "REPLY OK IS Auth success.",
            "[default] MSG FROM Server IS Alice has joined default.",
            "[default] MSG FROM Alice IS hi everyone",
            "[default] MSG FROM Server IS Ally has left default.",
            "REPLY OK IS Join success.",
            "[general] MSG FROM Server IS Ally has joined general.",
            "[general] MSG FROM Ally IS anyone here?",
        ]
    );
    assert!(disconnected);
    assert_eq!(profile.channel_id, "general");
    assert_eq!(profile.display_name, "Ally");
}

#[test]
fn unauthenticated_join_is_rejected_and_disconnected() {
    let rules = ChatRules::new();
    let mut profile = ChatProfile::new();

    let msg = parse_line("JOIN general AS bob").unwrap();
    let actions = rules.process(&profile, 0, msg, &Directory::default());
    let (out, disconnected) = apply(&mut profile, actions);

    assert_eq!(
        out,
        vec!["ERR FROM Server IS You must authenticate first.", "BYE"]
    );
    assert!(disconnected);
    assert_eq!(profile, ChatProfile::new());
}

#[test]
fn rejoining_same_channel_does_not_announce_leave() {
    let rules = ChatRules::new();
    let mut profile = ChatProfile::new();
    let users = Directory::default();

    let auth = parse_line("AUTH bob AS Bob USING pw").unwrap();
    let actions = rules.process(&profile, 0, auth, &users);
    apply(&mut profile, actions);

    let join = ChatMessage::Join(chat_core::Join {
        channel_id: "default".into(),
        display_name: "Bob".into(),
    });
    let actions = rules.process(&profile, 0, join, &users);
    let (out, _) = apply(&mut profile, actions);

    assert_eq!(
        out,
        vec![
            "REPLY OK IS Join success.",
            "[default] MSG FROM Server IS Bob has joined default.",
        ]
    );
}
