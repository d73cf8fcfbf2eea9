//! Process-wide registry of live sessions, keyed by [`Endpoint`].
//!
//! Created once at startup and handed explicitly to every component that
//! needs it. Cloning is cheap (shared map). No operation blocks on I/O.

use std::sync::Arc;

use chat_core::UserDirectory;
use dashmap::DashMap;

use crate::session::{Session, SessionState};
use crate::types::{Endpoint, SessionRef};

#[derive(Clone, Default)]
pub struct Registry {
    sessions: Arc<DashMap<Endpoint, SessionRef>>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("sessions", &self.sessions.len())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Registry::default()
    }

    /// Register `session` under `endpoint`. Last writer wins.
    pub fn add(&self, endpoint: Endpoint, session: SessionRef) {
        self.sessions.insert(endpoint, session);
    }

    /// Remove whatever is registered under `endpoint`. Idempotent.
    pub fn remove(&self, endpoint: &Endpoint) -> Option<SessionRef> {
        self.sessions.remove(endpoint).map(|(_, s)| s)
    }

    /// Remove `endpoint` only if it still maps to the session owning `state`.
    ///
    /// A peer that reconnected from the same endpoint keeps its fresh entry.
    pub fn remove_session(&self, endpoint: &Endpoint, state: &SessionState) -> bool {
        self.sessions
            .remove_if(endpoint, |_, s| std::ptr::eq(s.state(), state))
            .is_some()
    }

    pub fn try_get(&self, endpoint: &Endpoint) -> Option<SessionRef> {
        self.sessions.get(endpoint).map(|entry| entry.value().clone())
    }

    pub fn contains(&self, endpoint: &Endpoint) -> bool {
        self.sessions.contains_key(endpoint)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Snapshot of every live session.
    pub fn snapshot(&self) -> Vec<SessionRef> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    /// Authenticated sessions sitting in `channel_id`, minus `except`.
    pub fn channel_members(&self, channel_id: &str, except: Option<Endpoint>) -> Vec<SessionRef> {
        self.sessions
            .iter()
            .filter(|e| Some(*e.key()) != except)
            .filter(|e| {
                let profile = e.value().state().profile();
                profile.is_authenticated() && profile.channel_id == channel_id
            })
            .map(|e| e.value().clone())
            .collect()
    }
}

impl UserDirectory for Registry {
    fn username_in_use(&self, username: &str) -> bool {
        self.sessions.iter().any(|e| {
            let profile = e.value().state().profile();
            profile.is_authenticated() && profile.username == username
        })
    }
}

#[cfg(test)]
mod tests {
    use std::net::SocketAddr;

    use chat_core::SessionPhase;

    use super::*;
    use crate::session::testing::{context, FakeSession};

    fn endpoint(port: u16) -> Endpoint {
        Endpoint::stream(SocketAddr::from(([127, 0, 0, 1], port)))
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let (ctx, _inbound, _broadcasts) = context(4);
        FakeSession::register(&ctx, endpoint(4000));

        assert!(ctx.registry.try_get(&endpoint(4000)).is_some());
        assert!(ctx.registry.remove(&endpoint(4000)).is_some());
        assert!(ctx.registry.remove(&endpoint(4000)).is_none());
        assert!(ctx.registry.try_get(&endpoint(4000)).is_none());
    }

    #[tokio::test]
    async fn add_overwrites_existing_entry() {
        let (ctx, _inbound, _broadcasts) = context(4);
        FakeSession::register(&ctx, endpoint(4001));
        let second = FakeSession::register(&ctx, endpoint(4001));

        assert_eq!(ctx.registry.len(), 1);
        let current = ctx.registry.try_get(&endpoint(4001)).unwrap();
        assert!(std::ptr::eq(current.state(), second.state()));
    }

    #[tokio::test]
    async fn same_address_on_other_transport_is_distinct() {
        let (ctx, _inbound, _broadcasts) = context(4);
        let addr = SocketAddr::from(([127, 0, 0, 1], 4002));
        FakeSession::register(&ctx, Endpoint::stream(addr));
        FakeSession::register(&ctx, Endpoint::datagram(addr));

        assert_eq!(ctx.registry.len(), 2);
    }

    #[tokio::test]
    async fn username_lookup_only_counts_authenticated_sessions() {
        let (ctx, _inbound, _broadcasts) = context(4);
        let s = FakeSession::register(&ctx, endpoint(4003));
        s.state().update_profile(|p| p.username = "alice".into());
        assert!(!ctx.registry.username_in_use("alice"));

        s.state().update_profile(|p| p.phase = SessionPhase::Open);
        assert!(ctx.registry.username_in_use("alice"));
    }
}
