//! MCP session map (spec §3 "MCP session", §4.7): binds an
//! `Mcp-Session-Id` to the instance id it was initialized against.

use dashmap::DashMap;
use uuid::Uuid;

/// A session's binding. Normally set once at `initialize` time; the legacy
/// SSE transport mints the session id before it knows the instance, so
/// binding is exposed as a separate, idempotent step rather than folded
/// into `create`.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    pub instance_id: Option<String>,
}

/// Concurrent directory of live MCP sessions.
#[derive(Debug, Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionRecord>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mint a fresh session id bound to `instance_id` and record it.
    #[must_use]
    pub fn create(&self, instance_id: Option<String>) -> String {
        let session_id = Uuid::new_v4().to_string();
        self.sessions
            .insert(session_id.clone(), SessionRecord { instance_id });
        session_id
    }

    /// Whether a session exists under this id.
    #[must_use]
    pub fn has(&self, session_id: &str) -> bool {
        self.sessions.contains_key(session_id)
    }

    /// The instance id bound to `session_id`, if the session exists.
    /// Distinguishes "no such session" (outer `None`) from "session exists,
    /// no instance bound" (`Some(None)`).
    #[must_use]
    pub fn instance_id(&self, session_id: &str) -> Option<Option<String>> {
        self.sessions.get(session_id).map(|r| r.instance_id.clone())
    }

    /// Remove a session, per the streamable-HTTP `DELETE` terminate path.
    pub fn remove(&self, session_id: &str) -> bool {
        self.sessions.remove(session_id).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_lookup_round_trips() {
        let store = SessionStore::new();
        let id = store.create(Some("i1".to_string()));
        assert!(store.has(&id));
        assert_eq!(store.instance_id(&id), Some(Some("i1".to_string())));
    }

    #[test]
    fn unknown_session_id_is_outer_none() {
        let store = SessionStore::new();
        assert_eq!(store.instance_id("nope"), None);
    }

    #[test]
    fn session_without_instance_binding_is_inner_none() {
        let store = SessionStore::new();
        let id = store.create(None);
        assert_eq!(store.instance_id(&id), Some(None));
    }

    #[test]
    fn remove_is_idempotent() {
        let store = SessionStore::new();
        let id = store.create(None);
        assert!(store.remove(&id));
        assert!(!store.remove(&id));
        assert!(!store.has(&id));
    }
}
