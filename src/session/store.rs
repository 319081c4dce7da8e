//! Session store - message history and shared variables per conversation
//!
//! Messages are append-only and capped at a configurable length; variables
//! are last-writer-wins. Each session sits behind its own lock, so writers to
//! one session serialize while different sessions never contend.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::core::{Message, SessionId};

/// Full state of one session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    pub session_id: SessionId,
    /// Ordered message history, oldest first
    pub messages: Vec<Message>,
    /// Shared variables written by agents and tools
    pub variables: BTreeMap<String, Value>,
    /// Agents visited by the most recent task, in order
    pub delegation_chain: Vec<String>,
}

impl SessionState {
    pub fn new(session_id: SessionId) -> Self {
        Self {
            session_id,
            messages: Vec::new(),
            variables: BTreeMap::new(),
            delegation_chain: Vec::new(),
        }
    }

    /// The last `count` messages
    pub fn recent_messages(&self, count: usize) -> &[Message] {
        let start = self.messages.len().saturating_sub(count);
        &self.messages[start..]
    }

    pub fn variable(&self, key: &str) -> Option<&Value> {
        self.variables.get(key)
    }
}

/// Store of all live sessions
pub struct SessionStore {
    sessions: DashMap<SessionId, Arc<Mutex<SessionState>>>,
    /// Maximum stored messages per session
    max_history: usize,
}

impl SessionStore {
    pub fn new(max_history: usize) -> Self {
        Self {
            sessions: DashMap::new(),
            max_history: max_history.max(1),
        }
    }

    /// Get the session's lock, creating the session on first use
    fn entry(&self, id: &SessionId) -> Arc<Mutex<SessionState>> {
        self.sessions
            .entry(id.clone())
            .or_insert_with(|| {
                debug!(session_id = %id, "Creating session");
                Arc::new(Mutex::new(SessionState::new(id.clone())))
            })
            .clone()
    }

    /// Create the session if it does not exist yet
    pub fn ensure(&self, id: &SessionId) {
        self.entry(id);
    }

    pub fn contains(&self, id: &SessionId) -> bool {
        self.sessions.contains_key(id)
    }

    /// Append a message, dropping the oldest ones past the history cap
    pub fn append_message(&self, id: &SessionId, message: Message) {
        let session = self.entry(id);
        let mut state = session.lock();
        state.messages.push(message);

        let overflow = state.messages.len().saturating_sub(self.max_history);
        if overflow > 0 {
            state.messages.drain(..overflow);
        }
    }

    /// Set a variable; the latest write wins
    pub fn set_variable(&self, id: &SessionId, key: impl Into<String>, value: Value) {
        let session = self.entry(id);
        session.lock().variables.insert(key.into(), value);
    }

    pub fn get_variable(&self, id: &SessionId, key: &str) -> Option<Value> {
        let session = self.sessions.get(id)?.clone();
        let value = session.lock().variables.get(key).cloned();
        value
    }

    /// Record the agents visited by the latest task
    pub fn set_delegation_chain(&self, id: &SessionId, chain: Vec<String>) {
        let session = self.entry(id);
        session.lock().delegation_chain = chain;
    }

    /// Read-only copy of the session; an unknown id reads as empty
    pub fn snapshot(&self, id: &SessionId) -> SessionState {
        self.sessions
            .get(id)
            .map(|session| session.lock().clone())
            .unwrap_or_else(|| SessionState::new(id.clone()))
    }

    /// Drop message history, keeping variables
    pub fn clear_messages(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id) {
            session.lock().messages.clear();
        }
    }

    /// Remove a session entirely
    pub fn remove(&self, id: &SessionId) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn session_ids(&self) -> Vec<SessionId> {
        let mut ids: Vec<SessionId> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new(1000)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_append_preserves_order() {
        let store = SessionStore::default();
        let id = SessionId::from("s1");

        store.append_message(&id, Message::user("first"));
        store.append_message(&id, Message::assistant("second"));

        let snapshot = store.snapshot(&id);
        let contents: Vec<_> = snapshot.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second"]);
    }

    #[test]
    fn test_history_cap_drops_oldest() {
        let store = SessionStore::new(2);
        let id = SessionId::from("s1");
        for i in 0..4 {
            store.append_message(&id, Message::user(format!("m{}", i)));
        }

        let snapshot = store.snapshot(&id);
        assert_eq!(snapshot.messages.len(), 2);
        assert_eq!(snapshot.messages[0].content, "m2");
    }

    #[test]
    fn test_variables_last_writer_wins() {
        let store = SessionStore::default();
        let id = SessionId::from("s1");

        assert!(store.get_variable(&id, "x").is_none());
        store.set_variable(&id, "x", json!(1));
        store.set_variable(&id, "x", json!(2));
        assert_eq!(store.get_variable(&id, "x"), Some(json!(2)));
    }

    #[test]
    fn test_snapshot_is_a_copy() {
        let store = SessionStore::default();
        let id = SessionId::from("s1");
        store.set_variable(&id, "x", json!("before"));

        let snapshot = store.snapshot(&id);
        store.set_variable(&id, "x", json!("after"));

        assert_eq!(snapshot.variable("x"), Some(&json!("before")));
    }

    #[test]
    fn test_reading_unknown_session_does_not_create_it() {
        let store = SessionStore::default();
        let id = SessionId::from("ghost");

        let snapshot = store.snapshot(&id);
        assert_eq!(snapshot.session_id, id);
        assert!(snapshot.messages.is_empty());
        assert!(!store.contains(&id));
        assert!(store.session_ids().is_empty());
    }

    #[test]
    fn test_sessions_are_independent() {
        let store = SessionStore::default();
        let a = SessionId::from("a");
        let b = SessionId::from("b");
        store.set_variable(&a, "x", json!(1));

        assert!(store.get_variable(&b, "x").is_none());
        assert_eq!(store.session_ids().len(), 1);
        store.ensure(&b);
        assert_eq!(store.session_ids(), vec![a.clone(), b]);
        assert!(store.remove(&a));
        assert!(!store.contains(&a));
    }

    #[test]
    fn test_concurrent_appends_are_serialized() {
        let store = Arc::new(SessionStore::default());
        let id = SessionId::from("busy");

        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = Arc::clone(&store);
                let id = id.clone();
                std::thread::spawn(move || {
                    for i in 0..50 {
                        store.append_message(&id, Message::user(format!("{}-{}", t, i)));
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.snapshot(&id).messages.len(), 400);
    }
}
