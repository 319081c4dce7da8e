//! State scopes - where an executing agent reads and writes session state
//!
//! The top of a task writes straight through to the [`SessionStore`]. A
//! parallel branch gets a [`BranchState`]: a private overlay over a snapshot
//! taken at fan-out, whose writes only reach the parent through a merge.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;

use crate::core::{Message, SessionId};
use crate::session::store::{SessionState, SessionStore};

/// Isolated state of one parallel branch
#[derive(Debug, Clone)]
pub struct BranchState {
    base: SessionState,
    writes: BTreeMap<String, Value>,
    messages: Vec<Message>,
}

impl BranchState {
    pub fn new(base: SessionState) -> Self {
        Self {
            base,
            writes: BTreeMap::new(),
            messages: Vec::new(),
        }
    }

    /// Consume the branch, returning its buffered writes and messages
    pub fn into_parts(self) -> (BTreeMap<String, Value>, Vec<Message>) {
        (self.writes, self.messages)
    }
}

/// Read/write view of session state for one execution path
#[derive(Clone)]
pub enum StateScope {
    /// Writes go directly to the shared store
    Session {
        store: Arc<SessionStore>,
        id: SessionId,
    },
    /// Writes stay local until merged
    Branch(BranchState),
}

impl StateScope {
    pub fn session(store: Arc<SessionStore>, id: SessionId) -> Self {
        Self::Session { store, id }
    }

    /// Current view, including this scope's own writes
    pub fn snapshot(&self) -> SessionState {
        match self {
            Self::Session { store, id } => store.snapshot(id),
            Self::Branch(branch) => {
                let mut state = branch.base.clone();
                for (key, value) in &branch.writes {
                    state.variables.insert(key.clone(), value.clone());
                }
                state.messages.extend(branch.messages.iter().cloned());
                state
            }
        }
    }

    pub fn set(&mut self, key: impl Into<String>, value: Value) {
        match self {
            Self::Session { store, id } => store.set_variable(id, key, value),
            Self::Branch(branch) => {
                branch.writes.insert(key.into(), value);
            }
        }
    }

    pub fn append(&mut self, message: Message) {
        match self {
            Self::Session { store, id } => store.append_message(id, message),
            Self::Branch(branch) => branch.messages.push(message),
        }
    }

    /// Take an independent snapshot for a new branch
    pub fn fork(&self) -> BranchState {
        BranchState::new(self.snapshot())
    }

    /// Apply merged writes and branch messages to this scope
    pub fn apply(&mut self, writes: Vec<(String, Value)>, messages: Vec<Message>) {
        for (key, value) in writes {
            self.set(key, value);
        }
        for message in messages {
            self.append(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_scope() -> (Arc<SessionStore>, StateScope) {
        let store = Arc::new(SessionStore::default());
        let scope = StateScope::session(Arc::clone(&store), SessionId::from("s"));
        (store, scope)
    }

    #[test]
    fn test_session_scope_writes_through() {
        let (store, mut scope) = session_scope();
        scope.set("x", json!(1));
        scope.append(Message::user("hi"));

        let id = SessionId::from("s");
        assert_eq!(store.get_variable(&id, "x"), Some(json!(1)));
        assert_eq!(store.snapshot(&id).messages.len(), 1);
    }

    #[test]
    fn test_branches_are_isolated() {
        let (store, mut root) = session_scope();
        root.set("x", json!("base"));

        let mut a = StateScope::Branch(root.fork());
        let mut b = StateScope::Branch(root.fork());
        a.set("x", json!("from a"));
        b.set("x", json!("from b"));

        assert_eq!(a.snapshot().variable("x"), Some(&json!("from a")));
        assert_eq!(b.snapshot().variable("x"), Some(&json!("from b")));
        assert_eq!(root.snapshot().variable("x"), Some(&json!("base")));
        assert_eq!(
            store.get_variable(&SessionId::from("s"), "x"),
            Some(json!("base"))
        );
    }

    #[test]
    fn test_branch_snapshot_includes_own_writes() {
        let (_store, root) = session_scope();
        let mut branch = StateScope::Branch(root.fork());
        branch.set("y", json!(true));
        branch.append(Message::assistant("done"));

        let snapshot = branch.snapshot();
        assert_eq!(snapshot.variable("y"), Some(&json!(true)));
        assert_eq!(snapshot.messages.len(), 1);
    }

    #[test]
    fn test_apply_merges_into_parent() {
        let (store, mut root) = session_scope();
        let mut branch = StateScope::Branch(root.fork());
        branch.set("z", json!(3));
        branch.append(Message::assistant("branch said"));

        let StateScope::Branch(state) = branch else {
            unreachable!()
        };
        let (writes, messages) = state.into_parts();
        root.apply(writes.into_iter().collect(), messages);

        let id = SessionId::from("s");
        assert_eq!(store.get_variable(&id, "z"), Some(json!(3)));
        assert_eq!(store.snapshot(&id).messages[0].content, "branch said");
    }
}
