//! Session tracking
//!
//! Sessions are externally assigned ids, one per connected client. The
//! engine never creates sessions of its own except during log replay, where
//! it needs an id guaranteed not to collide with any live session — the
//! registry exists to answer that question.

use std::collections::HashSet;

/// Identifier of a client session
pub type SessionId = u64;

/// Registry of live session ids
///
/// A session is either active (executing statements) or waiting (its last
/// lock request was denied and it is retrying). Both states count as live.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    active: HashSet<SessionId>,
    waiting: HashSet<SessionId>,
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Track a session as active
    pub fn register(&mut self, session: SessionId) {
        self.waiting.remove(&session);
        self.active.insert(session);
    }

    /// Stop tracking a session entirely
    pub fn retire(&mut self, session: SessionId) {
        self.active.remove(&session);
        self.waiting.remove(&session);
    }

    /// Move a session to the waiting set
    pub fn mark_waiting(&mut self, session: SessionId) {
        self.active.remove(&session);
        self.waiting.insert(session);
    }

    /// Check whether a session is tracked as active
    pub fn is_active(&self, session: SessionId) -> bool {
        self.active.contains(&session)
    }

    /// Number of live sessions
    pub fn len(&self) -> usize {
        self.active.len() + self.waiting.len()
    }

    /// Check whether no session is live
    pub fn is_empty(&self) -> bool {
        self.active.is_empty() && self.waiting.is_empty()
    }

    /// An id strictly greater than every live session id
    pub fn fresh_id(&self) -> SessionId {
        self.active
            .iter()
            .chain(self.waiting.iter())
            .max()
            .copied()
            .unwrap_or(0)
            + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_id_clears_all_live_sessions() {
        let mut registry = SessionRegistry::new();
        assert_eq!(registry.fresh_id(), 1);

        registry.register(3);
        registry.register(7);
        registry.mark_waiting(7);
        assert_eq!(registry.fresh_id(), 8);

        registry.retire(7);
        assert_eq!(registry.fresh_id(), 4);
    }

    #[test]
    fn test_waiting_and_active_are_exclusive() {
        let mut registry = SessionRegistry::new();
        registry.register(1);
        assert!(registry.is_active(1));

        registry.mark_waiting(1);
        assert!(!registry.is_active(1));
        assert_eq!(registry.len(), 1);

        registry.register(1);
        assert!(registry.is_active(1));
        assert_eq!(registry.len(), 1);
    }
}
