//! Session-scoped table locks
//!
//! Each table carries shared/exclusive lock state keyed by session id,
//! modeling SQL-style statement-level table locks on top of the structural
//! `RwLock` that protects the index itself. Acquisition evaluates the grant
//! predicate and mutates the holder sets inside one critical section, so
//! test-and-acquire is a single atomic step.
//!
//! There is no blocking, no upgrade protocol and no deadlock detection: a
//! denied request is a normal "try again" outcome the caller reports upward.

use crate::session::SessionId;
use std::collections::HashSet;
use std::sync::Mutex;

/// Outcome of an exclusive-lock request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExclusiveGrant {
    /// The lock is now held by the requesting session
    Granted,
    /// The session already held the lock; nothing changed
    AlreadyHeld,
    /// A conflicting holder exists; the caller may retry later
    Busy,
}

#[derive(Debug, Default)]
struct HolderSets {
    shared: HashSet<SessionId>,
    exclusive: HashSet<SessionId>,
}

/// Shared/exclusive lock state for one table
#[derive(Debug, Default)]
pub struct LockState {
    holders: Mutex<HolderSets>,
}

impl LockState {
    /// Create lock state with no holders
    pub fn new() -> Self {
        Self::default()
    }

    /// Try to take a shared lock; idempotent for a session that holds one.
    ///
    /// Granted iff no other session holds the exclusive lock.
    pub fn try_acquire_shared(&self, session: SessionId) -> bool {
        let mut holders = self.holders.lock().unwrap();
        if holders.exclusive.is_empty() || holders.exclusive.contains(&session) {
            holders.shared.insert(session);
            true
        } else {
            false
        }
    }

    /// Release the session's shared lock, if held
    pub fn release_shared(&self, session: SessionId) {
        self.holders.lock().unwrap().shared.remove(&session);
    }

    /// Try to take the exclusive lock.
    ///
    /// Granted iff no session holds the exclusive lock and the shared set is
    /// empty or contains only the requester.
    pub fn try_acquire_exclusive(&self, session: SessionId) -> ExclusiveGrant {
        let mut holders = self.holders.lock().unwrap();
        if holders.exclusive.contains(&session) {
            return ExclusiveGrant::AlreadyHeld;
        }
        let shared_ok =
            holders.shared.is_empty() || (holders.shared.len() == 1 && holders.shared.contains(&session));
        if shared_ok && holders.exclusive.is_empty() {
            holders.exclusive.insert(session);
            ExclusiveGrant::Granted
        } else {
            ExclusiveGrant::Busy
        }
    }

    /// Release the session's exclusive lock, if held
    pub fn release_exclusive(&self, session: SessionId) {
        self.holders.lock().unwrap().exclusive.remove(&session);
    }

    /// Sessions currently holding a shared lock
    pub fn shared_holders(&self) -> Vec<SessionId> {
        let mut ids: Vec<_> = self.holders.lock().unwrap().shared.iter().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// The session currently holding the exclusive lock, if any
    pub fn exclusive_holder(&self) -> Option<SessionId> {
        self.holders.lock().unwrap().exclusive.iter().next().copied()
    }
}
