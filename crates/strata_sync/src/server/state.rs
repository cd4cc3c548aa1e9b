//! # Server Session State
//!
//! Interest state of every session, plus coordinator counters.
//!
//! ## Locking
//!
//! The session map is behind a `RwLock` that is only write-locked to add
//! or remove a session. Each session's [`ClientDetails`] sits behind its own
//! `Mutex`, so reports from different clients never wait on each other.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use super::connection::ConnectionId;
use crate::interest::{ClientDetails, InterestConfig};

/// Shared handle to one session's interest state.
pub type SessionHandle = Arc<Mutex<ClientDetails>>;

/// Coordinator counters.
#[derive(Debug, Default)]
pub struct ServerStats {
    reports_handled: AtomicU64,
    reports_dropped: AtomicU64,
    pushes_sent: AtomicU64,
    push_failures: AtomicU64,
    edits_applied: AtomicU64,
    edits_dropped: AtomicU64,
}

/// Point-in-time copy of [`ServerStats`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    /// Position reports processed.
    pub reports_handled: u64,
    /// Position reports rejected (non-finite position).
    pub reports_dropped: u64,
    /// Region pushes handed to the transport.
    pub pushes_sent: u64,
    /// Region pushes the transport refused.
    pub push_failures: u64,
    /// Edits that changed the world.
    pub edits_applied: u64,
    /// Edits rejected or outside the world.
    pub edits_dropped: u64,
}

impl ServerStats {
    pub(crate) fn record_report(&self, sent: usize, failed: usize) {
        self.reports_handled.fetch_add(1, Ordering::Relaxed);
        self.pushes_sent.fetch_add(sent as u64, Ordering::Relaxed);
        self.push_failures.fetch_add(failed as u64, Ordering::Relaxed);
    }

    pub(crate) fn record_dropped_report(&self) {
        self.reports_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_edit(&self, applied: bool) {
        let counter = if applied {
            &self.edits_applied
        } else {
            &self.edits_dropped
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Reads every counter.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reports_handled: self.reports_handled.load(Ordering::Relaxed),
            reports_dropped: self.reports_dropped.load(Ordering::Relaxed),
            pushes_sent: self.pushes_sent.load(Ordering::Relaxed),
            push_failures: self.push_failures.load(Ordering::Relaxed),
            edits_applied: self.edits_applied.load(Ordering::Relaxed),
            edits_dropped: self.edits_dropped.load(Ordering::Relaxed),
        }
    }
}

/// All live sessions.
#[derive(Debug)]
pub struct ServerState {
    sessions: RwLock<HashMap<ConnectionId, SessionHandle>>,
    config: InterestConfig,
    stats: ServerStats,
}

impl ServerState {
    /// Creates empty state; new sessions use `config`.
    #[must_use]
    pub fn new(config: InterestConfig) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            config,
            stats: ServerStats::default(),
        }
    }

    /// Interest tuning applied to new sessions.
    #[must_use]
    pub const fn config(&self) -> &InterestConfig {
        &self.config
    }

    /// Counters.
    #[must_use]
    pub const fn stats(&self) -> &ServerStats {
        &self.stats
    }

    /// The session for a connection, if one exists.
    #[must_use]
    pub fn session(&self, id: ConnectionId) -> Option<SessionHandle> {
        self.sessions.read().get(&id).cloned()
    }

    /// The session for a connection, created on first use.
    pub fn session_or_insert(&self, id: ConnectionId) -> SessionHandle {
        if let Some(session) = self.session(id) {
            return session;
        }
        let mut sessions = self.sessions.write();
        Arc::clone(sessions.entry(id).or_insert_with(|| {
            tracing::info!(connection = %id, "session opened");
            Arc::new(Mutex::new(ClientDetails::new(self.config)))
        }))
    }

    /// Drops a session. Returns true if it existed.
    pub fn remove(&self, id: ConnectionId) -> bool {
        self.sessions.write().remove(&id).is_some()
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    /// Returns true if there are no sessions.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids of every live session.
    #[must_use]
    pub fn ids(&self) -> Vec<ConnectionId> {
        self.sessions.read().keys().copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_created_once() {
        let state = ServerState::new(InterestConfig::default());
        let a = state.session_or_insert(ConnectionId(1));
        let b = state.session_or_insert(ConnectionId(1));
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(state.len(), 1);

        assert!(state.remove(ConnectionId(1)));
        assert!(!state.remove(ConnectionId(1)));
        assert!(state.is_empty());
        assert!(state.session(ConnectionId(1)).is_none());
    }

    #[test]
    fn test_stats_snapshot() {
        let stats = ServerStats::default();
        stats.record_report(3, 1);
        stats.record_dropped_report();
        stats.record_edit(true);
        stats.record_edit(false);
        stats.record_edit(false);

        assert_eq!(
            stats.snapshot(),
            StatsSnapshot {
                reports_handled: 1,
                reports_dropped: 1,
                pushes_sent: 3,
                push_failures: 1,
                edits_applied: 1,
                edits_dropped: 2,
            }
        );
    }
}
