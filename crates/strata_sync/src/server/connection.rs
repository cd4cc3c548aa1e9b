//! # Connection Registry
//!
//! Stable per-session identifiers for datagram peers, plus the idle sweep
//! that tells the coordinator when a session is gone.
//!
//! ## Design
//!
//! - One id per address for the life of the session (re-`register` is a no-op)
//! - Ids are never reused within a process
//! - Internally locked; shared between the receive loop and the outbound sink

use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

/// Unique identifier for a client connection.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConnectionId(pub u32);

impl ConnectionId {
    /// Invalid/null connection ID.
    pub const NULL: Self = Self(u32::MAX);

    /// Returns true if this is a null/invalid ID.
    #[inline]
    #[must_use]
    pub const fn is_null(self) -> bool {
        self.0 == u32::MAX
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::NULL
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Per-session transport bookkeeping.
#[derive(Clone, Debug)]
pub struct ClientConnection {
    /// Connection ID.
    pub id: ConnectionId,
    /// Client's network address.
    pub addr: SocketAddr,
    /// Last time anything was received from this peer.
    pub last_seen: Instant,
    /// Next sequence number to stamp on an outgoing packet.
    next_send_sequence: u32,
}

impl ClientConnection {
    fn new(id: ConnectionId, addr: SocketAddr, now: Instant) -> Self {
        Self {
            id,
            addr,
            last_seen: now,
            next_send_sequence: 0,
        }
    }

    /// Checks if the connection has been silent for longer than `timeout`.
    #[must_use]
    pub fn is_timed_out(&self, now: Instant, timeout: Duration) -> bool {
        now.saturating_duration_since(self.last_seen) > timeout
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    by_id: HashMap<ConnectionId, ClientConnection>,
    by_addr: HashMap<SocketAddr, ConnectionId>,
    next_id: u32,
}

/// Address <-> session table.
#[derive(Debug)]
pub struct ConnectionRegistry {
    inner: RwLock<RegistryInner>,
    max_sessions: usize,
}

impl ConnectionRegistry {
    /// Creates a registry holding at most `max_sessions` live sessions.
    #[must_use]
    pub fn new(max_sessions: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner::default()),
            max_sessions,
        }
    }

    /// Registers a peer, returning its session id.
    ///
    /// An address that is already registered keeps its id. Returns `None`
    /// when the registry is full.
    pub fn register(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.register_at(addr, Instant::now())
    }

    /// [`register`](Self::register) with an explicit clock.
    pub fn register_at(&self, addr: SocketAddr, now: Instant) -> Option<ConnectionId> {
        let mut inner = self.inner.write();
        if let Some(&id) = inner.by_addr.get(&addr) {
            if let Some(conn) = inner.by_id.get_mut(&id) {
                conn.last_seen = now;
            }
            return Some(id);
        }
        if inner.by_id.len() >= self.max_sessions || inner.next_id == ConnectionId::NULL.0 {
            return None;
        }

        let id = ConnectionId(inner.next_id);
        inner.next_id += 1;
        inner.by_addr.insert(addr, id);
        inner.by_id.insert(id, ClientConnection::new(id, addr, now));
        Some(id)
    }

    /// Session id of an address, if registered.
    #[must_use]
    pub fn lookup(&self, addr: SocketAddr) -> Option<ConnectionId> {
        self.inner.read().by_addr.get(&addr).copied()
    }

    /// Address of a session, if registered.
    #[must_use]
    pub fn addr_of(&self, id: ConnectionId) -> Option<SocketAddr> {
        self.inner.read().by_id.get(&id).map(|c| c.addr)
    }

    /// Records activity on a session. Returns false for unknown ids.
    pub fn touch(&self, id: ConnectionId) -> bool {
        self.touch_at(id, Instant::now())
    }

    /// [`touch`](Self::touch) with an explicit clock.
    pub fn touch_at(&self, id: ConnectionId, now: Instant) -> bool {
        match self.inner.write().by_id.get_mut(&id) {
            Some(conn) => {
                conn.last_seen = now;
                true
            }
            None => false,
        }
    }

    /// Takes the next outgoing sequence number for a session.
    pub fn next_sequence(&self, id: ConnectionId) -> Option<u32> {
        self.inner.write().by_id.get_mut(&id).map(|conn| {
            let seq = conn.next_send_sequence;
            conn.next_send_sequence = conn.next_send_sequence.wrapping_add(1);
            seq
        })
    }

    /// Removes a session. Returns its address if it existed.
    pub fn remove(&self, id: ConnectionId) -> Option<SocketAddr> {
        let mut inner = self.inner.write();
        let conn = inner.by_id.remove(&id)?;
        inner.by_addr.remove(&conn.addr);
        Some(conn.addr)
    }

    /// Removes every session idle for longer than `timeout` and returns
    /// their ids, so the caller can tear down per-session state.
    pub fn expire_idle(&self, timeout: Duration) -> Vec<ConnectionId> {
        self.expire_idle_at(timeout, Instant::now())
    }

    /// [`expire_idle`](Self::expire_idle) with an explicit clock.
    pub fn expire_idle_at(&self, timeout: Duration, now: Instant) -> Vec<ConnectionId> {
        let mut inner = self.inner.write();
        let expired: Vec<ConnectionId> = inner
            .by_id
            .values()
            .filter(|c| c.is_timed_out(now, timeout))
            .map(|c| c.id)
            .collect();

        for id in &expired {
            if let Some(conn) = inner.by_id.remove(id) {
                inner.by_addr.remove(&conn.addr);
            }
        }
        expired
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().by_id.len()
    }

    /// Returns true if no sessions are live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new(crate::DEFAULT_MAX_SESSIONS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(port: u16) -> SocketAddr {
        SocketAddr::from(([127, 0, 0, 1], port))
    }

    #[test]
    fn test_register_is_stable() {
        let registry = ConnectionRegistry::new(8);
        let a = registry.register(addr(1000)).unwrap();
        let b = registry.register(addr(1001)).unwrap();
        assert_ne!(a, b);
        assert_eq!(registry.register(addr(1000)), Some(a));
        assert_eq!(registry.lookup(addr(1001)), Some(b));
        assert_eq!(registry.addr_of(a), Some(addr(1000)));
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let registry = ConnectionRegistry::new(8);
        let a = registry.register(addr(1000)).unwrap();
        assert_eq!(registry.remove(a), Some(addr(1000)));
        assert_eq!(registry.remove(a), None);
        assert!(registry.lookup(addr(1000)).is_none());

        let again = registry.register(addr(1000)).unwrap();
        assert_ne!(again, a);
    }

    #[test]
    fn test_capacity() {
        let registry = ConnectionRegistry::new(2);
        assert!(registry.register(addr(1)).is_some());
        assert!(registry.register(addr(2)).is_some());
        assert!(registry.register(addr(3)).is_none());
        // Known peers are still recognized when full.
        assert!(registry.register(addr(1)).is_some());
    }

    #[test]
    fn test_expire_idle() {
        let registry = ConnectionRegistry::new(8);
        let start = Instant::now();
        let quiet = registry.register_at(addr(1), start).unwrap();
        let chatty = registry.register_at(addr(2), start).unwrap();

        let later = start + Duration::from_secs(20);
        assert!(registry.touch_at(chatty, later));

        let expired = registry.expire_idle_at(Duration::from_secs(10), later);
        assert_eq!(expired, vec![quiet]);
        assert!(registry.addr_of(quiet).is_none());
        assert!(registry.addr_of(chatty).is_some());
        assert!(!registry.touch(quiet));
    }

    #[test]
    fn test_sequence_numbers() {
        let registry = ConnectionRegistry::new(8);
        let id = registry.register(addr(5)).unwrap();
        assert_eq!(registry.next_sequence(id), Some(0));
        assert_eq!(registry.next_sequence(id), Some(1));
        assert_eq!(registry.next_sequence(ConnectionId(99)), None);
        assert!(ConnectionId::default().is_null());
    }
}
