//! Book-keeping for every live connection.
//!
//! The environment talks to connections through the [`Registry`]: it creates
//! them with [`Registry::open`], dispatches events by [`ConnectionId`], and
//! drives every retransmission timer with a single [`Registry::tick`].
//! Connections that destroy themselves — teardown complete, retransmission
//! budget spent, collaborator failure — are swept out immediately after the
//! dispatch that closed them, so no later event can touch destroyed state.

use std::collections::HashMap;
use std::fmt;

use crate::config::Config;
use crate::conn::Conn;
use crate::connection::Connection;
use crate::state::State;

/// Opaque handle identifying one live connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// Owning collection of live connections.
pub struct Registry<C: Conn> {
    conns: HashMap<ConnectionId, Connection<C>>,
    next_id: u64,
}

impl<C: Conn> Registry<C> {
    pub fn new() -> Self {
        Self {
            conns: HashMap::new(),
            next_id: 0,
        }
    }

    /// Create a connection bound to `conn` and register it.
    pub fn open(&mut self, conn: C, cfg: &Config) -> ConnectionId {
        let id = ConnectionId(self.next_id);
        self.next_id += 1;
        self.conns.insert(id, Connection::new(conn, cfg));
        log::debug!("[ctcp] {id} opened");
        id
    }

    /// Release a connection explicitly.  Returns `false` when the id is
    /// already gone (the connection destroyed itself earlier).
    pub fn remove(&mut self, id: ConnectionId) -> bool {
        let existed = self.conns.remove(&id).is_some();
        if existed {
            log::debug!("[ctcp] {id} destroyed");
        }
        existed
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.conns.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.conns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conns.is_empty()
    }

    /// Lifecycle state of a connection, if it is still live.
    pub fn state(&self, id: ConnectionId) -> Option<State> {
        self.conns.get(&id).map(Connection::state)
    }

    /// The application may have produced bytes for `id`.
    pub fn read(&mut self, id: ConnectionId) {
        self.dispatch(id, Connection::read);
    }

    /// A datagram for `id` arrived.
    pub fn receive(&mut self, id: ConnectionId, frame: &[u8]) {
        self.dispatch(id, |conn| conn.receive(frame));
    }

    /// The application sink for `id` may have drained.
    pub fn output(&mut self, id: ConnectionId) {
        self.dispatch(id, Connection::output);
    }

    /// Drive every connection's retransmission timer once.
    ///
    /// Connections may destroy themselves mid-iteration; removal happens in
    /// a sweep afterwards so the iteration never observes freed state.
    pub fn tick(&mut self) {
        let mut dead = Vec::new();
        for (id, conn) in self.conns.iter_mut() {
            conn.tick();
            if conn.is_closed() {
                dead.push(*id);
            }
        }
        for id in dead {
            self.remove(id);
        }
    }

    /// Run one event against a connection, then reap it if the event closed
    /// it.  Events for unknown ids are ignored.
    fn dispatch(&mut self, id: ConnectionId, event: impl FnOnce(&mut Connection<C>)) {
        let Some(conn) = self.conns.get_mut(&id) else {
            log::trace!("[ctcp] event for unknown {id} ignored");
            return;
        };
        event(conn);
        if conn.is_closed() {
            self.remove(id);
        }
    }
}

impl<C: Conn> Default for Registry<C> {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::{FaultModel, Side, SimNet};

    #[test]
    fn open_assigns_distinct_ids() {
        let (_net, a, b) = SimNet::pair(FaultModel::default(), 0);
        let mut reg = Registry::new();
        let ida = reg.open(a, &Config::default());
        let idb = reg.open(b, &Config::default());
        assert_ne!(ida, idb);
        assert_eq!(reg.len(), 2);
        assert_eq!(reg.state(ida), Some(State::Open));
    }

    #[test]
    fn remove_is_single_shot() {
        let (_net, a, _b) = SimNet::pair(FaultModel::default(), 0);
        let mut reg = Registry::new();
        let id = reg.open(a, &Config::default());
        assert!(reg.remove(id));
        assert!(!reg.remove(id));
        assert!(reg.is_empty());
    }

    #[test]
    fn events_for_unknown_ids_are_ignored() {
        let (_net, a, _b) = SimNet::pair(FaultModel::default(), 0);
        let mut reg = Registry::new();
        let id = reg.open(a, &Config::default());
        reg.remove(id);
        // None of these may panic or resurrect state.
        reg.read(id);
        reg.receive(id, b"junk");
        reg.output(id);
        reg.tick();
        assert!(reg.is_empty());
    }

    #[test]
    fn dispatch_reaps_a_connection_that_closed_itself() {
        let (net, a, _b) = SimNet::pair(FaultModel::default(), 0);
        net.break_transport(Side::A);
        net.push_input(Side::A, b"hello");
        let mut reg = Registry::new();
        let id = reg.open(a, &Config::default());
        reg.read(id); // transport failure destroys the connection
        assert!(!reg.contains(id));
    }

    #[test]
    fn tick_sweeps_exhausted_connections() {
        let cfg = Config {
            rt_timeout_ms: 100,
            timer_ms: 100,
            max_retransmits: 2,
            ..Config::default()
        };
        let (net, a, b) = SimNet::pair(FaultModel::default(), 0);
        let mut reg = Registry::new();
        let ida = reg.open(a, &cfg);
        let idb = reg.open(b, &cfg);

        // Only A has anything in flight; its ACKs never arrive.
        net.push_input(Side::A, b"hello");
        reg.read(ida);

        for _ in 0..4 {
            net.advance(100);
            reg.tick();
        }
        assert!(!reg.contains(ida), "exhausted connection must be swept");
        assert!(reg.contains(idb), "idle connection must survive");
    }
}
