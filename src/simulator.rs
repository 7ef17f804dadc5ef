//! Deterministic in-memory environment for exercising the engine.
//!
//! Real networks drop, reorder, and duplicate datagrams.  To test the
//! reliability machinery without sockets, threads, or wall clocks, this
//! module provides [`SimNet`]: a pair of [`Conn`] endpoints joined by
//! fault-injected frame queues, with scripted application streams and a
//! manually advanced clock.
//!
//! | Fault        | Description                                        |
//! |--------------|----------------------------------------------------|
//! | Loss         | Drop a frame with probability `loss_rate`.         |
//! | Reordering   | Let a frame overtake the one queued just before it.|
//! | Duplication  | Enqueue a frame twice.                             |
//!
//! Faults draw from a seeded RNG, so every failure reproduces from its seed.
//! Frames sit in per-endpoint inboxes until the test drains them and feeds
//! them to `receive`, which is what makes reorder-by-hand scenarios and
//! selective drops trivial to script.
//!
//! Endpoints share state through `Rc`, so a simulated pair lives on one
//! thread — exactly the confinement the engine itself requires.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::conn::{Conn, Input};

/// Which endpoint of a simulated pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    A,
    B,
}

impl Side {
    fn other(self) -> Side {
        match self {
            Side::A => Side::B,
            Side::B => Side::A,
        }
    }
}

/// Fault-injection probabilities, each in `[0.0, 1.0]`.
#[derive(Debug, Clone)]
pub struct FaultModel {
    /// Probability that any given frame is silently dropped.
    pub loss_rate: f64,
    /// Probability that a frame is queued ahead of its predecessor.
    pub reorder_rate: f64,
    /// Probability that a frame is enqueued twice.
    pub duplicate_rate: f64,
}

impl Default for FaultModel {
    fn default() -> Self {
        // No faults: the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            reorder_rate: 0.0,
            duplicate_rate: 0.0,
        }
    }
}

/// Application streams and transport queue for one endpoint.
struct Endpoint {
    /// Bytes the application has queued for sending.
    source: VecDeque<u8>,
    source_eof: bool,
    /// Bytes delivered to the application sink.
    sink: Vec<u8>,
    sink_eof: bool,
    sink_closed: bool,
    bufspace: usize,
    /// When set, every `send` from this endpoint fails permanently.
    send_fails: bool,
    /// Frames in flight towards this endpoint.
    inbox: VecDeque<Vec<u8>>,
}

impl Endpoint {
    fn new() -> Self {
        Self {
            source: VecDeque::new(),
            source_eof: false,
            sink: Vec::new(),
            sink_eof: false,
            sink_closed: false,
            bufspace: 1 << 20,
            send_fails: false,
            inbox: VecDeque::new(),
        }
    }
}

struct SimState {
    now_ms: i64,
    faults: FaultModel,
    rng: StdRng,
    a: Endpoint,
    b: Endpoint,
}

impl SimState {
    fn ep(&self, side: Side) -> &Endpoint {
        match side {
            Side::A => &self.a,
            Side::B => &self.b,
        }
    }

    fn ep_mut(&mut self, side: Side) -> &mut Endpoint {
        match side {
            Side::A => &mut self.a,
            Side::B => &mut self.b,
        }
    }
}

// ---------------------------------------------------------------------------
// SimNet — the test-side handle
// ---------------------------------------------------------------------------

/// Test-side handle controlling both endpoints and the clock.
#[derive(Clone)]
pub struct SimNet {
    state: Rc<RefCell<SimState>>,
}

impl SimNet {
    /// Build a connected endpoint pair with the given fault model and seed.
    pub fn pair(faults: FaultModel, seed: u64) -> (SimNet, SimConn, SimConn) {
        let state = Rc::new(RefCell::new(SimState {
            now_ms: 0,
            faults,
            rng: StdRng::seed_from_u64(seed),
            a: Endpoint::new(),
            b: Endpoint::new(),
        }));
        let net = SimNet {
            state: Rc::clone(&state),
        };
        let a = SimConn {
            state: Rc::clone(&state),
            side: Side::A,
        };
        let b = SimConn { state, side: Side::B };
        (net, a, b)
    }

    /// Move the shared clock forward.
    pub fn advance(&self, ms: i64) {
        self.state.borrow_mut().now_ms += ms;
    }

    pub fn now_ms(&self) -> i64 {
        self.state.borrow().now_ms
    }

    // -- application-side controls ------------------------------------------

    /// Queue bytes on `side`'s application source.
    pub fn push_input(&self, side: Side, bytes: &[u8]) {
        self.state.borrow_mut().ep_mut(side).source.extend(bytes);
    }

    /// Mark `side`'s application source as finished.
    pub fn close_input(&self, side: Side) {
        self.state.borrow_mut().ep_mut(side).source_eof = true;
    }

    /// Everything delivered to `side`'s sink so far.
    pub fn sink(&self, side: Side) -> Vec<u8> {
        self.state.borrow().ep(side).sink.clone()
    }

    /// Whether end-of-stream has been signalled to `side`'s sink.
    pub fn sink_eof(&self, side: Side) -> bool {
        self.state.borrow().ep(side).sink_eof
    }

    /// Set the sink capacity `side` advertises to the engine.
    pub fn set_bufspace(&self, side: Side, n: usize) {
        self.state.borrow_mut().ep_mut(side).bufspace = n;
    }

    /// Make every future write to `side`'s sink fail.
    pub fn close_sink(&self, side: Side) {
        self.state.borrow_mut().ep_mut(side).sink_closed = true;
    }

    /// Make every future `send` from `side` fail.
    pub fn break_transport(&self, side: Side) {
        self.state.borrow_mut().ep_mut(side).send_fails = true;
    }

    // -- network-side controls ----------------------------------------------

    /// Frames currently queued towards `side`, in delivery order.  Draining
    /// hands delivery control to the test: feed them to `receive`, drop
    /// them, or shuffle them first.
    pub fn drain_inbox(&self, side: Side) -> Vec<Vec<u8>> {
        self.state
            .borrow_mut()
            .ep_mut(side)
            .inbox
            .drain(..)
            .collect()
    }

    /// Number of frames queued towards `side`.
    pub fn inbox_len(&self, side: Side) -> usize {
        self.state.borrow().ep(side).inbox.len()
    }
}

// ---------------------------------------------------------------------------
// SimConn — the engine-side endpoint
// ---------------------------------------------------------------------------

/// The endpoint handed to a [`crate::Connection`]; one half of a
/// [`SimNet::pair`].
pub struct SimConn {
    state: Rc<RefCell<SimState>>,
    side: Side,
}

impl Conn for SimConn {
    fn send(&mut self, frame: &[u8]) -> io::Result<usize> {
        let mut st = self.state.borrow_mut();
        if st.ep(self.side).send_fails {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "transport down"));
        }

        let faults = st.faults.clone();
        if st.rng.random::<f64>() < faults.loss_rate {
            return Ok(frame.len()); // swallowed by the network
        }
        let duplicate = st.rng.random::<f64>() < faults.duplicate_rate;
        let reorder = st.rng.random::<f64>() < faults.reorder_rate;

        let inbox = &mut st.ep_mut(self.side.other()).inbox;
        if reorder && !inbox.is_empty() {
            let last = inbox.len() - 1;
            inbox.insert(last, frame.to_vec());
        } else {
            inbox.push_back(frame.to_vec());
        }
        if duplicate {
            st.ep_mut(self.side.other()).inbox.push_back(frame.to_vec());
        }
        Ok(frame.len())
    }

    fn input(&mut self, buf: &mut [u8]) -> Input {
        let mut st = self.state.borrow_mut();
        let ep = st.ep_mut(self.side);
        if ep.source.is_empty() {
            return if ep.source_eof {
                Input::Eof
            } else {
                Input::WouldBlock
            };
        }
        let n = buf.len().min(ep.source.len());
        for (dst, src) in buf[..n].iter_mut().zip(ep.source.drain(..n)) {
            *dst = src;
        }
        Input::Data(n)
    }

    fn output(&mut self, data: &[u8]) -> io::Result<usize> {
        let mut st = self.state.borrow_mut();
        let ep = st.ep_mut(self.side);
        if ep.sink_closed {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "sink closed"));
        }
        if data.is_empty() {
            ep.sink_eof = true;
            return Ok(0);
        }
        ep.sink.extend_from_slice(data);
        Ok(data.len())
    }

    fn bufspace(&self) -> usize {
        self.state.borrow().ep(self.side).bufspace
    }

    fn now_ms(&self) -> i64 {
        self.state.borrow().now_ms
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
