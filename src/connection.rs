//! Per-connection protocol engine.
//!
//! A [`Connection`] couples the send window, the reassembly buffer, and the
//! retransmission timer behind four externally driven entry points:
//!
//! | event                           | entry point           |
//! |---------------------------------|-----------------------|
//! | application produced bytes      | [`Connection::read`]    |
//! | datagram arrived from the peer  | [`Connection::receive`] |
//! | application sink has capacity   | [`Connection::output`]  |
//! | periodic timer                  | [`Connection::tick`]    |
//!
//! Every call runs to completion without blocking; all I/O goes through the
//! connection's [`Conn`] collaborator, which the connection owns for its
//! lifetime.
//!
//! # Teardown
//!
//! A connection destroys itself when the close handshake completes in both
//! directions (our FIN acknowledged, the peer's FIN delivered downstream),
//! when the oldest unacked segment exhausts its retransmission budget, or
//! when the transport or sink fails permanently.  Destruction is observable
//! through [`Connection::is_closed`]; the registry drops closed connections
//! right after the dispatch that closed them.

use crate::config::Config;
use crate::conn::{Conn, Input};
use crate::receiver::Reassembler;
use crate::segment::{flags, seq_lt, Header, Segment, MAX_SEG_DATA_SIZE};
use crate::sender::SendWindow;
use crate::state::State;
use crate::timer::RetransmitTimer;

/// One reliable byte-stream connection over an unreliable datagram channel.
pub struct Connection<C: Conn> {
    conn: C,
    sender: SendWindow,
    receiver: Reassembler,
    timer: RetransmitTimer,
    /// Sequence slot our FIN occupies, once sent.
    fin_seqno: Option<u32>,
    /// The peer's FIN has been consumed from the reassembly buffer.
    recv_fin: bool,
    /// End-of-stream has been signalled to the sink.
    eof_delivered: bool,
    closed: bool,
}

impl<C: Conn> Connection<C> {
    /// Bind a fresh connection to its collaborator.  Both directions start
    /// at sequence number 1.
    pub fn new(conn: C, cfg: &Config) -> Self {
        Self {
            conn,
            sender: SendWindow::new(cfg.send_window_bytes()),
            receiver: Reassembler::new(cfg.recv_window_bytes()),
            timer: RetransmitTimer::new(cfg.rt_timeout_ms, cfg.max_retransmits),
            fin_seqno: None,
            recv_fin: false,
            eof_delivered: false,
            closed: false,
        }
    }

    /// `true` once the connection has destroyed itself; no entry point will
    /// touch its state again.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Current send-direction lifecycle state.
    pub fn state(&self) -> State {
        if self.closed {
            return State::Closed;
        }
        match self.fin_seqno {
            None => State::Open,
            Some(fin) if seq_lt(fin, self.sender.send_base()) => State::FinAcked,
            Some(_) => State::FinSent,
        }
    }

    /// Number of segments awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.sender.in_flight()
    }

    // -----------------------------------------------------------------------
    // Entry points
    // -----------------------------------------------------------------------

    /// The application may have produced bytes: pull, segment, transmit.
    ///
    /// Stops when the source would block, the window budget is spent, or the
    /// source reports end-of-stream (which emits a single FIN).
    pub fn read(&mut self) {
        if self.closed || self.fin_seqno.is_some() {
            return;
        }
        let mut buf = [0u8; MAX_SEG_DATA_SIZE];
        loop {
            // Capping the request at the remaining budget keeps every
            // transmitted byte inside `send_base + window`.
            let budget = self.sender.budget() as usize;
            if budget == 0 {
                break;
            }
            let want = budget.min(MAX_SEG_DATA_SIZE);
            match self.conn.input(&mut buf[..want]) {
                Input::WouldBlock | Input::Data(0) => break,
                Input::Eof => {
                    let fin = self.build_segment(flags::FIN | flags::ACK, Vec::new());
                    self.fin_seqno = Some(fin.header.seqno);
                    log::debug!("[ctcp] → FIN seqno={}", fin.header.seqno);
                    self.transmit_new(fin);
                    break;
                }
                Input::Data(n) => {
                    let seg = self.build_segment(flags::ACK, buf[..n].to_vec());
                    log::debug!(
                        "[ctcp] → DATA seqno={} len={} in_flight={}",
                        seg.header.seqno,
                        n,
                        self.sender.in_flight() + 1
                    );
                    self.transmit_new(seg);
                    if self.closed {
                        return;
                    }
                }
            }
        }
    }

    /// A datagram addressed to this connection arrived.
    ///
    /// Malformed frames are dropped silently and never acknowledged.
    pub fn receive(&mut self, frame: &[u8]) {
        if self.closed {
            return;
        }
        let segment = match Segment::decode(frame) {
            Ok(segment) => segment,
            Err(err) => {
                log::debug!("[ctcp] dropping malformed datagram: {err}");
                return;
            }
        };

        if segment.is_ack() && self.sender.on_ack(segment.header.ackno) {
            // A different segment (or none) is now the oldest in flight.
            let now = self.conn.now_ms();
            self.timer.restart(now);
            log::debug!(
                "[ctcp] ← ACK ackno={} in_flight={}",
                segment.header.ackno,
                self.sender.in_flight()
            );
        }

        if segment.seq_len() > 0 {
            let (seqno, len) = (segment.header.seqno, segment.payload.len());
            let admitted = self.receiver.insert(segment);
            log::debug!("[ctcp] ← DATA seqno={seqno} len={len} admitted={admitted}");
            self.flush_to_sink();
            if !self.closed {
                // Duplicates are acknowledged too, so a lossy ACK path
                // recovers from retransmissions.
                self.send_ack();
            }
        }

        self.maybe_finish();
    }

    /// The application sink may have drained; deliver what is contiguous.
    pub fn output(&mut self) {
        if self.closed {
            return;
        }
        self.flush_to_sink();
        self.maybe_finish();
    }

    /// Periodic timer: retransmit the oldest unacked segment on timeout, or
    /// tear the connection down once its attempt budget is spent.
    pub fn tick(&mut self) {
        if self.closed || !self.sender.has_unacked() {
            return;
        }
        let now = self.conn.now_ms();
        if !self.timer.expired(now) {
            return;
        }
        if self.timer.exhausted() {
            log::warn!(
                "[ctcp] no ACK after {} retransmissions, giving up",
                self.timer.xmit_count()
            );
            self.closed = true;
            return;
        }
        // Only the oldest segment goes out again; everything behind it rides
        // on the cumulative ACK.
        let (seqno, frame) = match self.sender.oldest() {
            Some(segment) => (segment.header.seqno, segment.encode()),
            None => return,
        };
        log::debug!(
            "[ctcp] timeout — retransmitting seqno={seqno} attempt={}",
            self.timer.xmit_count() + 1
        );
        if self.send_frame(&frame) {
            self.timer.record_retransmit(now);
        }
    }

    // -----------------------------------------------------------------------
    // Helpers
    // -----------------------------------------------------------------------

    /// Build a segment stamped with the current counters and window.
    fn build_segment(&self, flag_bits: u32, payload: Vec<u8>) -> Segment {
        Segment {
            header: Header {
                seqno: self.sender.next_seqno(),
                ackno: self.receiver.recv_base(),
                flags: flag_bits,
                window: self.receiver.advertised_window(),
            },
            payload,
        }
    }

    /// Transmit a fresh segment and enqueue it for retransmission.
    fn transmit_new(&mut self, segment: Segment) {
        let was_idle = !self.sender.has_unacked();
        if !self.send_frame(&segment.encode()) {
            return;
        }
        self.sender.record_sent(segment);
        if was_idle {
            let now = self.conn.now_ms();
            self.timer.restart(now);
        }
    }

    /// Emit a pure acknowledgement; never queued for retransmission.
    fn send_ack(&mut self) {
        let ack = self.build_segment(flags::ACK, Vec::new());
        log::trace!("[ctcp] → ACK ackno={}", ack.header.ackno);
        self.send_frame(&ack.encode());
    }

    /// Hand one frame to the transport; a send error destroys the
    /// connection.  Returns `false` when the connection closed.
    fn send_frame(&mut self, frame: &[u8]) -> bool {
        match self.conn.send(frame) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("[ctcp] transport send failed: {err}");
                self.closed = true;
                false
            }
        }
    }

    /// Drain the contiguous reassembly prefix into the sink, as far as its
    /// capacity allows.
    fn flush_to_sink(&mut self) {
        // Nothing is delivered past the peer's FIN.
        if self.recv_fin {
            return;
        }
        loop {
            let (payload_len, is_fin) = match self.receiver.peek() {
                Some(head) => (head.payload.len(), head.is_fin()),
                None => break,
            };
            if payload_len > 0 && self.conn.bufspace() < payload_len {
                break;
            }
            let Some(segment) = self.receiver.pop() else {
                break;
            };
            if !segment.payload.is_empty() && !self.sink_write(&segment.payload) {
                return;
            }
            if is_fin {
                // End-of-stream is an empty write.
                if !self.sink_write(&[]) {
                    return;
                }
                self.recv_fin = true;
                self.eof_delivered = true;
                log::debug!(
                    "[ctcp] ← FIN delivered, recv_base={}",
                    self.receiver.recv_base()
                );
                break;
            }
        }
    }

    /// Push bytes (or end-of-stream) to the sink; a sink error destroys the
    /// connection.  Returns `false` when the connection closed.
    fn sink_write(&mut self, data: &[u8]) -> bool {
        match self.conn.output(data) {
            Ok(_) => true,
            Err(err) => {
                log::warn!("[ctcp] application sink failed: {err}");
                self.closed = true;
                false
            }
        }
    }

    /// Destroy the connection once the close handshake has completed in both
    /// directions.
    fn maybe_finish(&mut self) {
        if self.closed {
            return;
        }
        if self.state() == State::FinAcked && self.recv_fin && self.eof_delivered {
            log::debug!("[ctcp] close handshake complete");
            self.closed = true;
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
