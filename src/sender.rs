//! Send-side sliding window.
//!
//! [`SendWindow`] owns the sequence-number counters and the ordered queue of
//! in-flight segments awaiting acknowledgement.
//!
//! # Protocol contract
//!
//! - The window budget is measured in **bytes**: no transmitted byte's
//!   sequence number may exceed `send_base + window_bytes`.
//! - ACKs are cumulative: `ackno = K` acknowledges every sequence number
//!   below `K`.
//! - A bare FIN consumes one sequence number even though it carries no
//!   payload.
//! - Sequence numbers are u32 and wrap around; wrap-around comparisons use
//!   the convention that two values are "close" when their difference is
//!   less than `u32::MAX / 2`.
//!
//! This module only manages state; transmitting frames is the caller's
//! responsibility.

use std::collections::VecDeque;

use crate::segment::{seq_le, seq_lt, Segment};

/// First sequence number of a fresh connection, both directions.
pub const INITIAL_SEQNO: u32 = 1;

/// Send-side state for one connection.
///
/// ```text
///  send_base          next_seqno
///      │                  │
///  ────┼──────────────────┼──────────────────▶ seq space
///      │ <── in flight ──▶│ <── budget ─────▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Smallest sequence number sent but not yet acknowledged.
    send_base: u32,
    /// Sequence number for the next outbound byte (or FIN slot).
    next_seqno: u32,
    /// Window size in bytes.
    window_bytes: u32,
    /// In-flight segments ordered by sequence number (front = oldest).
    unacked: VecDeque<Segment>,
}

impl SendWindow {
    pub fn new(window_bytes: u32) -> Self {
        Self {
            send_base: INITIAL_SEQNO,
            next_seqno: INITIAL_SEQNO,
            window_bytes,
            unacked: VecDeque::new(),
        }
    }

    /// Smallest unacknowledged sequence number.
    pub fn send_base(&self) -> u32 {
        self.send_base
    }

    /// Sequence number the next outbound segment will carry.
    pub fn next_seqno(&self) -> u32 {
        self.next_seqno
    }

    /// Bytes of window budget left before the sender must pause.
    pub fn budget(&self) -> u32 {
        self.window_bytes
            .saturating_sub(self.next_seqno.wrapping_sub(self.send_base))
    }

    /// `true` when at least one segment is awaiting acknowledgement.
    pub fn has_unacked(&self) -> bool {
        !self.unacked.is_empty()
    }

    /// Number of segments currently awaiting acknowledgement.
    pub fn in_flight(&self) -> usize {
        self.unacked.len()
    }

    /// The oldest unacknowledged segment — the one the retransmission timer
    /// watches.
    pub fn oldest(&self) -> Option<&Segment> {
        self.unacked.front()
    }

    /// In-flight segments from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &Segment> {
        self.unacked.iter()
    }

    /// Enqueue a just-transmitted segment and advance `next_seqno` past it.
    pub fn record_sent(&mut self, segment: Segment) {
        debug_assert_eq!(segment.header.seqno, self.next_seqno);
        self.next_seqno = self.next_seqno.wrapping_add(segment.seq_len());
        self.unacked.push_back(segment);
    }

    /// Process a cumulative acknowledgement.
    ///
    /// Advances `send_base`, retires every segment whose sequence span ends
    /// at or before `ackno`, and returns `true` when the window moved.
    /// Duplicate ACKs and ACKs outside `(send_base, next_seqno]` are ignored.
    pub fn on_ack(&mut self, ackno: u32) -> bool {
        if !seq_lt(self.send_base, ackno) || !seq_le(ackno, self.next_seqno) {
            return false;
        }
        self.send_base = ackno;
        while let Some(front) = self.unacked.front() {
            let end = front.header.seqno.wrapping_add(front.seq_len());
            if seq_le(end, ackno) {
                self.unacked.pop_front();
            } else {
                break;
            }
        }
        true
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::{flags, Header};

    /// Helper: build a data segment at `seqno`.
    fn data(seqno: u32, len: usize) -> Segment {
        Segment {
            header: Header {
                seqno,
                ackno: 1,
                flags: flags::ACK,
                window: 1440,
            },
            payload: vec![0u8; len],
        }
    }

    fn fin(seqno: u32) -> Segment {
        Segment {
            header: Header {
                seqno,
                ackno: 1,
                flags: flags::FIN | flags::ACK,
                window: 1440,
            },
            payload: Vec::new(),
        }
    }

    #[test]
    fn initial_state() {
        let w = SendWindow::new(1440);
        assert_eq!(w.send_base(), 1);
        assert_eq!(w.next_seqno(), 1);
        assert_eq!(w.budget(), 1440);
        assert!(!w.has_unacked());
    }

    #[test]
    fn record_sent_advances_next_seqno_and_shrinks_budget() {
        let mut w = SendWindow::new(1440);
        w.record_sent(data(1, 100));
        assert_eq!(w.next_seqno(), 101);
        assert_eq!(w.send_base(), 1);
        assert_eq!(w.budget(), 1340);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn fin_consumes_one_sequence_slot() {
        let mut w = SendWindow::new(1440);
        w.record_sent(data(1, 5));
        w.record_sent(fin(6));
        assert_eq!(w.next_seqno(), 7);
        assert!(w.on_ack(7));
        assert!(!w.has_unacked());
    }

    #[test]
    fn cumulative_ack_retires_multiple_segments() {
        let mut w = SendWindow::new(4 * 1440);
        for i in 0..3u32 {
            w.record_sent(data(1 + i * 5, 5));
        }
        assert_eq!(w.next_seqno(), 16);
        assert!(w.on_ack(16));
        assert_eq!(w.send_base(), 16);
        assert!(!w.has_unacked());
        assert_eq!(w.budget(), 4 * 1440);
    }

    #[test]
    fn partial_ack_keeps_uncovered_segments() {
        let mut w = SendWindow::new(4 * 1440);
        for i in 0..3u32 {
            w.record_sent(data(1 + i * 5, 5));
        }
        assert!(w.on_ack(11));
        assert_eq!(w.send_base(), 11);
        assert_eq!(w.in_flight(), 1);
        assert_eq!(w.oldest().map(|s| s.header.seqno), Some(11));
    }

    #[test]
    fn duplicate_ack_is_ignored() {
        let mut w = SendWindow::new(1440);
        w.record_sent(data(1, 5));
        assert!(w.on_ack(6));
        assert!(!w.on_ack(6));
        assert_eq!(w.send_base(), 6);
    }

    #[test]
    fn ack_beyond_next_seqno_is_ignored() {
        let mut w = SendWindow::new(1440);
        w.record_sent(data(1, 5));
        assert!(!w.on_ack(1000));
        assert_eq!(w.send_base(), 1);
        assert_eq!(w.in_flight(), 1);
    }

    #[test]
    fn every_unacked_segment_sits_inside_the_window() {
        let mut w = SendWindow::new(4 * 1440);
        for i in 0..4u32 {
            w.record_sent(data(1 + i * 10, 10));
        }
        w.on_ack(21);
        for seg in w.iter() {
            assert!(seq_le(w.send_base(), seg.header.seqno));
            assert!(seq_lt(seg.header.seqno, w.next_seqno()));
        }
    }

    #[test]
    fn sequence_numbers_wrap() {
        let mut w = SendWindow::new(1440);
        // Force the counters close to the wrap point.
        w.send_base = u32::MAX - 5;
        w.next_seqno = u32::MAX - 5;
        w.record_sent(data(u32::MAX - 5, 10));
        let ackno = (u32::MAX - 5).wrapping_add(10);
        assert!(w.on_ack(ackno));
        assert_eq!(w.send_base(), ackno);
        assert!(!w.has_unacked());
    }
}
