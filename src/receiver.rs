//! Receive-side reassembly.
//!
//! Segments may arrive out of order, duplicated, or stale.  [`Reassembler`]
//! admits each inbound data or FIN segment at most once, keeps admitted
//! segments sorted by sequence number, and releases the contiguous prefix
//! starting at `recv_base` for in-order delivery.
//!
//! This module only manages state; pushing bytes to the application sink is
//! the caller's responsibility.

use std::collections::BTreeMap;

use crate::segment::{seq_le, seq_lt, Segment};
use crate::sender::INITIAL_SEQNO;

/// Receive-side state for one connection.
#[derive(Debug)]
pub struct Reassembler {
    /// Next in-order sequence number expected from the peer.
    recv_base: u32,
    /// Receive window in bytes; bounds how far ahead segments are admitted.
    window_bytes: u32,
    /// Out-of-order store keyed by seqno; at most one entry per seqno.
    pending: BTreeMap<u32, Segment>,
    /// Payload bytes currently parked in `pending`.
    buffered: u32,
}

impl Reassembler {
    pub fn new(window_bytes: u32) -> Self {
        Self {
            recv_base: INITIAL_SEQNO,
            window_bytes,
            pending: BTreeMap::new(),
            buffered: 0,
        }
    }

    /// Next in-order sequence number expected from the peer — also the
    /// cumulative ACK value to advertise.
    pub fn recv_base(&self) -> u32 {
        self.recv_base
    }

    /// Window to advertise to the peer: the configured size minus bytes
    /// parked here awaiting delivery.
    pub fn advertised_window(&self) -> u16 {
        self.window_bytes
            .saturating_sub(self.buffered)
            .min(u32::from(u16::MAX)) as u16
    }

    /// Admit an inbound segment.
    ///
    /// Returns `false` when the segment is discarded: its sequence span ends
    /// at or before `recv_base` (already delivered), a segment with the same
    /// seqno is already buffered, or it starts at or beyond the receive
    /// window's edge.
    pub fn insert(&mut self, segment: Segment) -> bool {
        let seqno = segment.header.seqno;
        let end = seqno.wrapping_add(segment.seq_len());
        if seq_le(end, self.recv_base) {
            return false;
        }
        if !seq_lt(seqno, self.recv_base.wrapping_add(self.window_bytes)) {
            return false;
        }
        if self.pending.contains_key(&seqno) {
            return false;
        }
        self.buffered += segment.payload.len() as u32;
        self.pending.insert(seqno, segment);
        true
    }

    /// The segment sitting at exactly `recv_base`, if it has arrived.
    pub fn peek(&self) -> Option<&Segment> {
        self.pending.get(&self.recv_base)
    }

    /// Remove the head segment and advance `recv_base` past its span.
    pub fn pop(&mut self) -> Option<Segment> {
        let segment = self.pending.remove(&self.recv_base)?;
        self.buffered -= segment.payload.len() as u32;
        self.recv_base = self.recv_base.wrapping_add(segment.seq_len());
        Some(segment)
    }

    /// Number of segments parked out of order.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
