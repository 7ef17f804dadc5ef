//! Wire format for protocol segments.
//!
//! Every datagram exchanged between peers carries exactly one [`Segment`]:
//! an 18-byte header followed by zero or more payload bytes.  This module is
//! responsible for:
//! - Defining the on-wire binary layout (field offsets, network byte order).
//! - Serialising a [`Segment`] into a buffer ready for transmission.
//! - Deserialising and validating a raw datagram, returning [`SegmentError`]
//!   for truncated, inconsistent, or corrupted input.
//! - The Internet checksum protecting whole frames.
//!
//! No I/O happens here — this is pure data transformation.

use thiserror::Error;

/// Most payload bytes a single segment may carry.
pub const MAX_SEG_DATA_SIZE: usize = 1440;

/// Size of the fixed header in bytes.
pub const HEADER_LEN: usize = 18;

// Byte offsets of the header fields.  All fields are big-endian on the wire.
const SEQNO_OFF: usize = 0;
const ACKNO_OFF: usize = 4;
const LEN_OFF: usize = 8;
const FLAGS_OFF: usize = 10;
const WINDOW_OFF: usize = 14;
const CKSUM_OFF: usize = 16;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Acknowledgement field is valid.
    pub const ACK: u32 = 0x10;
    /// Finish — sender has no more data; consumes one sequence number.
    pub const FIN: u32 = 0x01;
}

// ---------------------------------------------------------------------------
// Sequence-number arithmetic
// ---------------------------------------------------------------------------

/// Returns `true` when sequence number `a` is ≤ `b` in wrap-around space.
///
/// The comparison works correctly as long as the two values are less than
/// `u32::MAX / 2` apart, which is always the case for a realistic window.
#[inline]
pub(crate) fn seq_le(a: u32, b: u32) -> bool {
    b.wrapping_sub(a) <= u32::MAX / 2
}

/// Returns `true` when sequence number `a` is strictly before `b`.
#[inline]
pub(crate) fn seq_lt(a: u32, b: u32) -> bool {
    a != b && seq_le(a, b)
}

// ---------------------------------------------------------------------------
// Header / Segment
// ---------------------------------------------------------------------------

/// Fixed-size segment header.
///
/// The `len` and `cksum` fields are derived at encode time and validated at
/// decode time; they are not stored here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Sequence number of the first payload byte, or of the FIN slot.
    pub seqno: u32,
    /// Next sequence number expected from the peer; valid with [`flags::ACK`].
    pub ackno: u32,
    /// Bitmask of [`flags`] constants.
    pub flags: u32,
    /// Advertised receive-window size in bytes.
    pub window: u16,
}

/// A complete protocol segment: header plus payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Segment {
    /// Total on-wire size of this segment in bytes.
    pub fn wire_len(&self) -> usize {
        HEADER_LEN + self.payload.len()
    }

    /// Span this segment occupies in sequence-number space.
    ///
    /// Payload bytes count one each; a bare FIN consumes a single slot.
    pub fn seq_len(&self) -> u32 {
        let data = self.payload.len() as u32;
        if self.is_fin() {
            data.max(1)
        } else {
            data
        }
    }

    /// `true` when the acknowledgement field is valid.
    pub fn is_ack(&self) -> bool {
        self.header.flags & flags::ACK != 0
    }

    /// `true` when the segment closes the peer's send direction.
    pub fn is_fin(&self) -> bool {
        self.header.flags & flags::FIN != 0
    }

    /// Serialise this segment into a newly allocated byte vector.
    ///
    /// The `len` field is filled from the actual sizes and the checksum is
    /// computed over the whole frame with the `cksum` field zeroed.
    pub fn encode(&self) -> Vec<u8> {
        let mut buf = vec![0u8; self.wire_len()];
        buf[SEQNO_OFF..SEQNO_OFF + 4].copy_from_slice(&self.header.seqno.to_be_bytes());
        buf[ACKNO_OFF..ACKNO_OFF + 4].copy_from_slice(&self.header.ackno.to_be_bytes());
        buf[LEN_OFF..LEN_OFF + 2].copy_from_slice(&(self.wire_len() as u16).to_be_bytes());
        buf[FLAGS_OFF..FLAGS_OFF + 4].copy_from_slice(&self.header.flags.to_be_bytes());
        buf[WINDOW_OFF..WINDOW_OFF + 2].copy_from_slice(&self.header.window.to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(&self.payload);

        let sum = checksum(&buf);
        buf[CKSUM_OFF..CKSUM_OFF + 2].copy_from_slice(&sum.to_be_bytes());
        buf
    }

    /// Parse a [`Segment`] from a raw datagram.
    ///
    /// Bytes beyond the header's `len` field are ignored (datagram padding).
    pub fn decode(buf: &[u8]) -> Result<Self, SegmentError> {
        if buf.len() < HEADER_LEN {
            return Err(SegmentError::Truncated { have: buf.len() });
        }

        let len = u16::from_be_bytes([buf[LEN_OFF], buf[LEN_OFF + 1]]) as usize;
        if len < HEADER_LEN || len > buf.len() {
            return Err(SegmentError::BadLength {
                len,
                have: buf.len(),
            });
        }

        // A frame that carried a correct checksum sums to zero as received.
        if checksum(&buf[..len]) != 0 {
            return Err(SegmentError::BadChecksum);
        }

        let be32 = |off: usize| u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]]);
        Ok(Segment {
            header: Header {
                seqno: be32(SEQNO_OFF),
                ackno: be32(ACKNO_OFF),
                flags: be32(FLAGS_OFF),
                window: u16::from_be_bytes([buf[WINDOW_OFF], buf[WINDOW_OFF + 1]]),
            },
            payload: buf[HEADER_LEN..len].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Checksum
// ---------------------------------------------------------------------------

/// Internet one's-complement checksum over `frame`.
///
/// 16-bit big-endian words are summed, carries folded back in, and the sum
/// complemented.  An odd trailing byte is zero-padded.  Verification
/// recomputes over the frame as received (stored checksum included) and
/// expects zero.
pub fn checksum(frame: &[u8]) -> u16 {
    let mut sum = 0u32;

    let mut words = frame.chunks_exact(2);
    for word in &mut words {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    if let [last] = words.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }
    !(sum as u16)
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Ways a raw datagram can fail to parse as a segment.
///
/// Every variant is handled the same way by the engine: the datagram is
/// dropped silently and never acknowledged.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SegmentError {
    /// Datagram shorter than the fixed header.
    #[error("datagram too short for a segment header ({have} bytes)")]
    Truncated { have: usize },
    /// `len` field smaller than the header or larger than the datagram.
    #[error("length field {len} inconsistent with datagram of {have} bytes")]
    BadLength { len: usize, have: usize },
    /// Frame did not sum to zero.
    #[error("checksum verification failed")]
    BadChecksum,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(seqno: u32, ackno: u32, flag_bits: u32, payload: &[u8]) -> Segment {
        Segment {
            header: Header {
                seqno,
                ackno,
                flags: flag_bits,
                window: 2880,
            },
            payload: payload.to_vec(),
        }
    }

    #[test]
    fn encode_decode_roundtrip() {
        let seg = sample(1, 7, flags::ACK, b"hello");
        let decoded = Segment::decode(&seg.encode()).expect("decode");
        assert_eq!(decoded, seg);
    }

    #[test]
    fn bare_fin_roundtrip() {
        let seg = sample(6, 1, flags::FIN | flags::ACK, b"");
        let bytes = seg.encode();
        assert_eq!(bytes.len(), HEADER_LEN);
        let decoded = Segment::decode(&bytes).expect("decode");
        assert!(decoded.is_fin());
        assert_eq!(decoded.seq_len(), 1);
    }

    #[test]
    fn seq_len_counts_payload_bytes() {
        assert_eq!(sample(1, 0, flags::ACK, b"abc").seq_len(), 3);
        assert_eq!(sample(1, 0, flags::ACK, b"").seq_len(), 0);
    }

    #[test]
    fn wire_layout_is_fixed() {
        // Field offsets and flag encodings are a peer-visible contract.
        let bytes = sample(0x01020304, 0x0a0b0c0d, flags::ACK | flags::FIN, b"x").encode();
        assert_eq!(&bytes[0..4], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[4..8], &[0x0a, 0x0b, 0x0c, 0x0d]);
        assert_eq!(&bytes[8..10], &[0x00, 0x13]); // len = 18 + 1
        assert_eq!(&bytes[10..14], &[0x00, 0x00, 0x00, 0x11]); // ACK | FIN
        assert_eq!(&bytes[14..16], &[0x0b, 0x40]); // window = 2880
    }

    #[test]
    fn encoded_frame_sums_to_zero() {
        let bytes = sample(1, 1, flags::ACK, b"payload").encode();
        assert_eq!(checksum(&bytes), 0);
    }

    #[test]
    fn decode_empty_buffer_is_truncated() {
        assert_eq!(
            Segment::decode(&[]),
            Err(SegmentError::Truncated { have: 0 })
        );
    }

    #[test]
    fn decode_len_beyond_buffer_is_rejected() {
        let mut bytes = sample(1, 0, flags::ACK, b"abcd").encode();
        bytes.truncate(HEADER_LEN + 2); // claims 4 payload bytes, carries 2
        assert!(matches!(
            Segment::decode(&bytes),
            Err(SegmentError::BadLength { .. })
        ));
    }

    #[test]
    fn decode_len_below_header_is_rejected() {
        let mut bytes = sample(1, 0, flags::ACK, b"").encode();
        bytes[LEN_OFF] = 0;
        bytes[LEN_OFF + 1] = 4;
        assert!(matches!(
            Segment::decode(&bytes),
            Err(SegmentError::BadLength { .. })
        ));
    }

    #[test]
    fn trailing_padding_is_ignored() {
        let seg = sample(9, 2, flags::ACK, b"data");
        let mut bytes = seg.encode();
        bytes.extend_from_slice(&[0xde, 0xad]);
        assert_eq!(Segment::decode(&bytes).expect("decode"), seg);
    }

    #[test]
    fn any_single_bit_flip_is_detected() {
        let bytes = sample(3, 9, flags::ACK, b"hello, world").encode();
        for bit in 0..bytes.len() * 8 {
            let mut corrupt = bytes.clone();
            corrupt[bit / 8] ^= 1 << (bit % 8);
            assert!(
                Segment::decode(&corrupt).is_err(),
                "flip of bit {bit} went undetected"
            );
        }
    }

    #[test]
    fn seq_comparisons_wrap() {
        assert!(seq_le(1, 1));
        assert!(seq_lt(1, 100));
        assert!(!seq_lt(100, 1));
        // Across the wrap point.
        assert!(seq_lt(u32::MAX - 5, 3));
        assert!(!seq_le(3, u32::MAX - 5));
    }
}
