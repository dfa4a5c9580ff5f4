//! Packet framing for RTP carried over a TCP stream (RFC 4571).
//!
//! TCP delivers bytes, not packets: one read may end inside a packet or
//! carry the tail of one packet and the head of the next.  Each packet is
//! therefore sent behind a two-byte length so the receiver can find the
//! boundaries again.
//!
//! ```text
//! [length:2][packet:length][length:2][packet:length]...
//! ```
//!
//! The length is big-endian and counts only the packet bytes.

use std::ops::Range;

use thiserror::Error;

/// Size of the length field in front of every packet.
pub const FRAME_PREFIX_LEN: usize = 2;

/// Largest packet a single frame can carry.
pub const MAX_FRAMED_PACKET: usize = u16::MAX as usize;

/// Errors produced while framing or unframing packets.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// The buffer does not yet hold a whole frame.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    #[error("packet of {0} bytes does not fit a 16-bit length")]
    PacketTooLong(usize),
}

/// Appends the length prefix for a packet of `packet_len` bytes to `out`.
///
/// # Errors
///
/// [`FramingError::PacketTooLong`] above [`MAX_FRAMED_PACKET`]; nothing is
/// appended.
pub fn write_frame_prefix(packet_len: usize, out: &mut Vec<u8>) -> Result<(), FramingError> {
    let len = u16::try_from(packet_len).map_err(|_| FramingError::PacketTooLong(packet_len))?;
    out.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Finds the first whole frame at the start of `bytes`.
///
/// Returns the range of the packet inside `bytes` and the number of bytes
/// the frame occupies, prefix included.
///
/// # Errors
///
/// [`FramingError::InsufficientData`] when `bytes` ends inside the prefix or
/// the packet.  Nothing is consumed; call again once more bytes arrived.
///
/// # Examples
///
/// ```rust
/// use aoip_core::protocol::framing::{decode_frame, write_frame_prefix};
///
/// let mut wire = Vec::new();
/// write_frame_prefix(3, &mut wire).unwrap();
/// wire.extend_from_slice(&[7, 8, 9]);
///
/// let (packet, consumed) = decode_frame(&wire).unwrap();
/// assert_eq!(&wire[packet], &[7, 8, 9]);
/// assert_eq!(consumed, 5);
/// ```
pub fn decode_frame(bytes: &[u8]) -> Result<(Range<usize>, usize), FramingError> {
    if bytes.len() < FRAME_PREFIX_LEN {
        return Err(FramingError::InsufficientData {
            needed: FRAME_PREFIX_LEN,
            available: bytes.len(),
        });
    }
    let len = u16::from_be_bytes([bytes[0], bytes[1]]) as usize;
    let total = FRAME_PREFIX_LEN + len;
    if bytes.len() < total {
        return Err(FramingError::InsufficientData {
            needed: total,
            available: bytes.len(),
        });
    }
    Ok((FRAME_PREFIX_LEN..total, total))
}

// ── Tests ─────────────────────────────────────────────────────────────────────
