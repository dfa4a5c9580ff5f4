//! RTP fixed header codec (RFC 3550 §5.1) with optional header extension.
//!
//! Used by the AES67 adapter (plain 12-byte header) and the Livewire+ adapter
//! (header plus a one-word extension under profile [`LIVEWIRE_EXT_PROFILE`]).
//!
//! ```text
//!  0                   1                   2                   3
//!  0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1 2 3 4 5 6 7 8 9 0 1
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |V=2|P|X|  CC   |M|     PT      |       sequence number         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                           timestamp                           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                             SSRC                              |
//! +=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+=+
//! |      profile (if X=1)         |        length (words)         |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                     extension words ...                       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! All multi-byte fields are big-endian.

use std::ops::Range;

use thiserror::Error;

/// Length of the fixed RTP header without CSRCs or extension.
pub const RTP_HEADER_LEN: usize = 12;

/// RTP version carried in the top two bits of the first byte.
pub const RTP_VERSION: u8 = 2;

/// Header-extension profile identifier used by Livewire+ streams.
pub const LIVEWIRE_EXT_PROFILE: u16 = 0xFA1A;

/// Errors produced while parsing an RTP header.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RtpError {
    #[error("packet too short: need {needed} bytes, got {actual}")]
    TooShort { needed: usize, actual: usize },
    #[error("unsupported RTP version {0}")]
    BadVersion(u8),
    #[error("padding length {padding} exceeds payload length {payload}")]
    BadPadding { padding: usize, payload: usize },
    #[error("extension has {0} words; at most 65535 can be encoded")]
    ExtensionTooLong(usize),
}

/// RTP header extension (the `X` bit block).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpExtension {
    pub profile: u16,
    pub data: Vec<u32>,
}

/// Decoded RTP header.  CSRC identifiers are skipped on parse and never
/// emitted on encode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RtpHeader {
    pub marker: bool,
    /// 7-bit payload type; the top bit is masked off on encode.
    pub payload_type: u8,
    pub sequence: u16,
    pub timestamp: u32,
    pub ssrc: u32,
    pub extension: Option<RtpExtension>,
}

impl RtpHeader {
    /// Number of bytes [`RtpHeader::write_to`] will append.
    pub fn encoded_len(&self) -> usize {
        RTP_HEADER_LEN
            + self
                .extension
                .as_ref()
                .map_or(0, |ext| 4 + ext.data.len() * 4)
    }

    /// Appends the encoded header to `out`.
    ///
    /// # Errors
    ///
    /// Returns [`RtpError::ExtensionTooLong`] if the extension does not fit
    /// the 16-bit length field.
    pub fn write_to(&self, out: &mut Vec<u8>) -> Result<(), RtpError> {
        let mut first = RTP_VERSION << 6;
        if self.extension.is_some() {
            first |= 0x10;
        }
        let mut second = self.payload_type & 0x7F;
        if self.marker {
            second |= 0x80;
        }

        out.reserve(self.encoded_len());
        out.push(first);
        out.push(second);
        out.extend_from_slice(&self.sequence.to_be_bytes());
        out.extend_from_slice(&self.timestamp.to_be_bytes());
        out.extend_from_slice(&self.ssrc.to_be_bytes());

        if let Some(ext) = &self.extension {
            let words = u16::try_from(ext.data.len())
                .map_err(|_| RtpError::ExtensionTooLong(ext.data.len()))?;
            out.extend_from_slice(&ext.profile.to_be_bytes());
            out.extend_from_slice(&words.to_be_bytes());
            for word in &ext.data {
                out.extend_from_slice(&word.to_be_bytes());
            }
        }
        Ok(())
    }

    /// Encodes the header into a fresh buffer.
    ///
    /// # Errors
    ///
    /// See [`RtpHeader::write_to`].
    pub fn encode(&self) -> Result<Vec<u8>, RtpError> {
        let mut out = Vec::with_capacity(self.encoded_len());
        self.write_to(&mut out)?;
        Ok(out)
    }

    /// Parses the header at the start of `data`.
    ///
    /// Returns the header and the number of bytes it occupies (fixed header,
    /// CSRC list and extension).  A header with no payload after it is valid.
    ///
    /// # Errors
    ///
    /// [`RtpError::TooShort`] when `data` ends inside the header,
    /// [`RtpError::BadVersion`] when the version is not 2.
    pub fn parse(data: &[u8]) -> Result<(Self, usize), RtpError> {
        let layout = Layout::of(data)?;
        let extension = layout.extension.map(|(profile, words)| RtpExtension {
            profile,
            data: data[words]
                .chunks_exact(4)
                .map(|w| u32::from_be_bytes([w[0], w[1], w[2], w[3]]))
                .collect(),
        });

        let second = data[1];
        let header = Self {
            marker: second & 0x80 != 0,
            payload_type: second & 0x7F,
            sequence: u16::from_be_bytes([data[2], data[3]]),
            timestamp: u32::from_be_bytes([data[4], data[5], data[6], data[7]]),
            ssrc: u32::from_be_bytes([data[8], data[9], data[10], data[11]]),
            extension,
        };
        Ok((header, layout.header_len))
    }

    /// Parses a full packet and returns the header with the payload range,
    /// excluding any trailing padding.
    ///
    /// # Errors
    ///
    /// Everything [`RtpHeader::parse`] reports, plus
    /// [`RtpError::BadPadding`] for an impossible padding count.
    pub fn split_packet(data: &[u8]) -> Result<(Self, Range<usize>), RtpError> {
        let (header, start) = Self::parse(data)?;
        Ok((header, start..payload_end(data, start)?))
    }
}

/// Payload position and extension profile of a packet, found without
/// decoding the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PayloadLocation {
    pub extension_profile: Option<u16>,
    pub payload: Range<usize>,
}

/// Validates the header of a full packet and locates its payload.
///
/// Same checks as [`RtpHeader::split_packet`], without allocating.
///
/// # Errors
///
/// As for [`RtpHeader::split_packet`].
pub fn locate_payload(data: &[u8]) -> Result<PayloadLocation, RtpError> {
    let layout = Layout::of(data)?;
    let end = payload_end(data, layout.header_len)?;
    Ok(PayloadLocation {
        extension_profile: layout.extension.map(|(profile, _)| profile),
        payload: layout.header_len..end,
    })
}

/// Byte layout of a header: its total length and, when present, the
/// extension profile with the range of its words.
struct Layout {
    header_len: usize,
    extension: Option<(u16, Range<usize>)>,
}

impl Layout {
    fn of(data: &[u8]) -> Result<Self, RtpError> {
        ensure_len(data, RTP_HEADER_LEN)?;

        let first = data[0];
        let version = first >> 6;
        if version != RTP_VERSION {
            return Err(RtpError::BadVersion(version));
        }

        let csrc_count = (first & 0x0F) as usize;
        let mut offset = RTP_HEADER_LEN + csrc_count * 4;
        ensure_len(data, offset)?;

        let extension = if first & 0x10 != 0 {
            ensure_len(data, offset + 4)?;
            let profile = u16::from_be_bytes([data[offset], data[offset + 1]]);
            let words = u16::from_be_bytes([data[offset + 2], data[offset + 3]]) as usize;
            offset += 4;
            ensure_len(data, offset + words * 4)?;
            let range = offset..offset + words * 4;
            offset = range.end;
            Some((profile, range))
        } else {
            None
        };

        Ok(Self {
            header_len: offset,
            extension,
        })
    }
}

/// End of the payload once trailing padding is removed.
fn payload_end(data: &[u8], start: usize) -> Result<usize, RtpError> {
    let end = data.len();
    if data[0] & 0x20 == 0 {
        return Ok(end);
    }
    let payload = end - start;
    let padding = data.last().copied().unwrap_or(0) as usize;
    if padding == 0 || padding > payload {
        return Err(RtpError::BadPadding { padding, payload });
    }
    Ok(end - padding)
}

fn ensure_len(data: &[u8], needed: usize) -> Result<(), RtpError> {
    if data.len() < needed {
        Err(RtpError::TooShort {
            needed,
            actual: data.len(),
        })
    } else {
        Ok(())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
