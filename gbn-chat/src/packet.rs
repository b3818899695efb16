//! Wire-format definitions for protocol frames.
//!
//! Every datagram exchanged between peers is a [`Packet`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout (header fields, flags, payload).
//! - Serialising a [`Packet`] into a byte buffer ready for transmission.
//! - Deserialising a raw byte slice back into a [`Packet`], returning a
//!   [`FramingError`] for truncated or inconsistent input.
//!
//! A checksum mismatch is **not** a decode error.  The decoded packet keeps
//! the checksum it arrived with and [`Packet::checksum_ok`] recomputes it on
//! demand, so the receiver can answer a corrupted frame with a duplicate ACK.
//!
//! No I/O happens here; this is pure data transformation.
//!
//! # Wire format
//!
//! All multi-byte integers are **big-endian**.
//!
//! ```text
//!  0               1               2               3
//!  0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7 0 1 2 3 4 5 6 7
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |    Version    |     Flags     |   Sequence Number (hi 16)     |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |   Sequence Number (lo 16)     |      Ack Number (hi 16)       |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |      Ack Number (lo 16)       |          Window Size          |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |         Payload Length        |            Checksum           |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 16 bytes, every one of them a field,
//! so the checksum covers the whole header.
//! version(1) + flags(1) + seq(4) + ack(4) + window(2) + payload_len(2) + checksum(2)

use thiserror::Error;

/// Bit-flag constants for the `flags` header field.
pub mod flags {
    /// Frame carries application data.
    pub const DATA: u8 = 0b0000_0001;
    /// Acknowledgement field is valid.
    pub const ACK: u8 = 0b0000_0010;
    /// Test control: receiver should drop this data frame.
    pub const TEST_DROP_PACKET: u8 = 0b0000_0100;
    /// Test control: sender should ignore acks for this frame.
    pub const TEST_DROP_ACK: u8 = 0b0000_1000;
    /// Test control: encoder corrupts the payload after checksumming.
    pub const TEST_CORRUPT: u8 = 0b0001_0000;
}

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 16;

/// Protocol version written by default.
pub const PROTOCOL_VERSION: u8 = 1;

/// Largest datagram either side reads from the socket.
pub const MAX_DATAGRAM: usize = 2048;

/// Largest payload that still fits in [`MAX_DATAGRAM`].
pub const MAX_PAYLOAD: usize = MAX_DATAGRAM - HEADER_LEN;

// Byte offsets of each field within the serialised header.
const OFF_VERSION: usize = 0;
const OFF_FLAGS: usize = 1;
const OFF_SEQ: usize = 2;
const OFF_ACK: usize = 6;
const OFF_WINDOW: usize = 10;
const OFF_PAYLOAD_LEN: usize = 12;
const OFF_CHECKSUM: usize = 14;

/// Fixed-size protocol header.
///
/// Fields are in host byte order; [`Packet::encode`] converts to big-endian
/// on the wire and [`Packet::decode`] converts back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Header {
    /// Protocol version byte.
    pub version: u8,
    /// Bitmask of [`flags`] constants.
    pub flags: u8,
    /// Sequence number of this frame (one number per frame, not per byte).
    pub seq: u32,
    /// Cumulative acknowledgement: every frame up to and including `ack`
    /// has been received in order.
    pub ack: u32,
    /// Advertised receive capacity in frames.
    pub window: u16,
    /// Length of the payload in bytes.
    ///
    /// On encode this is computed from the actual payload length.
    /// On decode this is validated against the remaining buffer bytes.
    pub payload_len: u16,
    /// Internet checksum (RFC 1071) over header and payload.
    ///
    /// On encode this is computed and written last.
    /// On decode this holds the value found on the wire.
    pub checksum: u16,
}

/// A complete protocol datagram: header + payload bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,
    pub payload: Vec<u8>,
}

impl Packet {
    /// Build a packet; `payload_len` and `checksum` are left for [`encode`]
    /// to fill in.
    ///
    /// [`encode`]: Packet::encode
    pub fn new(version: u8, flags: u8, seq: u32, ack: u32, window: u16, payload: Vec<u8>) -> Self {
        Self {
            header: Header {
                version,
                flags,
                seq,
                ack,
                window,
                payload_len: 0,
                checksum: 0,
            },
            payload,
        }
    }

    /// A pure cumulative ACK advertising `window` free slots.
    pub fn ack(version: u8, ack: u32, window: u16) -> Self {
        Self::new(version, flags::ACK, 0, ack, window, Vec::new())
    }

    /// `true` when every bit of `mask` is set in the flags field.
    pub fn has_flags(&self, mask: u8) -> bool {
        self.header.flags & mask == mask
    }

    /// `true` for a frame carrying application data.
    pub fn is_data(&self) -> bool {
        self.has_flags(flags::DATA)
    }

    /// `true` for an acknowledgement that carries no data (ACK set, DATA clear).
    pub fn is_pure_ack(&self) -> bool {
        self.has_flags(flags::ACK) && !self.is_data()
    }

    /// Serialise this packet into a newly allocated byte vector.
    ///
    /// `header.payload_len` and `header.checksum` are computed from the actual
    /// payload; any values already stored in those fields are ignored.  A
    /// payload longer than [`MAX_PAYLOAD`] is cut to that length, so the
    /// length field always matches the bytes written.
    ///
    /// When [`flags::TEST_CORRUPT`] is set on a DATA frame with a non-empty
    /// payload, the low bit of the first payload byte is flipped *after* the
    /// checksum has been computed, so the receiver's verification fails.
    pub fn encode(&self) -> Vec<u8> {
        let payload = if self.payload.len() > MAX_PAYLOAD {
            log::warn!(
                "payload of {} bytes truncated to {MAX_PAYLOAD}",
                self.payload.len()
            );
            &self.payload[..MAX_PAYLOAD]
        } else {
            &self.payload[..]
        };
        let mut buf = vec![0u8; HEADER_LEN + payload.len()];

        // MAX_PAYLOAD < u16::MAX, so the cast is lossless.
        write_header(&mut buf, &self.header, payload.len() as u16);
        buf[HEADER_LEN..].copy_from_slice(payload);

        let csum = internet_checksum(&buf);
        buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&csum.to_be_bytes());

        if self.has_flags(flags::DATA | flags::TEST_CORRUPT) && !payload.is_empty() {
            buf[HEADER_LEN] ^= 0x01;
        }

        buf
    }

    /// Parse a [`Packet`] from a raw byte slice.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`], or
    /// - the `payload_len` field disagrees with the bytes after the header.
    ///
    /// The checksum is *not* verified here; see [`Packet::checksum_ok`].
    pub fn decode(buf: &[u8]) -> Result<Self, FramingError> {
        if buf.len() < HEADER_LEN {
            return Err(FramingError::TooShort { len: buf.len() });
        }

        let payload_len = read_u16(buf, OFF_PAYLOAD_LEN);
        let actual = buf.len() - HEADER_LEN;
        if actual != usize::from(payload_len) {
            return Err(FramingError::LengthMismatch {
                declared: payload_len,
                actual,
            });
        }

        Ok(Packet {
            header: Header {
                version: buf[OFF_VERSION],
                flags: buf[OFF_FLAGS],
                seq: read_u32(buf, OFF_SEQ),
                ack: read_u32(buf, OFF_ACK),
                window: read_u16(buf, OFF_WINDOW),
                payload_len,
                checksum: read_u16(buf, OFF_CHECKSUM),
            },
            payload: buf[HEADER_LEN..].to_vec(),
        })
    }

    /// Recompute the checksum over the header (checksum field zeroed) and the
    /// payload as received, and compare it with `header.checksum`.
    ///
    /// Every header byte is a parsed field, so rebuilding the header from
    /// them reproduces the received bytes exactly.
    pub fn checksum_ok(&self) -> bool {
        let mut scratch = vec![0u8; HEADER_LEN + self.payload.len()];
        write_header(&mut scratch, &self.header, self.header.payload_len);
        scratch[HEADER_LEN..].copy_from_slice(&self.payload);
        internet_checksum(&scratch) == self.header.checksum
    }
}

/// Errors that can arise when parsing a raw datagram.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FramingError {
    /// Buffer shorter than the fixed header size.
    #[error("datagram of {len} bytes is shorter than the 16-byte header")]
    TooShort { len: usize },
    /// `payload_len` field does not match the actual remaining bytes.
    #[error("payload_len field says {declared} bytes but {actual} follow the header")]
    LengthMismatch { declared: u16, actual: usize },
}

/// Write every header field except the checksum, which stays zero.
fn write_header(buf: &mut [u8], h: &Header, payload_len: u16) {
    buf[OFF_VERSION] = h.version;
    buf[OFF_FLAGS] = h.flags;
    buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&h.seq.to_be_bytes());
    buf[OFF_ACK..OFF_ACK + 4].copy_from_slice(&h.ack.to_be_bytes());
    buf[OFF_WINDOW..OFF_WINDOW + 2].copy_from_slice(&h.window.to_be_bytes());
    buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 2].copy_from_slice(&payload_len.to_be_bytes());
    buf[OFF_CHECKSUM..OFF_CHECKSUM + 2].copy_from_slice(&0u16.to_be_bytes());
}

fn read_u16(buf: &[u8], off: usize) -> u16 {
    u16::from_be_bytes([buf[off], buf[off + 1]])
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// Compute the Internet checksum (RFC 1071) over `data`.
///
/// Sum consecutive 16-bit big-endian words, fold the carry, return the
/// one's-complement.  The caller must zero any checksum field within `data`
/// before calling this function.
pub fn internet_checksum(data: &[u8]) -> u16 {
    let mut sum: u32 = 0;
    let mut chunks = data.chunks_exact(2);

    for word in &mut chunks {
        sum += u32::from(u16::from_be_bytes([word[0], word[1]]));
    }
    // Odd trailing byte: pad with a zero byte on the right.
    if let [last] = chunks.remainder() {
        sum += u32::from(*last) << 8;
    }

    while sum >> 16 != 0 {
        sum = (sum & 0xffff) + (sum >> 16);
    }

    !(sum as u16)
}
