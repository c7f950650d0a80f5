//! Frame records, their binary encoding, and the CRC-8 payload checksum.
//!
//! Every message exchanged between peers is a [`Frame`].  This module is
//! responsible for:
//! - Defining the on-wire binary layout.
//! - Serialising a [`Frame`] into a byte buffer ready for the framing layer.
//! - Deserialising a byte slice back into a [`Frame`], returning
//!   [`FrameError`] for malformed or truncated input.
//! - Computing and verifying the CRC-8 carried by DATA frames.
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
//! |                        Sequence Number                        |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! |     Kind      |   Presence    |     CRC-8     |               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               +
//! |                 Payload Length                |               |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+               +
//! |                        Payload ...                            |
//! +-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+-+
//! ```
//!
//! Total header size: [`HEADER_LEN`] = 11 bytes.
//! seq(4) + kind(1) + presence(1) + crc(1) + payload_len(4)
//!
//! The presence byte records which optional fields the frame carries, so an
//! ACK (no payload, no crc) and a DATA frame with an empty payload remain
//! distinguishable.

use std::fmt;

use thiserror::Error;

/// Byte length of the fixed-size header on the wire.
pub const HEADER_LEN: usize = 11;

// Byte offsets of each field within the serialised header.
const OFF_SEQ: usize = 0;
const OFF_KIND: usize = 4;
const OFF_PRESENCE: usize = 5;
const OFF_CRC: usize = 6;
const OFF_PAYLOAD_LEN: usize = 7;

/// Bit-flag constants for the presence byte.
mod presence {
    pub const PAYLOAD: u8 = 0b0000_0001;
    pub const CRC: u8 = 0b0000_0010;
}

/// Generator polynomial x^8 + x^2 + x + 1.
pub const CRC8_POLYNOMIAL: u8 = 0x07;

/// The two frame types of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameKind {
    /// Carries one payload unit of the application message.
    Data,
    /// Cumulative acknowledgement: `seq_num` is the next sequence number the
    /// receiver expects.
    Ack,
}

impl FrameKind {
    fn tag(self) -> u8 {
        match self {
            Self::Data => 1,
            Self::Ack => 2,
        }
    }

    fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Self::Data),
            2 => Some(Self::Ack),
            _ => None,
        }
    }
}

impl fmt::Display for FrameKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("DATA"),
            Self::Ack => f.write_str("ACK"),
        }
    }
}

/// One protocol frame.
///
/// DATA frames always carry `payload` and `crc`; ACK frames carry neither.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub seq_num: u32,
    pub kind: FrameKind,
    pub payload: Option<Vec<u8>>,
    pub crc: Option<u8>,
}

impl Frame {
    /// A DATA frame whose crc is computed over `payload`.
    pub fn data(seq_num: u32, payload: Vec<u8>) -> Self {
        let crc = calculate_crc8(&payload);
        Self {
            seq_num,
            kind: FrameKind::Data,
            payload: Some(payload),
            crc: Some(crc),
        }
    }

    /// A cumulative ACK announcing `next_expected`.
    pub fn ack(next_expected: u32) -> Self {
        Self {
            seq_num: next_expected,
            kind: FrameKind::Ack,
            payload: None,
            crc: None,
        }
    }

    pub fn is_data(&self) -> bool {
        self.kind == FrameKind::Data
    }

    pub fn is_ack(&self) -> bool {
        self.kind == FrameKind::Ack
    }

    /// Payload bytes, or an empty slice for frames without one.
    pub fn payload_bytes(&self) -> &[u8] {
        self.payload.as_deref().unwrap_or_default()
    }

    /// `true` when this is a DATA frame whose crc matches its payload.
    pub fn crc_ok(&self) -> bool {
        match (&self.payload, self.crc) {
            (Some(payload), Some(crc)) => verify_crc8(payload, crc),
            _ => false,
        }
    }

    /// Serialise this frame into a newly allocated byte vector.
    ///
    /// `crc` is written as stored; it is never recomputed here, so a frame
    /// whose payload was altered after construction keeps its stale crc.
    pub fn encode(&self) -> Vec<u8> {
        let payload = self.payload_bytes();
        let mut buf = vec![0u8; HEADER_LEN + payload.len()];

        let mut flags = 0u8;
        if self.payload.is_some() {
            flags |= presence::PAYLOAD;
        }
        if self.crc.is_some() {
            flags |= presence::CRC;
        }

        buf[OFF_SEQ..OFF_SEQ + 4].copy_from_slice(&self.seq_num.to_be_bytes());
        buf[OFF_KIND] = self.kind.tag();
        buf[OFF_PRESENCE] = flags;
        buf[OFF_CRC] = self.crc.unwrap_or(0);
        buf[OFF_PAYLOAD_LEN..OFF_PAYLOAD_LEN + 4]
            .copy_from_slice(&(payload.len() as u32).to_be_bytes());
        buf[HEADER_LEN..].copy_from_slice(payload);

        buf
    }

    /// Parse a [`Frame`] from a complete serialised frame.
    ///
    /// Returns [`Err`] if:
    /// - `buf` is shorter than [`HEADER_LEN`],
    /// - the kind tag is unknown,
    /// - the `payload_len` field disagrees with `buf.len()`, or
    /// - a DATA frame lacks its payload or crc.
    ///
    /// The crc is *not* verified; deciding what to do with a corrupted DATA
    /// frame is the receiver engine's job.
    pub fn decode(buf: &[u8]) -> Result<Self, FrameError> {
        if buf.len() < HEADER_LEN {
            return Err(FrameError::BufferTooShort(buf.len()));
        }

        let seq_num = read_u32(buf, OFF_SEQ);
        let kind = FrameKind::from_tag(buf[OFF_KIND])
            .ok_or(FrameError::UnknownKind(buf[OFF_KIND]))?;
        let flags = buf[OFF_PRESENCE];
        let payload_len = read_u32(buf, OFF_PAYLOAD_LEN) as usize;

        if buf.len() - HEADER_LEN != payload_len {
            return Err(FrameError::LengthMismatch {
                declared: payload_len,
                actual: buf.len() - HEADER_LEN,
            });
        }

        let has_payload = flags & presence::PAYLOAD != 0;
        let has_crc = flags & presence::CRC != 0;
        if !has_payload && payload_len != 0 {
            return Err(FrameError::LengthMismatch {
                declared: 0,
                actual: payload_len,
            });
        }

        let frame = match kind {
            FrameKind::Data => {
                if !has_payload {
                    return Err(FrameError::MissingField("payload"));
                }
                if !has_crc {
                    return Err(FrameError::MissingField("crc"));
                }
                Frame {
                    seq_num,
                    kind,
                    payload: Some(buf[HEADER_LEN..].to_vec()),
                    crc: Some(buf[OFF_CRC]),
                }
            }
            // Optional fields on an ACK carry no meaning and are dropped.
            FrameKind::Ack => Frame::ack(seq_num),
        };
        Ok(frame)
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.payload, self.crc) {
            (Some(payload), Some(crc)) => write!(
                f,
                "Frame(seq={}, type={}, len={}, crc={:#04x})",
                self.seq_num,
                self.kind,
                payload.len(),
                crc
            ),
            _ => write!(f, "Frame(seq={}, type={})", self.seq_num, self.kind),
        }
    }
}

fn read_u32(buf: &[u8], off: usize) -> u32 {
    u32::from_be_bytes([buf[off], buf[off + 1], buf[off + 2], buf[off + 3]])
}

/// A serialised frame that could not be decoded.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FrameError {
    #[error("buffer of {0} bytes is too short to contain a frame header")]
    BufferTooShort(usize),
    #[error("unknown frame kind tag {0}")]
    UnknownKind(u8),
    #[error("payload length field says {declared} bytes but {actual} follow")]
    LengthMismatch { declared: usize, actual: usize },
    #[error("DATA frame is missing its {0}")]
    MissingField(&'static str),
}

/// Compute the CRC-8 (poly 0x07, init 0x00, MSB first) of `data`.
pub fn calculate_crc8(data: &[u8]) -> u8 {
    let mut crc = 0u8;
    for &byte in data {
        crc ^= byte;
        for _ in 0..8 {
            crc = if crc & 0x80 != 0 {
                (crc << 1) ^ CRC8_POLYNOMIAL
            } else {
                crc << 1
            };
        }
    }
    crc
}

/// `true` when `crc` is the CRC-8 of `data`.
pub fn verify_crc8(data: &[u8], crc: u8) -> bool {
    calculate_crc8(data) == crc
}
