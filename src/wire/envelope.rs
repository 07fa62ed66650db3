//! Fixed-width envelope codec for queue messages.
//!
//! # Responsibilities
//! - Pack a `(type, corr_id, payload)` triple into a 24-byte header + payload
//! - Validate and split an inbound byte buffer into header + payload
//! - Reject anything that is not a well-formed envelope, without side effects
//!
//! # Design Decisions
//! - Fixed-size prefix: O(1) validation, no tokenizer
//! - `magic` + `version` allow wire evolution without changing framing
//! - Host byte order; both processes are co-located by contract

use thiserror::Error;

/// Identifies an envelope on the wire ("TRMQ").
pub const MAGIC: u32 = 0x5452_4D51;

/// Current envelope layout version.
pub const VERSION: u16 = 1;

/// Header size on the wire: magic(4) + version(2) + type(2) + corr_id(8)
/// + payload_len(4) + reserved(4).
pub const HEADER_LEN: usize = 24;

/// Message kind carried in the envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u16)]
pub enum MsgType {
    /// Router → engine routing query.
    Request = 1,
    /// Engine → router routing decision.
    Response = 2,
}

impl MsgType {
    /// Decode the wire discriminant; unknown values are preserved for the
    /// caller to discard rather than treated as a framing error.
    pub fn from_wire(raw: u16) -> Option<Self> {
        match raw {
            1 => Some(Self::Request),
            2 => Some(Self::Response),
            _ => None,
        }
    }
}

/// Decoded envelope header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub magic: u32,
    pub version: u16,
    pub msg_type: u16,
    pub corr_id: u64,
    pub payload_len: u32,
    pub reserved: u32,
}

/// Why an inbound buffer was rejected by [`unpack`].
///
/// Rejection is non-fatal to the channel; callers discard the envelope.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum EnvelopeError {
    #[error("envelope truncated: {0} bytes, header needs {HEADER_LEN}")]
    Truncated(usize),
    #[error("bad magic 0x{0:08x}")]
    BadMagic(u32),
    #[error("unsupported envelope version {0}")]
    BadVersion(u16),
    #[error("payload length mismatch: header declares {declared}, buffer carries {actual}")]
    LengthMismatch { declared: usize, actual: usize },
}

/// Frame a payload for the queue: fixed header followed by the bytes verbatim.
pub fn pack(msg_type: MsgType, corr_id: u64, payload: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
    out.extend_from_slice(&MAGIC.to_ne_bytes());
    out.extend_from_slice(&VERSION.to_ne_bytes());
    out.extend_from_slice(&(msg_type as u16).to_ne_bytes());
    out.extend_from_slice(&corr_id.to_ne_bytes());
    out.extend_from_slice(&(payload.len() as u32).to_ne_bytes());
    out.extend_from_slice(&0u32.to_ne_bytes());
    out.extend_from_slice(payload);
    out
}

/// Validate a buffer and split it into header and payload.
pub fn unpack(bytes: &[u8]) -> Result<(Header, &[u8]), EnvelopeError> {
    if bytes.len() < HEADER_LEN {
        return Err(EnvelopeError::Truncated(bytes.len()));
    }

    let header = Header {
        magic: read_u32(&bytes[0..4]),
        version: read_u16(&bytes[4..6]),
        msg_type: read_u16(&bytes[6..8]),
        corr_id: read_u64(&bytes[8..16]),
        payload_len: read_u32(&bytes[16..20]),
        reserved: read_u32(&bytes[20..24]),
    };

    if header.magic != MAGIC {
        return Err(EnvelopeError::BadMagic(header.magic));
    }
    if header.version != VERSION {
        return Err(EnvelopeError::BadVersion(header.version));
    }

    let declared = header.payload_len as usize;
    let actual = bytes.len() - HEADER_LEN;
    if declared != actual {
        return Err(EnvelopeError::LengthMismatch { declared, actual });
    }

    Ok((header, &bytes[HEADER_LEN..]))
}

fn read_u16(b: &[u8]) -> u16 {
    u16::from_ne_bytes([b[0], b[1]])
}

fn read_u32(b: &[u8]) -> u32 {
    u32::from_ne_bytes([b[0], b[1], b[2], b[3]])
}

fn read_u64(b: &[u8]) -> u64 {
    u64::from_ne_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]])
}
