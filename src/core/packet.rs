//! Length-prefixed frame carrying one sealed envelope.
//!
//! ```text
//! [Magic(4)] [Version(1)] [Length(4, big-endian)] [Payload(N)]
//! ```

use crate::config::{MAGIC_BYTES, MAX_PAYLOAD_SIZE, PROTOCOL_VERSION};
use crate::error::{ProtocolError, Result};

/// Size of the fixed frame header in bytes.
pub const HEADER_SIZE: usize = 9;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub version: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            version: PROTOCOL_VERSION,
            payload,
        }
    }

    /// Serialize the frame.
    ///
    /// # Errors
    /// `OversizedPacket` if the payload exceeds [`MAX_PAYLOAD_SIZE`].
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let len = wire_len(&self.payload)?;
        let mut out = Vec::with_capacity(HEADER_SIZE + self.payload.len());
        out.extend_from_slice(&MAGIC_BYTES);
        out.push(self.version);
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(&self.payload);
        Ok(out)
    }

    /// Parse a complete frame from `buf`.
    ///
    /// Bytes after the declared payload length are ignored.
    pub fn from_bytes(buf: &[u8]) -> Result<Self> {
        let (version, len) = parse_header(buf)?.ok_or(ProtocolError::InvalidHeader)?;

        let end = HEADER_SIZE + len;
        if buf.len() < end {
            return Err(ProtocolError::InvalidHeader);
        }

        Ok(Self {
            version,
            payload: buf[HEADER_SIZE..end].to_vec(),
        })
    }
}

/// Length field for `payload`, refusing anything over the frame limit.
pub(crate) fn wire_len(payload: &[u8]) -> Result<u32> {
    if payload.len() > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(payload.len()));
    }
    u32::try_from(payload.len()).map_err(|_| ProtocolError::OversizedPacket(payload.len()))
}

/// Validate a frame header, returning `(version, payload_len)`.
///
/// Returns `Ok(None)` when fewer than [`HEADER_SIZE`] bytes are available.
pub(crate) fn parse_header(buf: &[u8]) -> Result<Option<(u8, usize)>> {
    if buf.len() < HEADER_SIZE {
        return Ok(None);
    }

    if buf[..4] != MAGIC_BYTES {
        return Err(ProtocolError::InvalidHeader);
    }

    let version = buf[4];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let len = u32::from_be_bytes([buf[5], buf[6], buf[7], buf[8]]) as usize;
    if len > MAX_PAYLOAD_SIZE {
        return Err(ProtocolError::OversizedPacket(len));
    }

    Ok(Some((version, len)))
}
