//! # Wire Serialization
//!
//! The byte encoding of envelopes. Both ends of a connection must agree on it
//! byte for byte, so it is pinned here rather than left to bincode's defaults:
//!
//! - **bincode 1.x** with fixed-width integers
//! - **little-endian** byte order
//! - **size limit** equal to the maximum frame payload
//! - **trailing bytes rejected**, so a decoded value accounts for the whole input
//!
//! Decoding failures surface as [`ProtocolError::MalformedPayload`]; callers only
//! reach this module after the authentication tag has verified.

use bincode::Options;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::config::MAX_PAYLOAD_SIZE;
use crate::error::{ProtocolError, Result};

fn options() -> impl Options {
    bincode::DefaultOptions::new()
        .with_fixint_encoding()
        .with_little_endian()
        .with_limit(MAX_PAYLOAD_SIZE as u64)
        .reject_trailing_bytes()
}

/// Serialize `value` with the pinned wire options.
pub fn to_wire<T: Serialize + ?Sized>(value: &T) -> Result<Vec<u8>> {
    options()
        .serialize(value)
        .map_err(|e| ProtocolError::SerializeError(e.to_string()))
}

/// Deserialize a value that must span all of `bytes`.
pub fn from_wire<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    options()
        .deserialize(bytes)
        .map_err(|e| ProtocolError::MalformedPayload(e.to_string()))
}
