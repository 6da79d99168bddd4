//! Authenticated envelope sealing and opening.
//!
//! A sealed envelope is the wire-serialized pair `{ body, bucket }` followed by
//! an HMAC-SHA3-256 tag over every byte before it:
//!
//! ```text
//! [ wire(body, bucket) ] [ HMAC-SHA3-256(secret, wire(body, bucket)) (32) ]
//! ```
//!
//! `bucket` is `floor(unix_secs / window)`. Because it sits inside the tagged
//! bytes, it cannot be altered without breaking the tag. On open, the tag is
//! checked in constant time before any byte is deserialized; only then is the
//! bucket compared with the receiver's clock. Envelopes more than one bucket
//! away in either direction are rejected as stale.
//!
//! The freshness check limits how long a captured envelope stays usable. It is
//! not a replay guarantee: the same bytes sent twice inside the tolerance are
//! accepted twice.

use hmac::{Hmac, Mac};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sha3::Sha3_256;
use subtle::ConstantTimeEq;
use tracing::{trace, warn};

use crate::core::secret::SharedSecret;
use crate::core::serialization::{from_wire, to_wire};
use crate::error::{constants, ProtocolError, Result};
use crate::utils::time;

type HmacSha3 = Hmac<Sha3_256>;

/// Length of the trailing authentication tag.
pub const TAG_LEN: usize = 32;

/// Default freshness bucket width in seconds.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 5;

/// How many buckets an envelope may differ from the receiver's current one.
const BUCKET_TOLERANCE: u64 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct Envelope<T> {
    body: T,
    bucket: u64,
}

/// Seals and opens envelopes under one shared secret.
#[derive(Debug, Clone)]
pub struct EnvelopeCodec {
    secret: SharedSecret,
    window_secs: u64,
}

impl EnvelopeCodec {
    pub fn new(secret: SharedSecret) -> Self {
        Self {
            secret,
            window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
        }
    }

    /// Set the freshness bucket width.
    ///
    /// # Errors
    /// Returns `ProtocolError::ConfigError` for a zero-width window.
    pub fn with_freshness_window(mut self, window_secs: u64) -> Result<Self> {
        if window_secs == 0 {
            return Err(ProtocolError::ConfigError(
                "freshness window must be at least 1 second".into(),
            ));
        }
        self.window_secs = window_secs;
        Ok(self)
    }

    pub fn freshness_window(&self) -> u64 {
        self.window_secs
    }

    pub fn bucket_for(&self, unix_secs: u64) -> u64 {
        time::bucket(unix_secs, self.window_secs)
    }

    /// Seal `obj` stamped with the current time.
    pub fn encode<T: Serialize>(&self, obj: &T) -> Result<Vec<u8>> {
        self.encode_at(obj, time::unix_now()?)
    }

    /// Seal `obj` as if the current time were `unix_secs`.
    pub fn encode_at<T: Serialize>(&self, obj: &T, unix_secs: u64) -> Result<Vec<u8>> {
        let envelope = Envelope {
            body: obj,
            bucket: self.bucket_for(unix_secs),
        };

        let mut sealed = to_wire(&envelope)?;
        let tag = self.tag(&sealed)?;
        sealed.extend_from_slice(&tag);

        trace!(bytes = sealed.len(), bucket = envelope.bucket, "Envelope sealed");
        Ok(sealed)
    }

    /// Authenticate and open an envelope against the current time.
    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T> {
        self.decode_at(bytes, time::unix_now()?)
    }

    /// Authenticate and open an envelope as if the current time were `unix_secs`.
    pub fn decode_at<T: DeserializeOwned>(&self, bytes: &[u8], unix_secs: u64) -> Result<T> {
        let body = self.verify(bytes)?;
        let envelope: Envelope<T> = from_wire(body)?;

        let current = self.bucket_for(unix_secs);
        if envelope.bucket.abs_diff(current) > BUCKET_TOLERANCE {
            warn!(
                sealed_bucket = envelope.bucket,
                current_bucket = current,
                window_secs = self.window_secs,
                "Rejecting stale envelope"
            );
            return Err(ProtocolError::StaleEnvelope(format!(
                "sealed in bucket {} but current bucket is {}",
                envelope.bucket, current
            )));
        }

        Ok(envelope.body)
    }

    /// Check the trailing tag and return the authenticated bytes before it.
    ///
    /// Nothing in the returned slice has been interpreted yet.
    pub fn verify<'a>(&self, bytes: &'a [u8]) -> Result<&'a [u8]> {
        if bytes.len() < TAG_LEN {
            return Err(ProtocolError::Authentication(
                constants::ERR_ENVELOPE_TRUNCATED.into(),
            ));
        }

        let (body, tag) = bytes.split_at(bytes.len() - TAG_LEN);
        let expected = self.tag(body)?;

        if bool::from(expected.as_slice().ct_eq(tag)) {
            Ok(body)
        } else {
            warn!(bytes = bytes.len(), "Envelope authentication failed");
            Err(ProtocolError::Authentication(
                constants::ERR_TAG_MISMATCH.into(),
            ))
        }
    }

    fn tag(&self, data: &[u8]) -> Result<[u8; TAG_LEN]> {
        let mut mac = HmacSha3::new_from_slice(self.secret.as_bytes())
            .map_err(|e| ProtocolError::ConfigError(format!("unusable HMAC key: {e}")))?;
        mac.update(data);

        let mut out = [0u8; TAG_LEN];
        out.copy_from_slice(&mac.finalize().into_bytes());
        Ok(out)
    }
}
