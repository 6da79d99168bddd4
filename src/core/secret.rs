//! The pre-shared key both ends of a connection authenticate with.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use subtle::ConstantTimeEq;
use zeroize::Zeroize;

use crate::error::{ProtocolError, Result};

/// Number of random bytes drawn by [`SharedSecret::generate`].
const GENERATED_SECRET_BYTES: usize = 32;

/// Secret key material shared out of band between client and server.
///
/// The bytes are wiped when the value is dropped and never appear in `Debug`
/// output. In configuration files the secret is a plain string whose UTF-8
/// bytes are the key.
#[derive(Clone, Default)]
pub struct SharedSecret(Vec<u8>);

impl SharedSecret {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    /// Draw a fresh secret from the operating system RNG.
    ///
    /// The result is hex text so it can be written to a config file as is.
    pub fn generate() -> Result<Self> {
        let mut raw = [0u8; GENERATED_SECRET_BYTES];
        getrandom::fill(&mut raw)
            .map_err(|e| ProtocolError::Custom(format!("OS RNG unavailable: {e}")))?;

        let mut hex = String::with_capacity(GENERATED_SECRET_BYTES * 2);
        for byte in raw {
            hex.push(char::from_digit(u32::from(byte >> 4), 16).unwrap_or('0'));
            hex.push(char::from_digit(u32::from(byte & 0x0F), 16).unwrap_or('0'));
        }
        raw.zeroize();

        Ok(Self(hex.into_bytes()))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl Drop for SharedSecret {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl PartialEq for SharedSecret {
    fn eq(&self, other: &Self) -> bool {
        self.0.as_slice().ct_eq(other.0.as_slice()).into()
    }
}

impl Eq for SharedSecret {}

impl fmt::Debug for SharedSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SharedSecret(<redacted, {} bytes>)", self.0.len())
    }
}

impl From<&str> for SharedSecret {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl From<&[u8]> for SharedSecret {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes)
    }
}

impl Serialize for SharedSecret {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let text = std::str::from_utf8(&self.0).map_err(|_| {
            serde::ser::Error::custom("secret is not valid UTF-8 and cannot be written as text")
        })?;
        text.serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for SharedSecret {
    fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let text = String::deserialize(deserializer)?;
        Ok(Self(text.into_bytes()))
    }
}
