//! Wall-clock helpers for envelope freshness.

use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{constants, ProtocolError, Result};

/// Seconds since the Unix epoch.
///
/// # Errors
/// Returns a `ProtocolError::Custom` if the system time is earlier than UNIX_EPOCH
pub fn unix_now() -> Result<u64> {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .map_err(|_| ProtocolError::Custom(constants::ERR_SYSTEM_TIME.into()))
}

/// Index of the `window_secs`-wide bucket containing `unix_secs`.
///
/// Buckets grow monotonically with time, so two stamps can be compared by
/// subtraction. A zero window is treated as one second.
#[inline]
pub fn bucket(unix_secs: u64, window_secs: u64) -> u64 {
    unix_secs / window_secs.max(1)
}
