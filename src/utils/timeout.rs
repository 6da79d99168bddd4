//! Timeout defaults and wrappers for socket operations.

use std::future::Future;
use std::time::Duration;

use crate::error::{ProtocolError, Result};

/// Default bound on establishing a connection.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

/// Default bound on waiting for a reply once a request is sent.
pub const RESPONSE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default receive timeout for one `serve_forever` cycle.
pub const RECV_TIMEOUT: Duration = Duration::from_secs(1);

/// Run `fut`, failing with [`ProtocolError::Timeout`] if it takes longer than `duration`.
pub async fn with_timeout_error<F, T>(fut: F, duration: Duration) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(duration, fut)
        .await
        .map_err(|_| ProtocolError::Timeout)?
}
