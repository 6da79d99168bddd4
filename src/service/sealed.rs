use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::core::envelope::EnvelopeCodec;
use crate::error::Result;
use crate::transport::local::{self, Connection};
use crate::utils::metrics::Metrics;

/// A framed connection whose frames are sealed envelopes.
pub struct SealedConnection<'a> {
    conn: Connection,
    codec: &'a EnvelopeCodec,
    metrics: &'a Metrics,
}

impl<'a> SealedConnection<'a> {
    pub fn new(conn: Connection, codec: &'a EnvelopeCodec, metrics: &'a Metrics) -> Self {
        Self {
            conn,
            codec,
            metrics,
        }
    }

    #[instrument(skip(self, value), level = "debug")]
    pub async fn send<T: Serialize>(&mut self, value: &T) -> Result<()> {
        let sealed = self.codec.encode(value)?;
        let len = sealed.len() as u64;

        local::send_frame(&mut self.conn, sealed).await?;
        self.metrics.frame_sent(len);
        debug!(bytes = len, "Sent sealed frame");
        Ok(())
    }

    /// Receive and open one envelope. `Ok(None)` if the peer hung up first.
    #[instrument(skip(self), level = "debug")]
    pub async fn recv<T: DeserializeOwned>(&mut self) -> Result<Option<T>> {
        let Some(frame) = local::recv_frame(&mut self.conn).await? else {
            debug!("Peer closed before sending a frame");
            return Ok(None);
        };
        self.metrics.frame_received(frame.len() as u64);

        self.codec
            .decode(&frame)
            .map(Some)
            .map_err(|e| {
                self.metrics.rejected(&e);
                e
            })
    }
}
