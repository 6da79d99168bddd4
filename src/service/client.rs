//! Request/response client.
//!
//! Every request opens a fresh connection, sends one sealed [`Message`] and
//! waits for one sealed [`Reply`]. Connection-level failures are retried on a
//! new connection; anything that happens after the server has answered is not.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, instrument, warn};

use crate::config::{ClientConfig, IpcConfig, DEFAULT_RETRIES};
use crate::core::envelope::EnvelopeCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::message::Message;
use crate::protocol::response::{Reply, Response};
use crate::service::sealed::SealedConnection;
use crate::transport::local;
use crate::utils::metrics::{Metrics, Timer};
use crate::utils::timeout::with_timeout_error;

/// Per-request behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Reject responses that fail the message's own validator.
    pub validate_response: bool,
    /// Retries after the first failed attempt.
    pub retries: u32,
    /// Pause between attempts.
    pub retry_delay: Duration,
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            validate_response: true,
            retries: DEFAULT_RETRIES,
            retry_delay: Duration::ZERO,
        }
    }
}

impl From<&ClientConfig> for RequestOptions {
    fn from(config: &ClientConfig) -> Self {
        Self {
            validate_response: config.validate_responses,
            retries: config.retries,
            retry_delay: config.retry_delay,
        }
    }
}

/// Sends requests to a [`Server`](crate::service::server::Server).
///
/// A client runs one request at a time. Starting a second request while one
/// is in flight fails immediately with [`ProtocolError::ConcurrentUse`].
#[derive(Debug)]
pub struct Client {
    socket_path: PathBuf,
    codec: EnvelopeCodec,
    config: ClientConfig,
    request_lock: Mutex<()>,
    closed: AtomicBool,
    metrics: Metrics,
}

impl Client {
    /// Create a client for the endpoint described by `config`.
    ///
    /// No connection is made until the first request.
    pub fn new(config: &IpcConfig) -> Result<Self> {
        if config.endpoint.secret.is_empty() {
            return Err(ProtocolError::ConfigError(
                "shared secret cannot be empty".into(),
            ));
        }

        let codec = EnvelopeCodec::new(config.endpoint.secret.clone())
            .with_freshness_window(config.endpoint.freshness_window_secs)?;

        Ok(Self {
            socket_path: config.endpoint.socket_path.clone(),
            codec,
            config: config.client.clone(),
            request_lock: Mutex::new(()),
            closed: AtomicBool::new(false),
            metrics: Metrics::new(),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Send `message` using the options from this client's configuration.
    pub async fn request(&self, message: &Message) -> Result<Response> {
        self.request_with(message, RequestOptions::from(&self.config))
            .await
    }

    /// Send `message` and wait for the server's response.
    ///
    /// # Errors
    /// - `ConcurrentUse` if another request is in flight on this client
    /// - `Lifecycle` if the client has been closed
    /// - `Transport` once `retries + 1` connection attempts have failed
    /// - `NoResponse` if the server hung up without answering
    /// - `Timeout` if no answer arrived within the response timeout
    /// - `InvalidResponse` if validation is on and the response fails it
    /// - `Authentication`, `MalformedPayload`, `StaleEnvelope` or `NoHandler`
    ///   when the reply cannot be trusted or the server refused the request
    #[instrument(skip(self, message, options), fields(kind = %message.kind()))]
    pub async fn request_with(
        &self,
        message: &Message,
        options: RequestOptions,
    ) -> Result<Response> {
        let _guard = self
            .request_lock
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_REQUEST_IN_FLIGHT))?;

        if self.is_closed() {
            return Err(ProtocolError::Lifecycle(constants::ERR_CLIENT_CLOSED));
        }

        let _timer = Timer::start("ipc_request");
        self.metrics.request_started();

        let response = self.send_with_retries(message, options).await?;

        if options.validate_response && !message.validate_response(&response) {
            self.metrics.invalid_response();
            warn!(status = ?response.status, "Response failed validation");
            return Err(ProtocolError::InvalidResponse(response));
        }

        Ok(response)
    }

    /// Close the client. Further requests fail with `Lifecycle`.
    ///
    /// Closing an already closed client is a no-op.
    ///
    /// # Errors
    /// Returns `Lifecycle` if a request is in flight.
    pub fn close(&self) -> Result<()> {
        let _guard = self
            .request_lock
            .try_lock()
            .map_err(|_| ProtocolError::Lifecycle(constants::ERR_CLIENT_BUSY_CLOSE))?;

        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!(socket_path = %self.socket_path.display(), "Client closed");
        }
        Ok(())
    }

    async fn send_with_retries(
        &self,
        message: &Message,
        options: RequestOptions,
    ) -> Result<Response> {
        let max_attempts = options.retries.saturating_add(1);
        let mut attempt = 0u32;

        let reply = loop {
            attempt += 1;
            self.metrics.attempt();

            match self.exchange(message).await {
                Ok(reply) => break reply,
                Err(ProtocolError::Io(source)) => {
                    if attempt >= max_attempts {
                        self.metrics.transport_failure();
                        warn!(attempts = attempt, error = %source, "Giving up on request");
                        return Err(ProtocolError::Transport {
                            attempts: attempt,
                            source,
                        });
                    }

                    debug!(attempt, max_attempts, error = %source, "Attempt failed, retrying");
                    if !options.retry_delay.is_zero() {
                        tokio::time::sleep(options.retry_delay).await;
                    }
                }
                Err(e) => return Err(e),
            }
        };

        self.metrics.response_received();
        match reply {
            Reply::Answer(response) => Ok(response),
            Reply::Fault(fault) => {
                debug!(?fault, "Server refused the request");
                Err(fault.into_error())
            }
        }
    }

    /// One attempt: connect, send, wait for the reply.
    async fn exchange(&self, message: &Message) -> Result<Reply> {
        let conn = local::connect(&self.socket_path, self.config.connect_timeout).await?;
        let mut conn = SealedConnection::new(conn, &self.codec, &self.metrics);

        conn.send(message).await?;

        with_timeout_error(conn.recv::<Reply>(), self.config.response_timeout)
            .await?
            .ok_or(ProtocolError::NoResponse)
    }
}
