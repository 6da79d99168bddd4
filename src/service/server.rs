//! Request/response server.
//!
//! The server owns a Unix socket listener and a [`Dispatcher`]. Each accepted
//! connection carries one sealed request; the server opens it, routes it to a
//! handler and seals the handler's [`Response`] back.
//!
//! Two locks keep serving single-threaded per instance. The endpoint lock is
//! held for as long as the listener is in use; the forever lock is held for
//! the whole of `serve_forever` (and briefly by `serve_once`) so the two cannot
//! overlap. Serving calls take both with `try_lock` and fail fast;
//! [`Server::shutdown`] waits for them.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, error, info, instrument, warn};

use crate::config::{IpcConfig, ServerConfig};
use crate::core::envelope::EnvelopeCodec;
use crate::error::{constants, ProtocolError, Result};
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{Message, Variant};
use crate::protocol::response::{Fault, Reply, Response};
use crate::service::sealed::SealedConnection;
use crate::transport::local;
use crate::utils::metrics::Metrics;

/// Pause after a failed `accept` before trying again.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

/// Where a server is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// No listener yet.
    Unbound,
    /// Listening, but nobody is currently serving.
    Bound,
    /// A serve call is running.
    Serving,
    /// `shutdown` has been requested and is waiting for serving to stop.
    ShuttingDown,
    /// Shut down for good. Serving again requires a new instance.
    Closed,
}

impl fmt::Display for ServerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ServerState::Unbound => "unbound",
            ServerState::Bound => "bound",
            ServerState::Serving => "serving",
            ServerState::ShuttingDown => "shutting down",
            ServerState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What one connection needs, cheap to clone into a task.
#[derive(Clone)]
struct Session {
    codec: Arc<EnvelopeCodec>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
}

impl Session {
    /// Run one request cycle on an accepted connection.
    ///
    /// Elapsing `recv_timeout` before a frame arrives is an idle tick, not an
    /// error.
    async fn handle(&self, stream: UnixStream, recv_timeout: Option<Duration>) -> Result<()> {
        self.metrics.connection_accepted();
        let mut conn =
            SealedConnection::new(local::framed(stream), &self.codec, &self.metrics);

        let received = match recv_timeout {
            Some(limit) => match tokio::time::timeout(limit, conn.recv::<Message>()).await {
                Ok(received) => received,
                Err(_) => {
                    self.metrics.idle_tick();
                    debug!(timeout_ms = limit.as_millis() as u64, "No request before timeout");
                    return Ok(());
                }
            },
            None => conn.recv::<Message>().await,
        };

        let message = match received {
            Ok(Some(message)) => message,
            Ok(None) => return Err(ProtocolError::ConnectionClosed),
            Err(e) => {
                reply_fault(&mut conn, &e).await;
                return Err(e);
            }
        };

        debug!(kind = %message.kind(), "Request received");

        match self.dispatcher.dispatch(&message) {
            Ok(response) => {
                self.metrics.dispatched();
                conn.send(&Reply::Answer(response)).await
            }
            Err(e @ ProtocolError::NoHandler(_)) => {
                self.metrics.rejected(&e);
                reply_fault(&mut conn, &e).await;
                Err(e)
            }
            Err(e) => {
                self.metrics.dispatched();
                Err(e)
            }
        }
    }
}

/// Tell the client why its request was refused. Best effort: the connection
/// may already be gone.
async fn reply_fault(conn: &mut SealedConnection<'_>, err: &ProtocolError) {
    let Some(fault) = Fault::for_error(err) else {
        return;
    };
    if let Err(send_err) = conn.send(&Reply::Fault(fault)).await {
        debug!(error = %send_err, ?fault, "Could not deliver fault reply");
    }
}

/// Resolves once a shutdown has been requested.
async fn stop_requested(shutdown: &mut watch::Receiver<bool>) {
    // The sender lives as long as the server, so this only ends on `true`.
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Clears the serving flag when a serve call ends, however it ends.
struct ServingGuard<'a>(&'a AtomicBool);

impl<'a> ServingGuard<'a> {
    fn enter(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for ServingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Answers requests from [`Client`](crate::service::client::Client)s.
pub struct Server {
    socket_path: PathBuf,
    config: ServerConfig,
    codec: Arc<EnvelopeCodec>,
    dispatcher: Arc<Dispatcher>,
    metrics: Arc<Metrics>,
    endpoint: Mutex<Option<UnixListener>>,
    forever_lock: Mutex<()>,
    shutdown_tx: watch::Sender<bool>,
    bound: AtomicBool,
    serving: AtomicBool,
    closed: AtomicBool,
}

impl fmt::Debug for Server {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Server")
            .field("socket_path", &self.socket_path)
            .field("state", &self.state())
            .field("dispatcher", &self.dispatcher)
            .finish()
    }
}

impl Server {
    /// Create a server for the endpoint described by `config`.
    ///
    /// The socket is not bound until [`bind`](Self::bind) or the first serve
    /// call.
    pub fn new(config: &IpcConfig) -> Result<Self> {
        if config.endpoint.secret.is_empty() {
            return Err(ProtocolError::ConfigError(
                "shared secret cannot be empty".into(),
            ));
        }

        let codec = EnvelopeCodec::new(config.endpoint.secret.clone())
            .with_freshness_window(config.endpoint.freshness_window_secs)?;
        let (shutdown_tx, _) = watch::channel(false);

        Ok(Self {
            socket_path: config.endpoint.socket_path.clone(),
            config: config.server.clone(),
            codec: Arc::new(codec),
            dispatcher: Arc::new(Dispatcher::new()),
            metrics: Arc::new(Metrics::new()),
            endpoint: Mutex::new(None),
            forever_lock: Mutex::new(()),
            shutdown_tx,
            bound: AtomicBool::new(false),
            serving: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        })
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    pub fn metrics(&self) -> &Metrics {
        &self.metrics
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.dispatcher
    }

    pub fn state(&self) -> ServerState {
        if self.closed.load(Ordering::SeqCst) {
            ServerState::Closed
        } else if *self.shutdown_tx.borrow() {
            ServerState::ShuttingDown
        } else if self.serving.load(Ordering::SeqCst) {
            ServerState::Serving
        } else if self.bound.load(Ordering::SeqCst) {
            ServerState::Bound
        } else {
            ServerState::Unbound
        }
    }

    /// Register `handler` for messages matching `variant`.
    ///
    /// Registering a variant again replaces its handler without changing its
    /// position. When no handler is registered for a message's exact variant,
    /// the first registered abstract variant (`Payload`, `Any`) covering it
    /// answers instead.
    pub fn on_message<F>(&mut self, variant: Variant, handler: F) -> &mut Self
    where
        F: Fn(&Message) -> Result<Response> + Send + Sync + 'static,
    {
        Arc::make_mut(&mut self.dispatcher).register(variant, handler);
        self
    }

    /// Bind the listening socket now rather than on the first serve call.
    ///
    /// # Errors
    /// `Lifecycle` after shutdown, `ConcurrentUse` while serving.
    pub fn bind(&self) -> Result<()> {
        self.ensure_open()?;
        let mut endpoint = self
            .endpoint
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_SERVE_IN_PROGRESS))?;
        self.listener(&mut endpoint)?;
        Ok(())
    }

    /// Serve a single connection.
    ///
    /// Returns `Ok` after answering one request, after `recv_timeout` elapses
    /// with no request, or when a shutdown ends the wait for a connection.
    ///
    /// # Errors
    /// - `ConcurrentUse` if another serve call is running
    /// - `Lifecycle` after shutdown
    /// - `Authentication`, `MalformedPayload`, `StaleEnvelope`, `NoHandler`
    ///   after a `Fault` has been sent back to the client
    /// - `Handler` if the handler failed; the client gets no reply
    #[instrument(skip(self), fields(socket_path = %self.socket_path.display()))]
    pub async fn serve_once(&self, recv_timeout: Option<Duration>) -> Result<()> {
        self.ensure_open()?;
        let _forever = self
            .forever_lock
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_SERVE_IN_PROGRESS))?;
        let mut endpoint = self
            .endpoint
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_SERVE_IN_PROGRESS))?;
        self.ensure_open()?;

        let listener = self.listener(&mut endpoint)?;
        let _serving = ServingGuard::enter(&self.serving);
        let mut shutdown = self.shutdown_tx.subscribe();

        let stream = tokio::select! {
            _ = stop_requested(&mut shutdown) => {
                debug!("Shutdown requested while waiting for a connection");
                return Ok(());
            }
            accepted = listener.accept() => accepted?.0,
        };

        self.session().handle(stream, recv_timeout).await
    }

    /// Serve connections until [`shutdown`](Self::shutdown) is called.
    ///
    /// Failed request cycles are logged and serving continues. A handler error
    /// ends serving and is returned; a handler panic ends serving and resumes
    /// unwinding in the caller, in threaded mode after the other in-flight
    /// connections have finished.
    #[instrument(skip(self), fields(socket_path = %self.socket_path.display()))]
    pub async fn serve_forever(&self) -> Result<()> {
        self.ensure_open()?;
        let _forever = self
            .forever_lock
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_SERVE_IN_PROGRESS))?;
        let mut endpoint = self
            .endpoint
            .try_lock()
            .map_err(|_| ProtocolError::ConcurrentUse(constants::ERR_SERVE_IN_PROGRESS))?;
        self.ensure_open()?;

        let listener = self.listener(&mut endpoint)?;
        let _serving = ServingGuard::enter(&self.serving);
        let mut shutdown = self.shutdown_tx.subscribe();

        info!(
            threaded = self.config.threaded,
            recv_timeout_ms = self.config.recv_timeout.as_millis() as u64,
            "Serving requests"
        );

        let outcome = if self.config.threaded {
            self.serve_threaded(listener, &mut shutdown).await
        } else {
            self.serve_sequential(listener, &mut shutdown).await
        };

        match &outcome {
            Ok(()) => info!("Stopped serving"),
            Err(e) => error!(error = %e, "Serving terminated by handler failure"),
        }
        outcome
    }

    /// Stop serving, remove the socket file and close the server for good.
    ///
    /// Waits for a running serve call to notice and return. Calling it again
    /// once closed is a no-op.
    #[instrument(skip(self), fields(socket_path = %self.socket_path.display()))]
    pub async fn shutdown(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Ok(());
        }

        info!(state = %self.state(), "Shutting down server");
        self.shutdown_tx.send_replace(true);

        let _forever = self.forever_lock.lock().await;
        let mut endpoint = self.endpoint.lock().await;

        let unbound = match endpoint.take() {
            Some(listener) => {
                drop(listener);
                local::unbind(&self.socket_path)
            }
            None => Ok(()),
        };

        self.bound.store(false, Ordering::SeqCst);
        self.closed.store(true, Ordering::SeqCst);
        self.metrics.log_summary();
        unbound
    }

    async fn serve_sequential(
        &self,
        listener: &UnixListener,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let session = self.session();
        let recv_timeout = Some(self.config.recv_timeout);

        loop {
            if *shutdown.borrow() {
                return Ok(());
            }

            let stream = tokio::select! {
                _ = stop_requested(shutdown) => return Ok(()),
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => stream,
                    Err(e) => {
                        warn!(error = %e, "Failed to accept connection");
                        tokio::time::sleep(ACCEPT_BACKOFF).await;
                        continue;
                    }
                },
            };

            match session.handle(stream, recv_timeout).await {
                Ok(()) => {}
                Err(e) if e.terminates_serving() => return Err(e),
                Err(e) => warn!(error = %e, "Request cycle failed"),
            }
        }
    }

    async fn serve_threaded(
        &self,
        listener: &UnixListener,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<()> {
        let max_connections = self.config.max_connections;
        let recv_timeout = Some(self.config.recv_timeout);
        let mut tasks: JoinSet<Result<()>> = JoinSet::new();
        let mut halt = None;

        loop {
            if *shutdown.borrow() {
                break;
            }

            // At capacity the accept arm is disabled; finished tasks free a slot.
            tokio::select! {
                _ = stop_requested(shutdown) => break,
                Some(joined) = tasks.join_next() => {
                    if let Some(reason) = settle(joined) {
                        halt = Some(reason);
                        break;
                    }
                }
                accepted = listener.accept(), if tasks.len() < max_connections => {
                    let stream = match accepted {
                        Ok((stream, _)) => stream,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let session = self.session();
                    tasks.spawn(async move { session.handle(stream, recv_timeout).await });
                }
            }
        }

        debug!(in_flight = tasks.len(), "Waiting for connection tasks");
        while let Some(joined) = tasks.join_next().await {
            if let Some(reason) = settle(joined) {
                halt.get_or_insert(reason);
            }
        }

        match halt {
            Some(Halt::Failed(e)) => Err(e),
            Some(Halt::Panicked(payload)) => std::panic::resume_unwind(payload),
            None => Ok(()),
        }
    }

    fn session(&self) -> Session {
        Session {
            codec: Arc::clone(&self.codec),
            dispatcher: Arc::clone(&self.dispatcher),
            metrics: Arc::clone(&self.metrics),
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            Err(ProtocolError::Lifecycle(constants::ERR_SERVER_CLOSED))
        } else {
            Ok(())
        }
    }

    /// The bound listener, binding it first if needed.
    fn listener<'a>(&self, slot: &'a mut Option<UnixListener>) -> Result<&'a UnixListener> {
        let listener = match slot.take() {
            Some(listener) => listener,
            None => {
                let listener = local::bind(&self.socket_path)?;
                self.bound.store(true, Ordering::SeqCst);
                listener
            }
        };
        Ok(slot.insert(listener))
    }
}

/// Why a connection task ended threaded serving.
enum Halt {
    Failed(ProtocolError),
    /// A handler panicked. Re-raised once the other tasks have finished, as in
    /// sequential mode where the panic unwinds straight out of the serve call.
    Panicked(Box<dyn Any + Send + 'static>),
}

/// Log a finished connection task; return why serving must stop, if it must.
fn settle(joined: std::result::Result<Result<()>, JoinError>) -> Option<Halt> {
    match joined {
        Ok(Ok(())) => None,
        Ok(Err(e)) if e.terminates_serving() => Some(Halt::Failed(e)),
        Ok(Err(e)) => {
            warn!(error = %e, "Request cycle failed");
            None
        }
        Err(e) if e.is_panic() => {
            error!("Handler panicked in a connection task");
            Some(Halt::Panicked(e.into_panic()))
        }
        Err(e) => {
            warn!(error = %e, "Connection task did not complete");
            None
        }
    }
}

impl Drop for Server {
    fn drop(&mut self) {
        if self.bound.load(Ordering::SeqCst) && !self.closed.load(Ordering::SeqCst) {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                debug!(error = %e, "Socket cleanup on drop failed");
            }
        }
    }
}
