//! # Error Types
//!
//! Error handling for the IPC transport.
//!
//! Every fallible operation in the crate returns [`Result`], whose error side is
//! the single [`ProtocolError`] enum. Callers match on the variant to decide what
//! to do next, because the categories call for different reactions:
//!
//! - **Transport**: the server was never reached. The only retried category.
//! - **Authentication / MalformedPayload / StaleEnvelope**: bytes arrived but
//!   cannot be trusted or decoded. Never retried.
//! - **NoHandler**: the server was reached and authenticated the request but has
//!   no callback for it.
//! - **InvalidResponse**: the server answered, but the answer is wrong for the
//!   request that was sent.
//! - **ConcurrentUse / Lifecycle**: misuse of a client or server instance.
//!
//! ## Example Usage
//! ```rust
//! use pvhotwater_ipc::error::{ProtocolError, Result};
//! use pvhotwater_ipc::protocol::message::{Message, Variant};
//! use pvhotwater_ipc::protocol::message::Payload;
//!
//! fn build() -> Result<Message> {
//!     Message::build(Variant::Any, Payload::Unit)
//! }
//!
//! assert!(matches!(build(), Err(ProtocolError::Construction(_))));
//! ```

use std::io;
use thiserror::Error;

use crate::protocol::message::MessageKind;
use crate::protocol::response::Response;

/// Error message constants to reduce allocations in error paths.
pub mod constants {
    /// Envelope errors
    pub const ERR_TAG_MISMATCH: &str = "authentication tag mismatch; message discarded";
    pub const ERR_ENVELOPE_TRUNCATED: &str = "envelope shorter than its authentication tag";
    pub const ERR_REPLY_UNAUTHENTICATED: &str = "server could not authenticate the request";

    /// Lock and lifecycle errors
    pub const ERR_REQUEST_IN_FLIGHT: &str = "a request is already in flight on this client";
    pub const ERR_SERVE_IN_PROGRESS: &str = "the server is already serving";
    pub const ERR_CLIENT_BUSY_CLOSE: &str = "client cannot be closed while a request is underway";
    pub const ERR_CLIENT_CLOSED: &str = "client has been closed";
    pub const ERR_SERVER_CLOSED: &str = "server has been shut down; create a new instance";

    /// Construction errors
    pub const ERR_ABSTRACT_VARIANT: &str = "cannot construct a message from an abstract variant";
    pub const ERR_PING_PAYLOAD: &str = "ping messages carry no payload";

    /// Clock errors
    pub const ERR_SYSTEM_TIME: &str = "System time error: time went backwards";
}

/// ProtocolError is the primary error type for all IPC operations
#[derive(Error, Debug)]
pub enum ProtocolError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    /// The authentication tag did not verify; the bytes were never deserialized.
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// The tag verified but the envelope could not be decoded.
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),

    /// The tag verified but the envelope was sealed outside the freshness window.
    #[error("Stale envelope: {0}")]
    StaleEnvelope(String),

    /// Connection-level failure that persisted through every attempt.
    #[error("Transport error after {attempts} attempt(s): {source}")]
    Transport {
        attempts: u32,
        #[source]
        source: io::Error,
    },

    #[error("No response received from server")]
    NoResponse,

    /// The response was well-formed but rejected by the message's own validator.
    #[error("Invalid response: {0:?}")]
    InvalidResponse(Response),

    #[error("No handler registered for {0} messages")]
    NoHandler(MessageKind),

    /// A registered handler failed. This ends `serve_forever`.
    #[error("Handler failed: {0}")]
    Handler(Box<ProtocolError>),

    #[error("Concurrent use: {0}")]
    ConcurrentUse(&'static str),

    #[error("Lifecycle error: {0}")]
    Lifecycle(&'static str),

    #[error("Construction error: {0}")]
    Construction(&'static str),

    #[error("Connection closed")]
    ConnectionClosed,

    #[error("Timeout occurred")]
    Timeout,

    #[error("Invalid protocol header")]
    InvalidHeader,

    #[error("Unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    #[error("Packet too large: {0} bytes")]
    OversizedPacket(usize),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Custom error: {0}")]
    Custom(String),
}

impl ProtocolError {
    /// Whether a client should try the request again on a fresh connection.
    ///
    /// Only connection-level I/O failures qualify. Authentication and decoding
    /// failures would fail the same way again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ProtocolError::Io(_))
    }

    /// Whether this error ends a `serve_forever` loop instead of just the
    /// current request cycle.
    pub fn terminates_serving(&self) -> bool {
        matches!(self, ProtocolError::Handler(_))
    }
}

/// Type alias for Results using ProtocolError
pub type Result<T> = std::result::Result<T, ProtocolError>;
