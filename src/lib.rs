//! # pvhotwater-ipc
//!
//! Authenticated request/response messaging between the pvhotwater core
//! services over Unix domain sockets.
//!
//! A [`Client`] opens one connection per request, sends a sealed [`Message`]
//! and waits for a sealed reply. A [`Server`] accepts connections, opens each
//! request, routes it to a registered handler and seals the [`Response`] back.
//!
//! ## Wire format
//! ```text
//! [ "PVIP" (4) ][ version (1) ][ length (4, BE) ][ sealed envelope ]
//! sealed envelope = bincode{ body, bucket } ‖ HMAC-SHA3-256 tag (32)
//! ```
//! Tags are checked in constant time before any byte is deserialized.
//! Envelopes sealed more than one freshness bucket away from the receiver's
//! clock are rejected.
//!
//! ## Example
//! ```no_run
//! use pvhotwater_ipc::{Client, IpcConfig, Message, Response, Server, Variant};
//!
//! # async fn run() -> pvhotwater_ipc::Result<()> {
//! let config = IpcConfig::new("/tmp/pvhotwater/core.sock", "SuperSecret123");
//!
//! let mut server = Server::new(&config)?;
//! server.on_message(Variant::Query, |msg| Ok(Response::ack(msg.payload().clone())));
//!
//! let client = Client::new(&config)?;
//! let query = Message::query("Hello!");
//! let (served, answered) = tokio::join!(
//!     server.serve_once(None),
//!     client.request(&query),
//! );
//! served?;
//! assert_eq!(answered?.payload.as_text(), Some("Hello!"));
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod core;
pub mod error;
pub mod protocol;
#[cfg(unix)]
pub mod service;
#[cfg(unix)]
pub mod transport;
pub mod utils;

pub use crate::config::IpcConfig;
pub use crate::core::secret::SharedSecret;
pub use crate::error::{ProtocolError, Result};
pub use crate::protocol::message::{Message, MessageKind, Payload, PayloadKind, Variant};
pub use crate::protocol::response::{Response, Status};
#[cfg(unix)]
pub use crate::service::client::{Client, RequestOptions};
#[cfg(unix)]
pub use crate::service::server::{Server, ServerState};
