//! # Services
//!
//! The client and server that exchange sealed requests over the local socket.
//!
//! - [`client::Client`] sends one [`Message`](crate::protocol::message::Message)
//!   per connection and retries connection failures
//! - [`server::Server`] accepts connections and routes each request through
//!   its [`Dispatcher`](crate::protocol::dispatcher::Dispatcher)

pub mod client;
pub(crate) mod sealed;
pub mod server;
