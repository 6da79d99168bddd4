//! # Message Protocol
//!
//! The request/response vocabulary spoken over the socket and the routing of
//! requests to application callbacks.
//!
//! ## Components
//! - **Message**: Ping, Push and Query requests, each with its own response rule
//! - **Response**: ACK/NAK status plus payload, and the sealed reply frame
//! - **Dispatcher**: ordered variant-to-handler table with fallback lookup
//!
//! ## Validation Rules
//! ```text
//! Ping   -> status == ACK
//! Push   -> status == ACK
//! Query  -> status == ACK && (no expected kind || payload kind == expected)
//! ```

pub mod dispatcher;
pub mod message;
pub mod response;

#[cfg(test)]
mod tests;
