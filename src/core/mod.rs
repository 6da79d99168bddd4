//! # Core Envelope Components
//!
//! Everything between a Rust value and the bytes on the socket: the shared
//! secret, the authenticated envelope, its pinned serialization and the frame
//! that carries it over a stream.
//!
//! ## Components
//! - **Secret**: zeroizing pre-shared key
//! - **Envelope**: HMAC-SHA3-256 sealing with a coarse freshness bucket
//! - **Serialization**: pinned bincode options shared by both ends
//! - **Packet / Codec**: length-prefixed framing for Tokio streams
//!
//! ## Wire Format
//! ```text
//! [Magic(4)] [Version(1)] [Length(4)] [ wire(body, bucket) | tag(32) ]
//! ```
//!
//! ## Security
//! - The tag is verified in constant time before deserialization
//! - Maximum frame payload: 16MB, checked before allocation

pub mod codec;
pub mod envelope;
pub mod packet;
pub mod secret;
pub mod serialization;
