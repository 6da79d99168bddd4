//! # Transport Layer
//!
//! Local IPC over Unix domain sockets, framed with the packet codec.
//!
//! The client and server services sit on top of these helpers and never
//! touch raw streams directly.

pub mod local;
