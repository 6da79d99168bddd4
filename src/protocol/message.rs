//! Request messages and the payload values they carry.
//!
//! The set of request shapes is closed: [`Message::Ping`], [`Message::Push`] and
//! [`Message::Query`]. Each one knows how to judge the [`Response`] it gets back
//! through [`Message::validate_response`].

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{constants, ProtocolError, Result};
use crate::protocol::response::{Response, Status};

/// A self-describing application value.
///
/// The transport does not interpret payloads. It only needs to know their
/// [`PayloadKind`] so a query can check the shape of its answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub enum Payload {
    #[default]
    Unit,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(Vec<u8>),
    List(Vec<Payload>),
    Map(BTreeMap<String, Payload>),
}

/// The shape of a [`Payload`], without its contents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PayloadKind {
    Unit,
    Bool,
    Int,
    Float,
    Text,
    Bytes,
    List,
    Map,
}

impl Payload {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Payload::Unit => PayloadKind::Unit,
            Payload::Bool(_) => PayloadKind::Bool,
            Payload::Int(_) => PayloadKind::Int,
            Payload::Float(_) => PayloadKind::Float,
            Payload::Text(_) => PayloadKind::Text,
            Payload::Bytes(_) => PayloadKind::Bytes,
            Payload::List(_) => PayloadKind::List,
            Payload::Map(_) => PayloadKind::Map,
        }
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Payload::Unit)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Payload::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<()> for Payload {
    fn from(_: ()) -> Self {
        Payload::Unit
    }
}

impl From<bool> for Payload {
    fn from(v: bool) -> Self {
        Payload::Bool(v)
    }
}

impl From<i64> for Payload {
    fn from(v: i64) -> Self {
        Payload::Int(v)
    }
}

impl From<i32> for Payload {
    fn from(v: i32) -> Self {
        Payload::Int(i64::from(v))
    }
}

impl From<u32> for Payload {
    fn from(v: u32) -> Self {
        Payload::Int(i64::from(v))
    }
}

impl From<f64> for Payload {
    fn from(v: f64) -> Self {
        Payload::Float(v)
    }
}

impl From<&str> for Payload {
    fn from(v: &str) -> Self {
        Payload::Text(v.to_owned())
    }
}

impl From<String> for Payload {
    fn from(v: String) -> Self {
        Payload::Text(v)
    }
}

impl From<Vec<u8>> for Payload {
    fn from(v: Vec<u8>) -> Self {
        Payload::Bytes(v)
    }
}

impl From<Vec<Payload>> for Payload {
    fn from(v: Vec<Payload>) -> Self {
        Payload::List(v)
    }
}

impl From<BTreeMap<String, Payload>> for Payload {
    fn from(v: BTreeMap<String, Payload>) -> Self {
        Payload::Map(v)
    }
}

impl TryFrom<Payload> for String {
    type Error = Payload;

    fn try_from(value: Payload) -> std::result::Result<Self, Self::Error> {
        match value {
            Payload::Text(s) => Ok(s),
            other => Err(other),
        }
    }
}

impl TryFrom<Payload> for i64 {
    type Error = Payload;

    fn try_from(value: Payload) -> std::result::Result<Self, Self::Error> {
        match value {
            Payload::Int(v) => Ok(v),
            other => Err(other),
        }
    }
}

impl TryFrom<Payload> for bool {
    type Error = Payload;

    fn try_from(value: Payload) -> std::result::Result<Self, Self::Error> {
        match value {
            Payload::Bool(v) => Ok(v),
            other => Err(other),
        }
    }
}

/// Discriminant of a concrete [`Message`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MessageKind {
    Ping,
    Push,
    Query,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MessageKind::Ping => "PING",
            MessageKind::Push => "PUSH",
            MessageKind::Query => "QUERY",
        };
        f.write_str(name)
    }
}

/// Selector used when registering handlers.
///
/// The concrete variants match exactly one [`MessageKind`]. `Payload` and `Any`
/// are abstract: they cover several kinds and only act as fallbacks when no
/// exact registration exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    Ping,
    Push,
    Query,
    /// Any message carrying an application payload (Push or Query).
    Payload,
    /// Every message.
    Any,
}

impl Variant {
    /// Whether a handler registered under this variant may answer `kind`.
    pub fn covers(self, kind: MessageKind) -> bool {
        match self {
            Variant::Any => true,
            Variant::Payload => matches!(kind, MessageKind::Push | MessageKind::Query),
            concrete => concrete == Variant::from(kind),
        }
    }

    pub fn is_abstract(self) -> bool {
        matches!(self, Variant::Payload | Variant::Any)
    }
}

impl From<MessageKind> for Variant {
    fn from(kind: MessageKind) -> Self {
        match kind {
            MessageKind::Ping => Variant::Ping,
            MessageKind::Push => Variant::Push,
            MessageKind::Query => Variant::Query,
        }
    }
}

/// A request sent from a client to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Message {
    /// Liveness check; expects a bare ACK.
    Ping,
    /// Drops off a payload; expects ACK or NAK with no particular payload.
    Push(Payload),
    /// Asks for something back, optionally of a declared shape.
    Query {
        query: Payload,
        expects: Option<PayloadKind>,
    },
}

impl Message {
    pub fn ping() -> Self {
        Message::Ping
    }

    pub fn push(payload: impl Into<Payload>) -> Self {
        Message::Push(payload.into())
    }

    pub fn query(query: impl Into<Payload>) -> Self {
        Message::Query {
            query: query.into(),
            expects: None,
        }
    }

    /// A query whose answer must carry a payload of the given kind.
    pub fn query_expecting(query: impl Into<Payload>, expects: PayloadKind) -> Self {
        Message::Query {
            query: query.into(),
            expects: Some(expects),
        }
    }

    /// Build a message from a registration variant and a payload.
    ///
    /// # Errors
    /// Returns [`ProtocolError::Construction`] for abstract variants, which name
    /// a family of messages rather than one shape, and for a ping carrying data.
    pub fn build(variant: Variant, payload: Payload) -> Result<Self> {
        match variant {
            Variant::Ping if payload.is_unit() => Ok(Message::Ping),
            Variant::Ping => Err(ProtocolError::Construction(constants::ERR_PING_PAYLOAD)),
            Variant::Push => Ok(Message::Push(payload)),
            Variant::Query => Ok(Message::Query {
                query: payload,
                expects: None,
            }),
            Variant::Payload | Variant::Any => {
                Err(ProtocolError::Construction(constants::ERR_ABSTRACT_VARIANT))
            }
        }
    }

    pub fn kind(&self) -> MessageKind {
        match self {
            Message::Ping => MessageKind::Ping,
            Message::Push(_) => MessageKind::Push,
            Message::Query { .. } => MessageKind::Query,
        }
    }

    /// The payload carried by this message. Pings carry [`Payload::Unit`].
    pub fn payload(&self) -> &Payload {
        const UNIT: &Payload = &Payload::Unit;
        match self {
            Message::Ping => UNIT,
            Message::Push(payload) => payload,
            Message::Query { query, .. } => query,
        }
    }

    /// Returns true if `response` is an acceptable answer to this message.
    pub fn validate_response(&self, response: &Response) -> bool {
        match self {
            Message::Ping | Message::Push(_) => response.status == Status::Ack,
            Message::Query { expects, .. } => {
                response.status == Status::Ack
                    && expects.map_or(true, |kind| response.payload.kind() == kind)
            }
        }
    }
}
