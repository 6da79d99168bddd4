//! Responses and the reply frame the server seals around them.

use serde::{Deserialize, Serialize};

use crate::error::{constants, ProtocolError};
use crate::protocol::message::{MessageKind, Payload};

/// ACK means the message got across and was accepted. It says nothing about
/// whether the server-side work succeeded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Status {
    Ack,
    Nak,
}

impl From<bool> for Status {
    fn from(ok: bool) -> Self {
        if ok {
            Status::Ack
        } else {
            Status::Nak
        }
    }
}

/// A server's answer to a [`Message`](crate::protocol::message::Message).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub status: Status,
    pub payload: Payload,
}

impl Response {
    pub fn new(status: Status, payload: impl Into<Payload>) -> Self {
        Self {
            status,
            payload: payload.into(),
        }
    }

    pub fn ack(payload: impl Into<Payload>) -> Self {
        Self::new(Status::Ack, payload)
    }

    pub fn nak(payload: impl Into<Payload>) -> Self {
        Self::new(Status::Nak, payload)
    }

    /// A payload-less ACK or NAK, from a bool or a [`Status`].
    pub fn simple(status: impl Into<Status>) -> Self {
        Self::new(status.into(), Payload::Unit)
    }

    pub fn is_ack(&self) -> bool {
        self.status == Status::Ack
    }
}

/// Why a server refused to answer a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Fault {
    Unauthenticated,
    Malformed,
    Stale,
    NoHandler(MessageKind),
}

impl Fault {
    /// Classify a request-side failure, if the client should hear about it.
    pub fn for_error(err: &ProtocolError) -> Option<Self> {
        match err {
            ProtocolError::Authentication(_) => Some(Fault::Unauthenticated),
            ProtocolError::MalformedPayload(_) => Some(Fault::Malformed),
            ProtocolError::StaleEnvelope(_) => Some(Fault::Stale),
            ProtocolError::NoHandler(kind) => Some(Fault::NoHandler(*kind)),
            _ => None,
        }
    }

    /// The error a client reports when it receives this fault.
    pub fn into_error(self) -> ProtocolError {
        match self {
            Fault::Unauthenticated => {
                ProtocolError::Authentication(constants::ERR_REPLY_UNAUTHENTICATED.into())
            }
            Fault::Malformed => {
                ProtocolError::MalformedPayload("server could not decode the request".into())
            }
            Fault::Stale => {
                ProtocolError::StaleEnvelope("server rejected the request as stale".into())
            }
            Fault::NoHandler(kind) => ProtocolError::NoHandler(kind),
        }
    }
}

/// What the server seals and sends back on a connection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Reply {
    Answer(Response),
    Fault(Fault),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_simple_response() {
        assert_eq!(Response::simple(true).status, Status::Ack);
        assert_eq!(Response::simple(false).status, Status::Nak);
        assert_eq!(Response::simple(Status::Ack).status, Status::Ack);
        assert_eq!(Response::simple(Status::Nak).status, Status::Nak);
        assert!(Response::simple(true).payload.is_unit());
    }

    #[test]
    fn test_fault_round_trip_through_errors() {
        let err = ProtocolError::NoHandler(MessageKind::Push);
        let fault = Fault::for_error(&err).unwrap();
        assert!(matches!(
            fault.into_error(),
            ProtocolError::NoHandler(MessageKind::Push)
        ));

        assert_eq!(Fault::for_error(&ProtocolError::Timeout), None);
    }
}
