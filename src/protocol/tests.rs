// test-only module included via protocol/mod.rs
#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use crate::error::ProtocolError;
use crate::protocol::dispatcher::Dispatcher;
use crate::protocol::message::{Message, MessageKind, Payload, PayloadKind, Variant};
use crate::protocol::response::{Response, Status};

#[test]
fn test_ping_validation() {
    let ping = Message::ping();
    assert_eq!(ping.kind(), MessageKind::Ping);
    assert!(ping.payload().is_unit());

    assert!(ping.validate_response(&Response::simple(true)));
    assert!(!ping.validate_response(&Response::simple(false)));
}

#[test]
fn test_push_validation() {
    let push = Message::push("Hello, World!");
    assert_eq!(push.kind(), MessageKind::Push);
    assert_eq!(push.payload(), &Payload::Text("Hello, World!".into()));

    assert!(push.validate_response(&Response::simple(true)));
    assert!(!push.validate_response(&Response::simple(false)));
    // Push does not care what the ACK carries
    assert!(push.validate_response(&Response::ack("whatever")));
}

#[test]
fn test_query_validation_without_expected_kind() {
    let query = Message::query("SELECT * FROM users");
    assert_eq!(query.kind(), MessageKind::Query);

    assert!(query.validate_response(&Response::simple(true)));
    assert!(!query.validate_response(&Response::simple(false)));
    assert!(query.validate_response(&Response::ack(vec![Payload::from(1)])));
}

#[test]
fn test_query_validation_with_expected_kind() {
    let query = Message::query_expecting("SELECT count(*)", PayloadKind::Int);

    assert!(query.validate_response(&Response::new(Status::Ack, 73)));
    assert!(!query.validate_response(&Response::new(Status::Ack, "x")));
    assert!(!query.validate_response(&Response::new(Status::Nak, 73)));
    assert!(!query.validate_response(&Response::simple(true)));
    assert!(!query.validate_response(&Response::simple(false)));
}

#[test]
fn test_build_concrete_variants() {
    assert_eq!(
        Message::build(Variant::Ping, Payload::Unit).unwrap(),
        Message::Ping
    );
    assert_eq!(
        Message::build(Variant::Push, Payload::from(3)).unwrap(),
        Message::push(3)
    );
    assert_eq!(
        Message::build(Variant::Query, Payload::from("q")).unwrap(),
        Message::query("q")
    );
}

#[test]
fn test_build_abstract_variant_fails() {
    for variant in [Variant::Any, Variant::Payload] {
        let result = Message::build(variant, Payload::from(123));
        assert!(matches!(result, Err(ProtocolError::Construction(_))));
    }
}

#[test]
fn test_build_ping_with_payload_fails() {
    let result = Message::build(Variant::Ping, Payload::from("data"));
    assert!(matches!(result, Err(ProtocolError::Construction(_))));
}

#[test]
fn test_dispatch_exact_match() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Query, |msg| Ok(Response::ack(msg.payload().clone())));
    dispatcher.register(Variant::Ping, |_| Ok(Response::simple(true)));

    let response = dispatcher.dispatch(&Message::query("Hello!")).unwrap();
    assert_eq!(response, Response::ack("Hello!"));
    assert_eq!(dispatcher.route(&Message::ping()), Some(Variant::Ping));
}

#[test]
fn test_dispatch_prefers_exact_over_earlier_fallback() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Any, |_| Ok(Response::ack("any")));
    dispatcher.register(Variant::Push, |_| Ok(Response::ack("push")));

    let response = dispatcher.dispatch(&Message::push(1)).unwrap();
    assert_eq!(response.payload, Payload::from("push"));
}

#[test]
fn test_dispatch_fallback_uses_registration_order() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Payload, |_| Ok(Response::ack("payload")));
    dispatcher.register(Variant::Any, |_| Ok(Response::ack("any")));

    assert_eq!(dispatcher.route(&Message::query("q")), Some(Variant::Payload));
    assert_eq!(dispatcher.route(&Message::ping()), Some(Variant::Any));

    let mut reversed = Dispatcher::new();
    reversed.register(Variant::Any, |_| Ok(Response::ack("any")));
    reversed.register(Variant::Payload, |_| Ok(Response::ack("payload")));
    assert_eq!(reversed.route(&Message::query("q")), Some(Variant::Any));
}

#[test]
fn test_register_replaces_in_place() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Push, |_| Ok(Response::ack("first")));
    dispatcher.register(Variant::Query, |_| Ok(Response::ack("query")));
    dispatcher.register(Variant::Push, |_| Ok(Response::ack("second")));

    assert_eq!(dispatcher.variants(), vec![Variant::Push, Variant::Query]);
    let response = dispatcher.dispatch(&Message::push(0)).unwrap();
    assert_eq!(response.payload, Payload::from("second"));
}

#[test]
fn test_dispatch_without_match() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Payload, |_| Ok(Response::simple(true)));

    match dispatcher.dispatch(&Message::ping()) {
        Err(ProtocolError::NoHandler(MessageKind::Ping)) => {}
        other => panic!("expected NoHandler, got {other:?}"),
    }
    assert!(Dispatcher::new().is_empty());
}

#[test]
fn test_handler_error_is_wrapped() {
    let mut dispatcher = Dispatcher::new();
    dispatcher.register(Variant::Push, |_| {
        Err(ProtocolError::Custom("sensor offline".into()))
    });

    let err = dispatcher.dispatch(&Message::push(1)).unwrap_err();
    assert!(err.terminates_serving());
    assert!(err.to_string().contains("sensor offline"));
}
