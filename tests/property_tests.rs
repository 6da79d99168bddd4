//! Property-based tests using proptest
//!
//! These check the envelope and framing invariants across randomly
//! generated messages and byte strings.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::collections::BTreeMap;

use pvhotwater_ipc::config::PROTOCOL_VERSION;
use pvhotwater_ipc::core::envelope::{EnvelopeCodec, TAG_LEN};
use pvhotwater_ipc::core::packet::Packet;
use pvhotwater_ipc::protocol::message::{Message, Payload, PayloadKind};
use pvhotwater_ipc::{ProtocolError, SharedSecret};
use proptest::prelude::*;

const NOW: u64 = 1_700_000_000;

fn codec() -> EnvelopeCodec {
    EnvelopeCodec::new(SharedSecret::from("SuperSecret123"))
}

fn payload_strategy() -> impl Strategy<Value = Payload> {
    let leaf = prop_oneof![
        Just(Payload::Unit),
        any::<bool>().prop_map(Payload::Bool),
        any::<i64>().prop_map(Payload::Int),
        (-1.0e9f64..1.0e9).prop_map(Payload::Float),
        ".{0,64}".prop_map(Payload::Text),
        prop::collection::vec(any::<u8>(), 0..256).prop_map(Payload::Bytes),
    ];
    leaf.prop_recursive(3, 32, 4, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Payload::List),
            prop::collection::btree_map("[a-z]{1,8}", inner, 0..4)
                .prop_map(|m: BTreeMap<String, Payload>| Payload::Map(m)),
        ]
    })
}

fn message_strategy() -> impl Strategy<Value = Message> {
    let kinds = prop_oneof![
        Just(None),
        Just(Some(PayloadKind::Text)),
        Just(Some(PayloadKind::Float)),
        Just(Some(PayloadKind::Map)),
    ];
    prop_oneof![
        Just(Message::Ping),
        payload_strategy().prop_map(Message::Push),
        (payload_strategy(), kinds).prop_map(|(query, expects)| Message::Query { query, expects }),
    ]
}

// Property: every message survives sealing and opening unchanged
proptest! {
    #[test]
    fn prop_envelope_roundtrip(msg in message_strategy()) {
        let sealed = codec().encode_at(&msg, NOW).expect("Sealing should not fail");
        let opened: Message = codec().decode_at(&sealed, NOW).expect("Opening should not fail");
        prop_assert_eq!(opened, msg);
    }
}

// Property: flipping any single bit anywhere is an authentication failure
proptest! {
    #[test]
    fn prop_single_bit_flip_rejected(
        msg in message_strategy(),
        position in any::<prop::sample::Index>(),
        bit in 0u8..8,
    ) {
        let mut sealed = codec().encode_at(&msg, NOW).unwrap();
        let byte = position.index(sealed.len());
        sealed[byte] ^= 1 << bit;

        let result: Result<Message, ProtocolError> = codec().decode_at(&sealed, NOW);
        prop_assert!(matches!(result, Err(ProtocolError::Authentication(_))));
    }
}

// Property: a different secret never opens the envelope
proptest! {
    #[test]
    fn prop_other_secret_rejected(msg in message_strategy(), secret in "[A-Za-z0-9]{8,32}") {
        prop_assume!(secret != "SuperSecret123");
        let sealed = codec().encode_at(&msg, NOW).unwrap();
        let other = EnvelopeCodec::new(SharedSecret::from(secret.as_str()));

        let result: Result<Message, ProtocolError> = other.decode_at(&sealed, NOW);
        prop_assert!(matches!(result, Err(ProtocolError::Authentication(_))));
    }
}

// Property: arbitrary bytes never open and never panic
proptest! {
    #[test]
    fn prop_random_bytes_rejected(bytes in prop::collection::vec(any::<u8>(), 0..512)) {
        let result: Result<Message, ProtocolError> = codec().decode_at(&bytes, NOW);
        prop_assert!(matches!(result, Err(ProtocolError::Authentication(_))));
    }
}

// Property: sealed output is always the body plus a full tag
proptest! {
    #[test]
    fn prop_sealed_length_includes_tag(msg in message_strategy()) {
        let sealed = codec().encode_at(&msg, NOW).unwrap();
        prop_assert!(sealed.len() > TAG_LEN);
    }
}

// Property: any frame payload survives framing
proptest! {
    #[test]
    fn prop_packet_roundtrip(payload in prop::collection::vec(any::<u8>(), 0..10000)) {
        let packet = Packet { version: PROTOCOL_VERSION, payload: payload.clone() };

        let serialized = packet.to_bytes().expect("Payload within frame limit");
        let deserialized = Packet::from_bytes(&serialized).expect("Deserialization should not fail");

        prop_assert_eq!(deserialized.payload, payload);
    }
}
