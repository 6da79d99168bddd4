#![no_main]

use libfuzzer_sys::fuzz_target;
use pvhotwater_ipc::core::envelope::EnvelopeCodec;
use pvhotwater_ipc::protocol::response::Reply;
use pvhotwater_ipc::{Message, SharedSecret};

fuzz_target!(|data: &[u8]| {
    let codec = EnvelopeCodec::new(SharedSecret::from("fuzz-secret"));

    // Forged input must never authenticate
    assert!(codec.decode::<Message>(data).is_err());
    let _ = codec.decode::<Reply>(data);
});
