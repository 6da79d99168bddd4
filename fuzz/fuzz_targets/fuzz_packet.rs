#![no_main]

use bytes::BytesMut;
use libfuzzer_sys::fuzz_target;
use pvhotwater_ipc::core::codec::PacketCodec;
use pvhotwater_ipc::core::packet::Packet;
use tokio_util::codec::Decoder;

fuzz_target!(|data: &[u8]| {
    // Frame parsing must never panic, whatever the input
    let _ = Packet::from_bytes(data);

    let mut buf = BytesMut::from(data);
    let mut codec = PacketCodec;
    while let Ok(Some(_)) = codec.decode(&mut buf) {}
});
