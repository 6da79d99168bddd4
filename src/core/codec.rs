//! Tokio codec that frames [`Packet`]s over a byte stream.

use bytes::{Buf, BufMut, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

use crate::config::MAGIC_BYTES;
use crate::core::packet::{parse_header, wire_len, Packet, HEADER_SIZE};
use crate::error::{ProtocolError, Result};

#[derive(Debug, Clone, Copy, Default)]
pub struct PacketCodec;

impl Decoder for PacketCodec {
    type Item = Packet;
    type Error = ProtocolError;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Packet>> {
        let Some((version, len)) = parse_header(&src[..])? else {
            return Ok(None);
        };

        let frame_len = HEADER_SIZE + len;
        if src.len() < frame_len {
            src.reserve(frame_len - src.len());
            return Ok(None);
        }

        src.advance(HEADER_SIZE);
        let payload = src.split_to(len).to_vec();
        Ok(Some(Packet { version, payload }))
    }
}

impl Encoder<Packet> for PacketCodec {
    type Error = ProtocolError;

    fn encode(&mut self, packet: Packet, dst: &mut BytesMut) -> Result<()> {
        let len = wire_len(&packet.payload)?;

        dst.reserve(HEADER_SIZE + packet.payload.len());
        dst.put_slice(&MAGIC_BYTES);
        dst.put_u8(packet.version);
        dst.put_u32(len);
        dst.put_slice(&packet.payload);
        Ok(())
    }
}
