//! JSON payload codec

use crate::codec::{PayloadCodec, HEADER_LEN};
use crate::error::{CodecError, Result};
use bytes::{BufMut, Bytes, BytesMut};
use cell_types::Message;

/// Header of JSON encodings
pub const JSON_HEADER: [u8; HEADER_LEN] = [0xCE, 0x11, 0x15, 0x01];

/// Human-readable encoding, useful when inspecting traffic
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonCodec;

impl PayloadCodec for JsonCodec {
    fn name(&self) -> &'static str {
        "json"
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        JSON_HEADER
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        let mut buf = BytesMut::new().writer();
        buf.get_mut().put_slice(&JSON_HEADER);
        serde_json::to_writer(&mut buf, message).map_err(|e| CodecError::serialize(self.name(), e))?;
        Ok(buf.into_inner().freeze())
    }

    fn decode_body(&self, body: &[u8]) -> Result<Message> {
        serde_json::from_slice(body).map_err(|e| CodecError::deserialize(self.name(), e))
    }
}
