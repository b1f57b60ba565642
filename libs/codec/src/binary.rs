//! Bincode payload codec

use crate::codec::{PayloadCodec, HEADER_LEN};
use crate::error::{CodecError, Result};
use bincode::Options;
use bytes::{BufMut, Bytes, BytesMut};
use cell_types::Message;

/// Header of bincode encodings
pub const BINCODE_HEADER: [u8; HEADER_LEN] = [0xCE, 0x11, 0xB1, 0x01];

/// Compact binary encoding; the default payload codec
///
/// An optional size limit bounds both encoded and decoded payloads. Payloads
/// over the limit fail with a serialization error at the sender.
#[derive(Debug, Clone, Copy)]
pub struct BincodeCodec {
    limit: u64,
}

impl Default for BincodeCodec {
    fn default() -> Self {
        Self { limit: u64::MAX }
    }
}

impl BincodeCodec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_limit(limit: u64) -> Self {
        Self { limit }
    }

    fn options(&self) -> impl Options {
        bincode::DefaultOptions::new()
            .with_fixint_encoding()
            .with_limit(self.limit)
    }
}

impl PayloadCodec for BincodeCodec {
    fn name(&self) -> &'static str {
        "bincode"
    }

    fn header(&self) -> [u8; HEADER_LEN] {
        BINCODE_HEADER
    }

    fn encode(&self, message: &Message) -> Result<Bytes> {
        let mut buf = BytesMut::new().writer();
        buf.get_mut().put_slice(&BINCODE_HEADER);
        self.options()
            .serialize_into(&mut buf, message)
            .map_err(|e| CodecError::serialize(self.name(), e))?;
        Ok(buf.into_inner().freeze())
    }

    fn decode_body(&self, body: &[u8]) -> Result<Message> {
        self.options()
            .deserialize(body)
            .map_err(|e| CodecError::deserialize(self.name(), e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_prefix() {
        let codec = BincodeCodec::new();
        let bytes = codec.encode(&Message::text("hello")).unwrap();
        assert_eq!(&bytes[..HEADER_LEN], &BINCODE_HEADER);
        assert!(codec.is_encoded_with(&bytes));
        assert_eq!(codec.decode(&bytes).unwrap(), Message::text("hello"));
    }

    #[test]
    fn test_limit_rejects_large_payload() {
        let codec = BincodeCodec::with_limit(16);
        let err = codec.encode(&Message::Binary(vec![0u8; 64])).unwrap_err();
        assert!(err.is_serialization());
        assert!(codec.encode(&Message::Empty).is_ok());
    }

    #[test]
    fn test_garbage_body() {
        let codec = BincodeCodec::new();
        let mut bytes = BINCODE_HEADER.to_vec();
        bytes.extend_from_slice(&[0xff, 0xff, 0xff, 0xff, 0x01]);
        let err = codec.decode(&bytes).unwrap_err();
        assert_eq!(err.category(), "deserialize");
    }

    #[test]
    fn test_short_input() {
        let err = BincodeCodec::new().decode(&[0xCE, 0x11]).unwrap_err();
        assert!(matches!(err, CodecError::Truncated { need: 4, got: 2 }));
    }
}
