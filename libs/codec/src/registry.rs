//! Codec Registry
//!
//! Holds the payload codecs a domain understands. Encoding always uses the
//! default codec; decoding picks the codec whose header the bytes start with,
//! so peers configured with different defaults still understand each other.
//! Bytes without a known header are handed whole to the default codec.

use crate::binary::BincodeCodec;
use crate::codec::PayloadCodec;
use crate::error::{CodecError, Result};
use crate::json::JsonCodec;
use bytes::Bytes;
use cell_types::Message;
use std::sync::Arc;

#[derive(Debug, Clone)]
pub struct CodecRegistry {
    codecs: Vec<Arc<dyn PayloadCodec>>,
    default_index: usize,
}

impl Default for CodecRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl CodecRegistry {
    /// Registry with a single codec, which becomes the default
    pub fn new(default: Arc<dyn PayloadCodec>) -> Self {
        Self {
            codecs: vec![default],
            default_index: 0,
        }
    }

    /// Bincode (default) and JSON
    pub fn with_defaults() -> Self {
        let mut registry = Self::new(Arc::new(BincodeCodec::new()));
        registry.register(Arc::new(JsonCodec));
        registry
    }

    /// Built-in codecs with the default chosen by name
    pub fn with_default_named(name: &str) -> Result<Self> {
        let mut registry = Self::with_defaults();
        registry.set_default(name)?;
        Ok(registry)
    }

    /// Add a codec; a codec with the same name is replaced
    pub fn register(&mut self, codec: Arc<dyn PayloadCodec>) {
        match self.codecs.iter().position(|c| c.name() == codec.name()) {
            Some(index) => self.codecs[index] = codec,
            None => self.codecs.push(codec),
        }
    }

    pub fn set_default(&mut self, name: &str) -> Result<()> {
        self.default_index = self
            .codecs
            .iter()
            .position(|c| c.name() == name)
            .ok_or_else(|| CodecError::UnknownCodec(name.to_string()))?;
        Ok(())
    }

    pub fn default_codec(&self) -> &Arc<dyn PayloadCodec> {
        &self.codecs[self.default_index]
    }

    pub fn by_name(&self, name: &str) -> Option<&Arc<dyn PayloadCodec>> {
        self.codecs.iter().find(|c| c.name() == name)
    }

    fn by_header(&self, bytes: &[u8]) -> Option<&Arc<dyn PayloadCodec>> {
        self.codecs.iter().find(|c| c.is_encoded_with(bytes))
    }

    /// Codec whose header `bytes` start with, or the default codec
    pub fn codec_for(&self, bytes: &[u8]) -> &Arc<dyn PayloadCodec> {
        self.by_header(bytes).unwrap_or_else(|| self.default_codec())
    }

    pub fn encode(&self, message: &Message) -> Result<Bytes> {
        self.default_codec().encode(message)
    }

    pub fn decode(&self, bytes: &[u8]) -> Result<Message> {
        match self.by_header(bytes) {
            Some(codec) => codec.decode(bytes),
            None => self.default_codec().decode_body(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_bincode() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.default_codec().name(), "bincode");
        assert!(registry.by_name("json").is_some());
    }

    #[test]
    fn test_decode_follows_header() {
        let json = CodecRegistry::with_default_named("json").unwrap();
        let bincode = CodecRegistry::with_defaults();

        let bytes = json.encode(&Message::text("cross")).unwrap();
        assert_eq!(bincode.codec_for(&bytes).name(), "json");
        assert_eq!(bincode.decode(&bytes).unwrap(), Message::text("cross"));
    }

    #[test]
    fn test_unknown_default() {
        let err = CodecRegistry::with_default_named("xml").unwrap_err();
        assert!(matches!(err, CodecError::UnknownCodec(name) if name == "xml"));
    }

    #[test]
    fn test_unknown_header_uses_default_codec() {
        let registry = CodecRegistry::default();
        assert_eq!(registry.codec_for(b"XXXXpayload").name(), "bincode");

        let err = registry.decode(b"XXXXpayload").unwrap_err();
        assert!(matches!(err, CodecError::Deserialize { codec: "bincode", .. }));
        assert!(!err.is_serialization());
    }

    #[test]
    fn test_headerless_body_decodes_with_default() {
        let encoded = BincodeCodec::new().encode(&Message::text("legacy")).unwrap();
        let body = &encoded[crate::codec::HEADER_LEN..];

        let registry = CodecRegistry::default();
        assert_eq!(registry.decode(body).unwrap(), Message::text("legacy"));

        let json_default = CodecRegistry::with_default_named("json").unwrap();
        let err = json_default.decode(body).unwrap_err();
        assert!(matches!(err, CodecError::Deserialize { codec: "json", .. }));
    }
}
