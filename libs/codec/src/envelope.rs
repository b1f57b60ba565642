//! Payload mode transitions on envelopes

use crate::error::{CodecError, Result};
use crate::registry::CodecRegistry;
use cell_types::{Envelope, Message, Payload};

/// Moves an envelope's payload between live and encoded mode
pub trait EnvelopeCodecExt {
    /// Live to encoded; a no-op for encoded payloads
    fn encode_payload(&mut self, codecs: &CodecRegistry) -> Result<()>;

    /// Encoded to live; a no-op for live payloads
    ///
    /// On failure the payload stays encoded.
    fn decode_payload(&mut self, codecs: &CodecRegistry) -> Result<()>;

    /// Decoded copy of the payload, leaving the envelope untouched
    fn peek_message(&self, codecs: &CodecRegistry) -> Result<Message>;
}

impl EnvelopeCodecExt for Envelope {
    fn encode_payload(&mut self, codecs: &CodecRegistry) -> Result<()> {
        if let Payload::Live(message) = self.payload() {
            let bytes = codecs.encode(message)?;
            self.set_payload(Payload::Encoded(bytes));
        }
        Ok(())
    }

    fn decode_payload(&mut self, codecs: &CodecRegistry) -> Result<()> {
        if let Payload::Encoded(bytes) = self.payload() {
            let message = codecs.decode(bytes)?;
            self.set_payload(Payload::Live(message));
        }
        Ok(())
    }

    fn peek_message(&self, codecs: &CodecRegistry) -> Result<Message> {
        match self.payload() {
            Payload::Live(message) => Ok(message.clone()),
            Payload::Encoded(bytes) => codecs.decode(bytes),
        }
    }
}

/// Fail with [`CodecError::InvalidMode`] unless the payload is encoded
pub fn require_encoded(envelope: &Envelope) -> Result<()> {
    if envelope.is_encoded() {
        Ok(())
    } else {
        Err(CodecError::InvalidMode {
            expected: "encoded",
            actual: "live",
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cell_types::Address;

    #[test]
    fn test_mode_transitions() {
        let codecs = CodecRegistry::default();
        let mut env = Envelope::to(Address::local("a"), Message::text("payload"));

        env.encode_payload(&codecs).unwrap();
        assert!(env.is_encoded());
        assert_eq!(env.peek_message(&codecs).unwrap(), Message::text("payload"));

        // encoding twice keeps the same bytes
        let bytes = env.encoded().cloned();
        env.encode_payload(&codecs).unwrap();
        assert_eq!(env.encoded().cloned(), bytes);

        env.decode_payload(&codecs).unwrap();
        assert_eq!(env.message(), Some(&Message::text("payload")));
    }

    #[test]
    fn test_failed_decode_keeps_bytes() {
        let codecs = CodecRegistry::default();
        let mut env = Envelope::to(Address::local("a"), Message::Empty);
        env.set_payload(Payload::Encoded(bytes::Bytes::from_static(b"\xCE\x11\xB1\x01\xff\xff\xff\xff")));

        assert!(env.decode_payload(&codecs).is_err());
        assert!(env.is_encoded());
    }
}
