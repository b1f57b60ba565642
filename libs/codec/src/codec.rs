//! Payload Codec Trait
//!
//! A payload codec turns a [`Message`] into self-describing bytes and back.
//! Every encoding starts with the codec's 4-byte header so the receiver can
//! pick the matching codec without out-of-band negotiation.

use crate::error::{CodecError, Result};
use bytes::Bytes;
use cell_types::Message;
use std::fmt;

/// Length of the header every encoding starts with
pub const HEADER_LEN: usize = 4;

pub trait PayloadCodec: Send + Sync + fmt::Debug {
    /// Short name used in configuration and logs
    fn name(&self) -> &'static str;

    /// Leading bytes of every encoding this codec produces
    fn header(&self) -> [u8; HEADER_LEN];

    /// Encode a message, header included
    fn encode(&self, message: &Message) -> Result<Bytes>;

    /// Decode a body with the header already stripped
    fn decode_body(&self, body: &[u8]) -> Result<Message>;

    /// Decode bytes produced by [`PayloadCodec::encode`]
    fn decode(&self, bytes: &[u8]) -> Result<Message> {
        self.decode_body(split_header(self, bytes)?)
    }

    fn is_encoded_with(&self, bytes: &[u8]) -> bool {
        bytes.len() >= HEADER_LEN && bytes[..HEADER_LEN] == self.header()
    }
}

/// Strip and check the header; returns the body
pub(crate) fn split_header<'a, C: PayloadCodec + ?Sized>(codec: &C, bytes: &'a [u8]) -> Result<&'a [u8]> {
    if bytes.len() < HEADER_LEN {
        return Err(CodecError::Truncated {
            need: HEADER_LEN,
            got: bytes.len(),
        });
    }
    let (header, body) = bytes.split_at(HEADER_LEN);
    if header != codec.header() {
        return Err(CodecError::UnknownHeader {
            header: header.to_vec(),
        });
    }
    Ok(body)
}
