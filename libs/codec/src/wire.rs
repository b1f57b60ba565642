//! Wire Framing
//!
//! Envelopes cross process or domain boundaries as length-prefixed frames:
//!
//! ```text
//! ┌──────────────┬──────────────────────────────────────────┐
//! │ length: u32  │ bincode(Envelope) with encoded payload   │
//! │ big endian   │                                          │
//! └──────────────┴──────────────────────────────────────────┘
//! ```
//!
//! Only encoded envelopes may be framed. The local arrival time is not
//! transmitted; decoding restarts the local age clock.

use crate::envelope::require_encoded;
use crate::error::{CodecError, Result};
use bytes::{Buf, BufMut, Bytes, BytesMut};
use cell_types::Envelope;

/// Size of the length prefix
pub const FRAME_HEADER_LEN: usize = 4;

pub fn encode_wire(envelope: &Envelope) -> Result<Bytes> {
    require_encoded(envelope)?;
    let body = bincode::serialize(envelope).map_err(|e| CodecError::serialize("wire", e))?;
    let len = u32::try_from(body.len())
        .map_err(|_| CodecError::serialize("wire", format!("frame of {} bytes too large", body.len())))?;

    let mut frame = BytesMut::with_capacity(FRAME_HEADER_LEN + body.len());
    frame.put_u32(len);
    frame.put_slice(&body);
    Ok(frame.freeze())
}

pub fn decode_wire(frame: &[u8]) -> Result<Envelope> {
    if frame.len() < FRAME_HEADER_LEN {
        return Err(CodecError::Truncated {
            need: FRAME_HEADER_LEN,
            got: frame.len(),
        });
    }
    let mut header = &frame[..FRAME_HEADER_LEN];
    let len = header.get_u32() as usize;
    let body = &frame[FRAME_HEADER_LEN..];
    if body.len() < len {
        return Err(CodecError::Truncated {
            need: FRAME_HEADER_LEN + len,
            got: frame.len(),
        });
    }

    let mut envelope: Envelope =
        bincode::deserialize(&body[..len]).map_err(|e| CodecError::deserialize("wire", e))?;
    require_encoded(&envelope)?;
    envelope.mark_received();
    Ok(envelope)
}
