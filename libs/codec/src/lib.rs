//! # Cell Payload Codecs
//!
//! ## Purpose
//!
//! The encoding layer of the kernel:
//! - [`PayloadCodec`]: message to self-describing bytes and back
//! - [`BincodeCodec`] (default) and [`JsonCodec`]
//! - [`CodecRegistry`]: header-driven codec selection
//! - [`EnvelopeCodecExt`]: live/encoded payload transitions on envelopes
//! - [`wire`]: length-prefixed envelope frames for tunnels
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/actors
//!     ↑           ↓            ↓
//! Envelope   Payload bytes  Routing and
//! Message    Wire frames    delivery
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Routing decisions or delivery (belongs in libs/actors)
//! - Socket handling; tunnels own their transport

pub mod binary;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod json;
pub mod registry;
pub mod wire;

pub use binary::{BincodeCodec, BINCODE_HEADER};
pub use codec::{PayloadCodec, HEADER_LEN};
pub use envelope::{require_encoded, EnvelopeCodecExt};
pub use error::{CodecError, Result};
pub use json::{JsonCodec, JSON_HEADER};
pub use registry::CodecRegistry;
pub use wire::{decode_wire, encode_wire};
