//! Codec errors
//!
//! Every failure to turn a payload into bytes or back surfaces as a
//! [`CodecError`]. The serialize side is reported to the sender directly; the
//! deserialize side is reported to the original sender as a malformed-message
//! error reply by the runtime.

use cell_types::RemoteErrorKind;
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum CodecError {
    /// Payload could not be encoded
    #[error("Failed to serialize payload with {codec}: {source}")]
    Serialize {
        codec: &'static str,
        #[source]
        source: BoxError,
    },

    /// Bytes could not be decoded into a payload
    #[error("Failed to deserialize payload with {codec}: {source}")]
    Deserialize {
        codec: &'static str,
        #[source]
        source: BoxError,
    },

    /// No registered codec recognizes the leading header
    #[error("Unknown payload header {header:02x?}")]
    UnknownHeader { header: Vec<u8> },

    /// Input ended before a complete header or frame
    #[error("Truncated input: need {need} bytes, got {got}")]
    Truncated { need: usize, got: usize },

    /// Envelope payload is not in the mode the operation requires
    #[error("Envelope payload is {actual}, expected {expected}")]
    InvalidMode {
        expected: &'static str,
        actual: &'static str,
    },

    /// Configured codec name is not registered
    #[error("No payload codec named '{0}'")]
    UnknownCodec(String),
}

impl CodecError {
    pub fn serialize(codec: &'static str, source: impl Into<BoxError>) -> Self {
        CodecError::Serialize {
            codec,
            source: source.into(),
        }
    }

    pub fn deserialize(codec: &'static str, source: impl Into<BoxError>) -> Self {
        CodecError::Deserialize {
            codec,
            source: source.into(),
        }
    }

    /// True for failures on the encoding side
    pub fn is_serialization(&self) -> bool {
        matches!(self, CodecError::Serialize { .. } | CodecError::UnknownCodec(_))
    }

    /// Error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            CodecError::Serialize { .. } => "serialize",
            CodecError::Deserialize { .. } => "deserialize",
            CodecError::UnknownHeader { .. } => "header",
            CodecError::Truncated { .. } => "truncated",
            CodecError::InvalidMode { .. } => "mode",
            CodecError::UnknownCodec(_) => "config",
        }
    }

    /// Kind to report when this error crosses a domain boundary
    pub fn remote_kind(&self) -> RemoteErrorKind {
        if self.is_serialization() {
            RemoteErrorKind::Serialization
        } else {
            RemoteErrorKind::Deserialization
        }
    }
}

pub type Result<T> = std::result::Result<T, CodecError>;
