//! Message payloads
//!
//! [`Message`] is the closed set of payloads cells exchange. Application data
//! travels as [`Message::Structured`]: a kind tag plus a JSON body, so the
//! outer enum stays encodable by every payload codec while cells still work
//! with their own serde types.
//!
//! Errors travel as [`Message::Error`] carrying a [`RemoteError`]. A reply
//! whose payload is an error is delivered to waiters as a failure.

use crate::uoid::Uoid;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Acknowledgement with no content
    Empty,
    Text(String),
    Binary(Vec<u8>),
    /// Application payload: `kind` names the type, `body` is its JSON encoding
    Structured { kind: String, body: Vec<u8> },
    Ping { sequence: u64, sent_at_ms: u64 },
    Pong { sequence: u64, sent_at_ms: u64 },
    Error(RemoteError),
}

impl Message {
    pub fn text(text: impl Into<String>) -> Self {
        Message::Text(text.into())
    }

    /// Wrap a serde value as a structured payload
    pub fn structured<T: Serialize>(
        kind: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Message::Structured {
            kind: kind.into(),
            body: serde_json::to_vec(value)?,
        })
    }

    /// Decode a structured payload; `None` for every other variant
    pub fn parse_structured<T: DeserializeOwned>(&self) -> Option<Result<T, serde_json::Error>> {
        match self {
            Message::Structured { body, .. } => Some(serde_json::from_slice(body)),
            _ => None,
        }
    }

    /// Short name of the variant, or the kind of a structured payload
    pub fn kind(&self) -> &str {
        match self {
            Message::Empty => "empty",
            Message::Text(_) => "text",
            Message::Binary(_) => "binary",
            Message::Structured { kind, .. } => kind,
            Message::Ping { .. } => "ping",
            Message::Pong { .. } => "pong",
            Message::Error(_) => "error",
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, Message::Error(_))
    }

    pub fn as_error(&self) -> Option<&RemoteError> {
        match self {
            Message::Error(error) => Some(error),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Message::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Category of an error carried across domains
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RemoteErrorKind {
    /// The destination could not be resolved
    NoRoute,
    /// The payload could not be encoded
    Serialization,
    /// The payload could not be decoded at the receiver
    Deserialization,
    /// The receiving handler failed
    ActorPanic,
    /// The request expired before it was answered
    Timeout,
    /// Raised by application code
    Application,
}

impl fmt::Display for RemoteErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RemoteErrorKind::NoRoute => "no_route",
            RemoteErrorKind::Serialization => "serialization",
            RemoteErrorKind::Deserialization => "deserialization",
            RemoteErrorKind::ActorPanic => "actor_panic",
            RemoteErrorKind::Timeout => "timeout",
            RemoteErrorKind::Application => "application",
        };
        f.write_str(name)
    }
}

/// Error reply payload
///
/// `uoid` and `path` identify the envelope that failed, so the original
/// sender can tell which request the error belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteError {
    pub kind: RemoteErrorKind,
    pub message: String,
    pub uoid: Option<Uoid>,
    pub path: Option<String>,
}

impl RemoteError {
    pub fn new(kind: RemoteErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            uoid: None,
            path: None,
        }
    }

    pub fn no_route(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::NoRoute, message)
    }

    pub fn application(message: impl Into<String>) -> Self {
        Self::new(RemoteErrorKind::Application, message)
    }

    /// Attach the failed envelope's id and destination path
    pub fn for_envelope(mut self, uoid: Uoid, path: impl Into<String>) -> Self {
        self.uoid = Some(uoid);
        self.path = Some(path.into());
        self
    }
}

impl fmt::Display for RemoteError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (path {path})")?;
        }
        Ok(())
    }
}

impl std::error::Error for RemoteError {}

impl From<RemoteError> for Message {
    fn from(error: RemoteError) -> Self {
        Message::Error(error)
    }
}
