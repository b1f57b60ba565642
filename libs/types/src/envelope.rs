//! Envelopes
//!
//! An [`Envelope`] is the unit the kernel routes: a unique id, the id of the
//! request it answers, a source and a destination [`CellPath`], a time to
//! live, and a payload.
//!
//! # Payload Modes
//!
//! The payload is either **live** (a [`Message`] value the sending cell just
//! built or the receiving cell is about to read) or **encoded** (opaque bytes
//! produced by a payload codec). The first send of an envelope moves it from
//! live to encoded; delivery to a cell moves it back. Routed deliveries and
//! the wire form always carry the encoded mode.

use crate::address::Address;
use crate::message::Message;
use crate::path::CellPath;
use crate::uoid::Uoid;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// TTL value meaning "never expires"
pub const INFINITE_TTL_MS: u64 = u64::MAX;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Payload {
    Live(Message),
    Encoded(Bytes),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    uoid: Uoid,
    last_uoid: Option<Uoid>,
    source: CellPath,
    destination: CellPath,
    payload: Payload,
    ttl_ms: u64,
    is_reply: bool,
    session: Option<String>,
    #[serde(skip, default = "Instant::now")]
    received_at: Instant,
}

impl Envelope {
    /// New live envelope with a fresh id, an empty source path and no TTL
    pub fn new(destination: CellPath, message: Message) -> Self {
        Self {
            uoid: Uoid::new(),
            last_uoid: None,
            source: CellPath::new(),
            destination,
            payload: Payload::Live(message),
            ttl_ms: INFINITE_TTL_MS,
            is_reply: false,
            session: None,
            received_at: Instant::now(),
        }
    }

    /// Envelope for a single-hop destination
    pub fn to(destination: Address, message: Message) -> Self {
        Self::new(CellPath::from_address(destination), message)
    }

    pub fn uoid(&self) -> Uoid {
        self.uoid
    }

    /// Id of the request this envelope answers
    pub fn last_uoid(&self) -> Option<Uoid> {
        self.last_uoid
    }

    pub fn set_last_uoid(&mut self, uoid: Uoid) {
        self.last_uoid = Some(uoid);
    }

    pub fn source_path(&self) -> &CellPath {
        &self.source
    }

    pub fn source_path_mut(&mut self) -> &mut CellPath {
        &mut self.source
    }

    pub fn destination_path(&self) -> &CellPath {
        &self.destination
    }

    pub fn destination_path_mut(&mut self) -> &mut CellPath {
        &mut self.destination
    }

    /// Record one more hop the envelope travelled through
    pub fn add_source_address(&mut self, address: Address) {
        self.source.add(address);
    }

    pub fn is_reply(&self) -> bool {
        self.is_reply
    }

    pub fn set_reply(&mut self, is_reply: bool) {
        self.is_reply = is_reply;
    }

    pub fn session(&self) -> Option<&str> {
        self.session.as_deref()
    }

    pub fn set_session(&mut self, session: impl Into<String>) {
        self.session = Some(session.into());
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn ttl_ms(&self) -> u64 {
        self.ttl_ms
    }

    pub fn set_ttl(&mut self, ttl: Duration) {
        self.ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(INFINITE_TTL_MS);
    }

    pub fn has_ttl(&self) -> bool {
        self.ttl_ms != INFINITE_TTL_MS
    }

    /// Time since the envelope arrived in this process
    pub fn local_age(&self) -> Duration {
        self.received_at.elapsed()
    }

    /// Restart the local age clock
    pub fn mark_received(&mut self) {
        self.received_at = Instant::now();
    }

    /// True once the local age exceeds a finite TTL
    pub fn is_expired(&self) -> bool {
        self.has_ttl() && self.local_age() > self.ttl()
    }

    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    pub fn set_payload(&mut self, payload: Payload) {
        self.payload = payload;
    }

    /// Replace the payload with a live message
    pub fn set_message(&mut self, message: Message) {
        self.payload = Payload::Live(message);
    }

    /// Live message, if the payload is decoded
    pub fn message(&self) -> Option<&Message> {
        match &self.payload {
            Payload::Live(message) => Some(message),
            Payload::Encoded(_) => None,
        }
    }

    /// Encoded bytes, if the payload is encoded
    pub fn encoded(&self) -> Option<&Bytes> {
        match &self.payload {
            Payload::Encoded(bytes) => Some(bytes),
            Payload::Live(_) => None,
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self.payload, Payload::Live(_))
    }

    pub fn is_encoded(&self) -> bool {
        matches!(self.payload, Payload::Encoded(_))
    }

    /// Turn this envelope into a reply to itself
    ///
    /// The destination becomes the reversed source path, the source path is
    /// cleared, `last_uoid` is set to this envelope's id and the reply flag
    /// is raised. The id itself is kept.
    pub fn revert_direction(&mut self) {
        self.destination = self.source.reverse();
        self.source = CellPath::new();
        self.last_uoid = Some(self.uoid);
        self.is_reply = true;
    }
}
