//! Core Types for the Cell Messaging Kernel
//!
//! Value types shared by every layer of the kernel: cell [`Address`]es, the
//! [`CellPath`] an envelope travels along, process-unique [`Uoid`]s, the
//! [`Message`] payload set and the [`Envelope`] that carries them.
//!
//! # Textual Forms
//!
//! ```text
//! address  := cell [ "@" domain ]          pool-a@storage, pool-a, *@storage
//! path     := address { ":" address }      door@d1:*@d2:pool-a@d2
//! ```
//!
//! An address without a domain is *unqualified* and resolves relative to the
//! domain doing the routing. `*@domain` names a whole domain.

pub mod address;
pub mod envelope;
pub mod message;
pub mod path;
pub mod uoid;

pub use address::{Address, AddressError, DOMAIN_WILDCARD, LOCAL_DOMAIN};
pub use envelope::{Envelope, Payload, INFINITE_TTL_MS};
pub use message::{Message, RemoteError, RemoteErrorKind};
pub use path::CellPath;
pub use uoid::Uoid;
