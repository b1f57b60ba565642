//! Cell Messaging Runtime
//!
//! Named cells exchange envelopes inside a [`Domain`]; domains are linked by
//! tunnel cells and a routing table decides which hop an envelope takes next.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────── Domain "d1" ─────────────────────────┐
//! │                                                              │
//! │  ┌──────────┐ send  ┌──────────────┐ lookup ┌──────────────┐ │
//! │  │  Cell A  │──────>│     Glue     │───────>│ RoutingTable │ │
//! │  │ (nucleus)│       │  route walk  │        └──────────────┘ │
//! │  └──────────┘       └──────┬───────┘                         │
//! │       ^                    │ deliver                         │
//! │       │ reply        ┌─────┴──────┐      ┌──────────────────┐│
//! │       └──────────────│   Cell B   │      │ tunnel-d2 (cell) ││
//! │                      │  mailbox → │      │ wire codec ──────┼┼──> d2
//! │                      │  workers   │      └──────────────────┘│
//! │                      └────────────┘                          │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Core Concepts
//!
//! - [`Cell`]: application logic, called through lifecycle and message hooks
//! - [`CellNucleus`]: per-cell mailbox, worker pools and request correlation
//! - [`Domain`]: cell registry, routing walk, events and shared context
//! - [`Route`] / [`RoutingTable`]: exact, well-known, domain, default,
//!   dumpster, alias, queue and topic routes
//! - [`LoopbackTunnel`]: in-process link between two domains
//!
//! # Example
//!
//! ```rust,no_run
//! use async_trait::async_trait;
//! use cell_runtime::{Cell, CellNucleus, Domain};
//! use cell_types::{Address, Envelope, Message};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! struct Echo;
//!
//! #[async_trait]
//! impl Cell for Echo {
//!     async fn message_arrived(&self, _: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
//!         Ok(envelope.message().cloned())
//!     }
//! }
//!
//! struct Client;
//!
//! #[async_trait]
//! impl Cell for Client {
//!     async fn message_arrived(&self, _: &CellNucleus, _: &Envelope) -> anyhow::Result<Option<Message>> {
//!         Ok(None)
//!     }
//! }
//!
//! # async fn run() -> cell_runtime::Result<()> {
//! let domain = Domain::new("example");
//! domain.spawn_cell("echo", Arc::new(Echo)).await?;
//! let client = domain.spawn_cell("client", Arc::new(Client)).await?;
//!
//! let request = Envelope::to(Address::local("echo"), Message::text("ping"));
//! let reply = client.request(request, Duration::from_secs(1)).await?;
//! assert_eq!(reply.message(), Some(&Message::text("ping")));
//! # Ok(())
//! # }
//! ```

pub mod cell;
pub mod context;
pub mod correlation;
pub mod error;
pub mod events;
pub mod glue;
pub mod info;
pub mod nucleus;
pub mod pool;
pub mod route;
pub mod routing;
pub mod tunnel;

pub use cell::{Cell, CellFactory};
pub use context::DiagnosticContext;
pub use correlation::{Answer, CallbackExecutor, PendingRequest, ReplyHandler};
pub use error::{CellError, Result};
pub use events::{CellEvent, CellEventListener};
pub use glue::Domain;
pub use info::{CellInfo, CellState};
pub use nucleus::CellNucleus;
pub use pool::{WorkerPool, WorkerTracker};
pub use route::{Route, RouteKey, RouteType};
pub use routing::RoutingTable;
pub use tunnel::LoopbackTunnel;
