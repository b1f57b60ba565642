//! In-process tunnel between two domains
//!
//! A [`LoopbackTunnel`] is a cell that carries envelopes into a peer domain
//! through the wire codec, exactly as a socket tunnel would, minus the
//! socket. [`LoopbackTunnel::connect`] installs a tunnel on each side plus
//! the domain routes pointing at them:
//!
//! ```text
//!   d1                                      d2
//!   ┌──────────────┐   encode_wire/decode   ┌──────────────┐
//!   │ tunnel-d2@d1 │ ─────────────────────> │ tunnel-d1@d2 │
//!   │              │ <───────────────────── │              │
//!   └──────────────┘                        └──────────────┘
//!   domain *@d2 → tunnel-d2@d1              domain *@d1 → tunnel-d1@d2
//! ```
//!
//! Each transmitted envelope records the receiving tunnel as its latest
//! source hop, so the peer domain never routes it straight back.

use crate::cell::Cell;
use crate::error::Result;
use crate::glue::Domain;
use crate::nucleus::CellNucleus;
use crate::route::Route;
use async_trait::async_trait;
use cell_codec::{decode_wire, encode_wire, EnvelopeCodecExt};
use cell_types::{Address, Envelope, Message};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{trace, warn};

pub struct LoopbackTunnel {
    peer: Domain,
    peer_tunnel: Address,
    transmitted: AtomicU64,
}

impl LoopbackTunnel {
    /// Tunnel into `peer`, whose receiving tunnel cell is `peer_tunnel`
    pub fn new(peer: Domain, peer_tunnel: Address) -> Self {
        Self {
            peer,
            peer_tunnel,
            transmitted: AtomicU64::new(0),
        }
    }

    /// Connect two domains with a pair of tunnels
    ///
    /// The tunnels keep both domains alive until one of them is killed.
    pub async fn connect(a: &Domain, b: &Domain) -> Result<(Arc<CellNucleus>, Arc<CellNucleus>)> {
        let a_tunnel = Address::new(format!("tunnel-{}", b.name()), a.name());
        let b_tunnel = Address::new(format!("tunnel-{}", a.name()), b.name());

        let a_cell = LoopbackTunnel::new(b.clone(), b_tunnel.clone());
        let b_cell = LoopbackTunnel::new(a.clone(), a_tunnel.clone());
        let a_nucleus = a.spawn_cell(a_tunnel.cell_name(), Arc::new(a_cell)).await?;
        let b_nucleus = b.spawn_cell(b_tunnel.cell_name(), Arc::new(b_cell)).await?;

        a.route_add(Route::domain(b.name(), a_tunnel))?;
        b.route_add(Route::domain(a.name(), b_tunnel))?;
        Ok((a_nucleus, b_nucleus))
    }

    pub fn transmitted(&self) -> u64 {
        self.transmitted.load(Ordering::Relaxed)
    }

    fn transmit(&self, nucleus: &CellNucleus, mut envelope: Envelope) -> Result<()> {
        envelope.encode_payload(nucleus.domain().codecs())?;
        let frame = encode_wire(&envelope)?;
        let mut arrived = decode_wire(&frame)?;
        arrived.add_source_address(self.peer_tunnel.clone());

        trace!(
            tunnel = %nucleus.name(),
            peer = %self.peer.name(),
            uoid = %arrived.uoid(),
            bytes = frame.len(),
            "Transmitting envelope"
        );
        self.transmitted.fetch_add(1, Ordering::Relaxed);
        self.peer.inject(arrived)
    }
}

#[async_trait]
impl Cell for LoopbackTunnel {
    fn cell_type(&self) -> &str {
        "LoopbackTunnel"
    }

    fn short_info(&self) -> String {
        format!("-> {} ({} sent)", self.peer_tunnel, self.transmitted())
    }

    async fn message_arrived(&self, nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        trace!(tunnel = %nucleus.name(), uoid = %envelope.uoid(), "Tunnel ignores messages addressed to itself");
        Ok(None)
    }

    async fn message_to_forward(&self, nucleus: &CellNucleus, envelope: Envelope) {
        let uoid = envelope.uoid();
        if let Err(e) = self.transmit(nucleus, envelope) {
            warn!(tunnel = %nucleus.name(), uoid = %uoid, error = %e, "Failed to forward envelope to peer");
        }
    }

    async fn routed_message_arrived(&self, nucleus: &CellNucleus, envelope: Envelope) {
        let uoid = envelope.uoid();
        if let Err(e) = self.transmit(nucleus, envelope) {
            warn!(tunnel = %nucleus.name(), uoid = %uoid, error = %e, "Failed to route envelope to peer");
        }
    }
}
