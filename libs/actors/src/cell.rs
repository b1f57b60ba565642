//! Cell Behaviour
//!
//! A [`Cell`] is the application side of an actor: the kernel owns the
//! mailbox, workers and lifecycle (the [`CellNucleus`]) and calls into the
//! cell through the hooks below. Every hook receives the nucleus so the cell
//! can send, reply and inspect its own state.
//!
//! # Lifecycle Hooks
//!
//! ```text
//! prepare_startup ─> post_startup ─> [messages...] ─> last_message
//!                                                  ─> prepare_removal
//!                                                  ─> post_removal
//! ```
//!
//! A failing `prepare_startup` aborts the start and kills the cell.
//!
//! # Message Hooks
//!
//! - `message_arrived`: envelope reached its final destination; returning
//!   `Ok(Some(reply))` sends the reply back along the reversed source path,
//!   returning `Err` sends the error back instead
//! - `message_to_forward`: this cell is an intermediate hop; the default
//!   passes the envelope on to the next hop
//! - `routed_message_arrived`: the routing table chose this cell as gateway
//!   for another address; by default the cell handles the envelope in that
//!   address's place (answering it at the end of the path, forwarding it
//!   otherwise), tunnels override it to carry the envelope to a peer
//! - `exception_arrived`: an error reply nobody was waiting for

use crate::nucleus::CellNucleus;
use async_trait::async_trait;
use cell_types::{Envelope, Message, RemoteError};
use std::sync::Arc;
use tracing::{trace, warn};

#[async_trait]
pub trait Cell: Send + Sync + 'static {
    /// Type name reported in cell listings
    fn cell_type(&self) -> &str {
        "Generic"
    }

    /// One-line status for cell listings
    fn short_info(&self) -> String {
        String::new()
    }

    async fn prepare_startup(&self, _nucleus: &CellNucleus) -> anyhow::Result<()> {
        Ok(())
    }

    async fn post_startup(&self, _nucleus: &CellNucleus) {}

    async fn message_arrived(&self, nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>>;

    async fn message_to_forward(&self, nucleus: &CellNucleus, envelope: Envelope) {
        let uoid = envelope.uoid();
        if let Err(e) = nucleus.forward(envelope) {
            warn!(cell = %nucleus.name(), uoid = %uoid, error = %e, "Failed to forward message");
        }
    }

    /// Default: the cell stands in for the routed address and handles the
    /// envelope as if it had been sent to it
    async fn routed_message_arrived(&self, nucleus: &CellNucleus, envelope: Envelope) {
        trace!(
            cell = %nucleus.name(),
            uoid = %envelope.uoid(),
            destination = %envelope.destination_path(),
            final_hop = envelope.destination_path().is_final_destination(),
            "Handling routed message"
        );
        nucleus.dispatch(envelope).await;
    }

    async fn exception_arrived(&self, nucleus: &CellNucleus, envelope: &Envelope, error: RemoteError) {
        warn!(
            cell = %nucleus.name(),
            uoid = %envelope.uoid(),
            error = %error,
            "Unsolicited error reply"
        );
    }

    /// Runs after every message queued before the kill was delivered
    async fn last_message(&self, _nucleus: &CellNucleus) {}

    async fn prepare_removal(&self, _nucleus: &CellNucleus) {}

    async fn post_removal(&self, _nucleus: &CellNucleus) {}
}

/// Builds cells by type name, see [`Domain::create_cell`](crate::Domain::create_cell)
pub trait CellFactory: Send + Sync {
    fn create(&self, name: &str, args: &[String]) -> anyhow::Result<Arc<dyn Cell>>;
}

impl<F> CellFactory for F
where
    F: Fn(&str, &[String]) -> anyhow::Result<Arc<dyn Cell>> + Send + Sync,
{
    fn create(&self, name: &str, args: &[String]) -> anyhow::Result<Arc<dyn Cell>> {
        self(name, args)
    }
}
