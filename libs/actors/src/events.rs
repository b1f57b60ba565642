//! Domain Events
//!
//! Cells and routes coming and going are announced to registered
//! [`CellEventListener`]s. Listeners run synchronously on the thread that
//! caused the event; a panicking listener is logged and skipped, and never
//! affects the operation that emitted the event.

use crate::route::Route;
use dashmap::DashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Clone, PartialEq)]
pub enum CellEvent {
    CellCreated(String),
    CellExported(String),
    CellDied(String),
    RouteAdded(Route),
    RouteDeleted(Route),
}

impl CellEvent {
    pub fn name(&self) -> &'static str {
        match self {
            CellEvent::CellCreated(_) => "cell_created",
            CellEvent::CellExported(_) => "cell_exported",
            CellEvent::CellDied(_) => "cell_died",
            CellEvent::RouteAdded(_) => "route_added",
            CellEvent::RouteDeleted(_) => "route_deleted",
        }
    }
}

pub trait CellEventListener: Send + Sync {
    fn cell_created(&self, _name: &str) {}
    fn cell_exported(&self, _name: &str) {}
    fn cell_died(&self, _name: &str) {}
    fn route_added(&self, _route: &Route) {}
    fn route_deleted(&self, _route: &Route) {}
}

/// Forwards every event into a channel
impl CellEventListener for mpsc::UnboundedSender<CellEvent> {
    fn cell_created(&self, name: &str) {
        let _ = self.send(CellEvent::CellCreated(name.to_string()));
    }

    fn cell_exported(&self, name: &str) {
        let _ = self.send(CellEvent::CellExported(name.to_string()));
    }

    fn cell_died(&self, name: &str) {
        let _ = self.send(CellEvent::CellDied(name.to_string()));
    }

    fn route_added(&self, route: &Route) {
        let _ = self.send(CellEvent::RouteAdded(route.clone()));
    }

    fn route_deleted(&self, route: &Route) {
        let _ = self.send(CellEvent::RouteDeleted(route.clone()));
    }
}

/// Listeners grouped by the cell that registered them
#[derive(Default)]
pub(crate) struct EventBus {
    listeners: DashMap<String, Vec<Arc<dyn CellEventListener>>>,
}

impl EventBus {
    pub(crate) fn add(&self, owner: &str, listener: Arc<dyn CellEventListener>) {
        self.listeners.entry(owner.to_string()).or_default().push(listener);
    }

    pub(crate) fn remove_owner(&self, owner: &str) -> usize {
        self.listeners.remove(owner).map(|(_, l)| l.len()).unwrap_or(0)
    }

    pub(crate) fn emit(&self, event: &CellEvent) {
        // snapshot so no map guard is held while listeners run
        let targets: Vec<(String, Arc<dyn CellEventListener>)> = self
            .listeners
            .iter()
            .flat_map(|entry| {
                let owner = entry.key().clone();
                entry
                    .value()
                    .iter()
                    .map(move |l| (owner.clone(), l.clone()))
                    .collect::<Vec<_>>()
            })
            .collect();

        for (owner, listener) in targets {
            let outcome = catch_unwind(AssertUnwindSafe(|| match event {
                CellEvent::CellCreated(name) => listener.cell_created(name),
                CellEvent::CellExported(name) => listener.cell_exported(name),
                CellEvent::CellDied(name) => listener.cell_died(name),
                CellEvent::RouteAdded(route) => listener.route_added(route),
                CellEvent::RouteDeleted(route) => listener.route_deleted(route),
            }));
            if outcome.is_err() {
                warn!(owner = %owner, event = event.name(), "Event listener panicked");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cell_types::Address;

    struct Exploding;

    impl CellEventListener for Exploding {
        fn cell_created(&self, _name: &str) {
            panic!("listener failure");
        }
    }

    #[test]
    fn test_channel_listener_receives_events() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.add("watcher", Arc::new(tx));

        bus.emit(&CellEvent::CellCreated("pool".into()));
        let route = Route::well_known("pool", Address::local("tunnel"));
        bus.emit(&CellEvent::RouteAdded(route.clone()));

        assert_eq!(rx.try_recv().unwrap(), CellEvent::CellCreated("pool".into()));
        assert_eq!(rx.try_recv().unwrap(), CellEvent::RouteAdded(route));
    }

    #[test]
    fn test_panicking_listener_is_isolated() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.add("bad", Arc::new(Exploding));
        bus.add("good", Arc::new(tx));

        bus.emit(&CellEvent::CellCreated("pool".into()));
        assert_eq!(rx.try_recv().unwrap(), CellEvent::CellCreated("pool".into()));
    }

    #[test]
    fn test_remove_owner() {
        let bus = EventBus::default();
        let (tx, mut rx) = mpsc::unbounded_channel();
        bus.add("watcher", Arc::new(tx));
        assert_eq!(bus.remove_owner("watcher"), 1);

        bus.emit(&CellEvent::CellDied("pool".into()));
        assert!(rx.try_recv().is_err());
    }
}
