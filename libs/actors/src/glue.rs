//! Domain Glue
//!
//! A [`Domain`] is one process-local namespace of cells: the cell registry,
//! the routing table, event listeners, shared context and cell factories.
//! Every envelope sent by a cell passes through [`Domain::send_envelope`],
//! which walks the destination path hop by hop.
//!
//! # Routing Walk
//!
//! ```text
//! hop = destination.current()
//! loop {
//!     *@this            → advance the path
//!     cell@this, live   → deliver (routed if hop is only a gateway)
//!     unqualified       → deliver to a live local cell, fan out to topics
//!     route lookup      → alias/queue rewrites the path; hop = gateway
//! }
//! ```
//!
//! Loop guards: the source path may not grow past `max_hops`, one send may
//! not perform more than `max_route_levels` lookups, and an envelope is never
//! routed straight back to the hop it arrived from unless the path was
//! rewritten on the way.
//!
//! # Failure Reporting
//!
//! On the first send of an envelope a routing failure is returned to the
//! sending cell. Anywhere further along, the failure travels back to the
//! sender as an error reply. Errors about error replies are only logged.

use crate::cell::{Cell, CellFactory};
use crate::error::{CellError, Result};
use crate::events::{CellEvent, CellEventListener, EventBus};
use crate::info::CellInfo;
use crate::nucleus::{now_millis, CellNucleus};
use crate::route::{Route, RouteType};
use crate::routing::RoutingTable;
use cell_codec::{CodecRegistry, EnvelopeCodecExt};
use cell_config::{CellSettings, DomainConfig, DomainSettings};
use cell_types::{Address, Envelope, Message, RemoteError};
use dashmap::mapref::entry::Entry;
use dashmap::{DashMap, DashSet};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{debug, error, info, trace, warn};

/// Envelope that could not be routed, with the hop it failed at
struct Undeliverable {
    envelope: Envelope,
    target: String,
    reason: String,
}

impl Undeliverable {
    fn new(envelope: Envelope, target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            envelope,
            target: target.into(),
            reason: reason.into(),
        }
    }
}

struct DomainInner {
    name: String,
    address: Address,
    settings: DomainSettings,
    cell_settings: CellSettings,
    codecs: Arc<CodecRegistry>,
    cells: DashMap<String, Arc<CellNucleus>>,
    killed: DashSet<String>,
    routes: RoutingTable,
    events: EventBus,
    context: DashMap<String, serde_json::Value>,
    factories: DashMap<String, Arc<dyn CellFactory>>,
    unique: AtomicU64,
    cell_removed: Notify,
}

/// Handle to a cell domain; clones share the same domain
///
/// Every live cell holds a handle to its domain and the domain holds every
/// live cell, so a domain with cells stays allocated after the last outside
/// handle is dropped. Call [`Domain::shutdown`] to remove the cells and
/// release it.
#[derive(Clone)]
pub struct Domain {
    inner: Arc<DomainInner>,
}

/// A trailing `*` becomes the current time in millis; an empty name is `*`
fn resolve_domain_name(name: &str) -> String {
    let name = if name.is_empty() { "*" } else { name };
    match name.strip_suffix('*') {
        Some(prefix) => format!("{prefix}{}", now_millis()),
        None => name.to_string(),
    }
}

impl Domain {
    /// Domain with default settings
    pub fn new(name: &str) -> Self {
        let mut config = DomainConfig::default();
        config.domain.name = name.to_string();
        Self::build(&config, Arc::new(CodecRegistry::with_defaults()))
    }

    /// Domain from a loaded configuration
    pub fn with_config(config: &DomainConfig) -> Result<Self> {
        config.validate().map_err(|e| CellError::Config(format!("{e:#}")))?;
        let codecs = CodecRegistry::with_default_named(&config.codec.default)?;
        Ok(Self::build(config, Arc::new(codecs)))
    }

    fn build(config: &DomainConfig, codecs: Arc<CodecRegistry>) -> Self {
        let name = resolve_domain_name(&config.domain.name);
        info!(domain = %name, codec = %codecs.default_codec().name(), "Domain created");
        Self {
            inner: Arc::new(DomainInner {
                address: Address::for_domain(name.clone()),
                name,
                settings: config.domain.clone(),
                cell_settings: config.cell.clone(),
                codecs,
                cells: DashMap::new(),
                killed: DashSet::new(),
                routes: RoutingTable::new(),
                events: EventBus::default(),
                context: DashMap::new(),
                factories: DashMap::new(),
                unique: AtomicU64::new(100),
                cell_removed: Notify::new(),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// `*@name`
    pub fn address(&self) -> &Address {
        &self.inner.address
    }

    pub fn codecs(&self) -> &CodecRegistry {
        &self.inner.codecs
    }

    pub(crate) fn codecs_handle(&self) -> Arc<CodecRegistry> {
        self.inner.codecs.clone()
    }

    pub fn settings(&self) -> &DomainSettings {
        &self.inner.settings
    }

    /// Settings new cells get unless spawned with their own
    pub fn cell_settings(&self) -> &CellSettings {
        &self.inner.cell_settings
    }

    /// Next value of the domain-wide counter used for generated names
    pub fn unique(&self) -> u64 {
        self.inner.unique.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Cell name a requested name resolves to
    ///
    /// `@` becomes `+`, an empty name becomes `*`, a lone `*` becomes
    /// `$-<n>` and a trailing `*` is replaced by `-<n>`.
    pub fn resolve_cell_name(&self, requested: &str) -> String {
        let name = if requested.is_empty() {
            "*".to_string()
        } else {
            requested.replace('@', "+")
        };
        if name == "*" {
            return format!("$-{}", self.unique());
        }
        match name.strip_suffix('*') {
            Some(prefix) => format!("{prefix}-{}", self.unique()),
            None => name,
        }
    }

    // ─── Cells ────────────────────────────────────────────────────────────

    /// Register and start a cell with the domain's cell settings
    pub async fn spawn_cell(&self, name: &str, cell: Arc<dyn Cell>) -> Result<Arc<CellNucleus>> {
        self.spawn_cell_with_settings(name, cell, self.inner.cell_settings.clone())
            .await
    }

    pub async fn spawn_cell_with_settings(
        &self,
        name: &str,
        cell: Arc<dyn Cell>,
        settings: CellSettings,
    ) -> Result<Arc<CellNucleus>> {
        let name = self.resolve_cell_name(name);
        let nucleus = match self.inner.cells.entry(name.clone()) {
            Entry::Occupied(_) => return Err(CellError::DuplicateCell(name)),
            Entry::Vacant(slot) => {
                let nucleus = CellNucleus::new(self.clone(), name.clone(), cell, settings);
                slot.insert(nucleus.clone());
                nucleus
            }
        };
        debug!(domain = %self.inner.name, cell = %name, cell_type = %nucleus.cell_type(), "Cell created");
        self.inner.events.emit(&CellEvent::CellCreated(name));

        nucleus.start().await?;
        Ok(nucleus)
    }

    /// Make `create_cell` able to build cells of `cell_type`
    pub fn register_factory(&self, cell_type: &str, factory: Arc<dyn CellFactory>) {
        self.inner.factories.insert(cell_type.to_string(), factory);
    }

    /// Build a cell with a registered factory and start it
    pub async fn create_cell(&self, cell_type: &str, name: &str, args: &[String]) -> Result<Arc<CellNucleus>> {
        let factory = self
            .inner
            .factories
            .get(cell_type)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| CellError::UnknownCellType(cell_type.to_string()))?;
        let cell = factory.create(name, args).map_err(|e| CellError::StartupFailed {
            cell: name.to_string(),
            message: format!("{e:#}"),
        })?;
        self.spawn_cell(name, cell).await
    }

    pub fn cell(&self, name: &str) -> Option<Arc<CellNucleus>> {
        self.inner.cells.get(name).map(|entry| entry.value().clone())
    }

    /// Registered and not being killed
    fn live_cell(&self, name: &str) -> Option<Arc<CellNucleus>> {
        if self.inner.killed.contains(name) {
            return None;
        }
        self.cell(name)
    }

    pub fn cell_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.cells.iter().map(|entry| entry.key().clone()).collect();
        names.sort();
        names
    }

    pub fn cell_info(&self, name: &str) -> Option<CellInfo> {
        self.cell(name).map(|nucleus| nucleus.info())
    }

    pub fn cell_infos(&self) -> Vec<CellInfo> {
        self.cell_names()
            .iter()
            .filter_map(|name| self.cell_info(name))
            .collect()
    }

    /// Announce a cell to event listeners as exported
    pub fn export_cell(&self, name: &str) -> Result<()> {
        if !self.inner.cells.contains_key(name) {
            return Err(CellError::CellNotFound(name.to_string()));
        }
        self.inner.events.emit(&CellEvent::CellExported(name.to_string()));
        Ok(())
    }

    /// Start removing a cell; returns immediately
    pub fn kill(&self, name: &str) -> Result<()> {
        let killer = self.inner.address.to_string();
        self.kill_from(name, &killer)
    }

    pub(crate) fn kill_from(&self, name: &str, killer: &str) -> Result<()> {
        let nucleus = self
            .cell(name)
            .ok_or_else(|| CellError::CellNotFound(name.to_string()))?;
        if !self.inner.killed.insert(name.to_string()) {
            debug!(cell = %name, "Cell already being removed");
            return Ok(());
        }

        for route in self.inner.routes.routes_to(name, &self.inner.name) {
            if let Ok(removed) = self.inner.routes.delete(&route) {
                debug!(cell = %name, route = %removed, "Removing route of dying cell");
                self.inner.events.emit(&CellEvent::RouteDeleted(removed));
            }
        }
        self.inner.events.emit(&CellEvent::CellDied(name.to_string()));

        tokio::spawn(nucleus.shutdown(killer.to_string()));
        Ok(())
    }

    /// Final removal, called by the nucleus once shutdown is complete
    pub(crate) fn destroy(&self, name: &str) {
        self.inner.cells.remove(name);
        self.inner.killed.remove(name);
        let listeners = self.inner.events.remove_owner(name);
        if listeners > 0 {
            trace!(cell = %name, listeners, "Removed event listeners of dead cell");
        }
        self.inner.cell_removed.notify_waiters();
    }

    /// Wait for a cell to be removed; `None` waits forever
    ///
    /// Returns false if the cell still exists when the timeout elapses.
    pub async fn join(&self, name: &str, timeout: Option<Duration>) -> bool {
        let removed = async {
            loop {
                let notified = self.inner.cell_removed.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();
                if !self.inner.cells.contains_key(name) {
                    return;
                }
                notified.await;
            }
        };
        match timeout {
            Some(timeout) => tokio::time::timeout(timeout, removed).await.is_ok(),
            None => {
                removed.await;
                true
            }
        }
    }

    /// Kill every cell and wait for all of them to be removed
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        let names = self.cell_names();
        info!(domain = %self.inner.name, cells = names.len(), "Shutting down domain");
        for name in &names {
            if let Err(e) = self.kill(name) {
                debug!(cell = %name, error = %e, "Cell already gone");
            }
        }

        let all_removed = async {
            for name in &names {
                self.join(name, None).await;
            }
        };
        let clean = tokio::time::timeout(timeout, all_removed).await.is_ok();
        if !clean {
            warn!(domain = %self.inner.name, remaining = ?self.cell_names(), "Domain shutdown timed out");
        }
        clean
    }

    // ─── Routes ───────────────────────────────────────────────────────────

    pub fn route_add(&self, route: Route) -> Result<()> {
        self.inner.routes.add(route.clone())?;
        info!(domain = %self.inner.name, route = %route, "Route added");
        self.inner.events.emit(&CellEvent::RouteAdded(route));
        Ok(())
    }

    pub fn route_delete(&self, route: &Route) -> Result<Route> {
        let removed = self.inner.routes.delete(route)?;
        info!(domain = %self.inner.name, route = %removed, "Route deleted");
        self.inner.events.emit(&CellEvent::RouteDeleted(removed.clone()));
        Ok(removed)
    }

    pub fn routes(&self) -> &RoutingTable {
        &self.inner.routes
    }

    /// Add `subscriber` to `topic`
    pub fn subscribe(&self, topic: &str, subscriber: Address) -> Result<()> {
        self.route_add(Route::topic(topic, subscriber))
    }

    pub fn unsubscribe(&self, topic: &str, subscriber: Address) -> Result<Route> {
        self.route_delete(&Route::topic(topic, subscriber))
    }

    /// Add `consumer` to the queue named `queue`
    pub fn consume(&self, queue: &str, consumer: Address) -> Result<()> {
        self.route_add(Route::queue(queue, consumer))
    }

    // ─── Events and Context ───────────────────────────────────────────────

    /// Listener removed automatically when the cell `owner` dies
    pub fn add_event_listener(&self, owner: &str, listener: Arc<dyn CellEventListener>) {
        self.inner.events.add(owner, listener);
    }

    pub fn set_context(&self, key: &str, value: serde_json::Value) -> Option<serde_json::Value> {
        self.inner.context.insert(key.to_string(), value)
    }

    pub fn context(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.context.get(key).map(|entry| entry.value().clone())
    }

    pub fn remove_context(&self, key: &str) -> Option<serde_json::Value> {
        self.inner.context.remove(key).map(|(_, value)| value)
    }

    // ─── Routing ──────────────────────────────────────────────────────────

    /// Hand an envelope received from another domain to this one
    pub fn inject(&self, envelope: Envelope) -> Result<()> {
        self.send_envelope(envelope, true, true)
    }

    pub(crate) fn send_envelope(&self, mut envelope: Envelope, allow_local: bool, allow_remote: bool) -> Result<()> {
        let first_send = envelope.is_live();
        if first_send {
            envelope.encode_payload(&self.inner.codecs)?;
        }

        match self.route_envelope(envelope, allow_local, allow_remote, true) {
            Ok(()) => Ok(()),
            Err(failed) if first_send => Err(CellError::no_route(
                failed.envelope.uoid(),
                failed.target,
                failed.envelope.destination_path().to_string(),
                failed.reason,
            )),
            Err(failed) => {
                self.report_undeliverable(failed);
                Ok(())
            }
        }
    }

    fn route_envelope(
        &self,
        mut envelope: Envelope,
        mut allow_local: bool,
        mut allow_remote: bool,
        fan_out: bool,
    ) -> std::result::Result<(), Undeliverable> {
        let inner = &self.inner;
        if envelope.source_path().hops() > inner.settings.max_hops {
            error!(
                uoid = %envelope.uoid(),
                source = %envelope.source_path(),
                max_hops = inner.settings.max_hops,
                "Hop count exceeded, dumping envelope"
            );
            return Ok(());
        }

        let arrived_from = envelope.source_path().destination().cloned();
        let mut path_changed = false;
        let mut topic_delivered = false;
        let mut lookups = 0usize;
        let Some(mut hop) = envelope.destination_path().current().cloned() else {
            return Err(Undeliverable::new(envelope, "*", "empty destination path"));
        };

        loop {
            if hop == inner.address {
                let next = envelope
                    .destination_path_mut()
                    .next()
                    .then(|| envelope.destination_path().current().cloned())
                    .flatten();
                match next {
                    Some(next) => {
                        hop = next;
                        continue;
                    }
                    None => return Err(Undeliverable::new(envelope, "*", "path ends at this domain")),
                }
            }

            if hop.domain_name() == inner.name {
                if let Some(cell) = self.live_cell(hop.cell_name()) {
                    self.deliver_to(&cell, envelope, &hop);
                    return Ok(());
                }
            } else if hop.is_local() {
                if allow_local || lookups > 0 {
                    if let Some(cell) = self.live_cell(hop.cell_name()) {
                        self.deliver_to(&cell, envelope, &hop);
                        return Ok(());
                    }
                }
                if fan_out {
                    topic_delivered |= self.fan_out(&envelope, &hop, allow_remote);
                }
                if !allow_remote {
                    return self.unrouted(envelope, &hop, topic_delivered, "remote resolution not allowed");
                }
            }

            if lookups >= inner.settings.max_route_levels {
                return Err(Undeliverable::new(envelope, hop.to_string(), "routing limit reached"));
            }
            lookups += 1;

            let found = inner.routes.find(&hop, allow_remote).or_else(|| {
                if envelope.is_reply() {
                    inner.routes.dumpster()
                } else {
                    None
                }
            });
            let Some(route) = found else {
                return self.unrouted(envelope, &hop, topic_delivered, "missing routing entry");
            };
            if topic_delivered && route.kind() == RouteType::Default {
                return Ok(());
            }

            let gateway = route.gateway().clone();
            if !path_changed && arrived_from.as_ref() == Some(&gateway) {
                let reason = format!("refusing to send back to {gateway}");
                return self.unrouted(envelope, &hop, topic_delivered, &reason);
            }

            let rewrites = match route.kind() {
                RouteType::Alias => true,
                RouteType::Queue => !gateway.is_domain_address(),
                _ => false,
            };
            if rewrites {
                envelope.destination_path_mut().replace_current(gateway.clone());
                path_changed = true;
            }
            trace!(uoid = %envelope.uoid(), hop = %hop, route = %route, "Following route");

            allow_local = true;
            allow_remote = true;
            hop = gateway;
        }
    }

    fn unrouted(
        &self,
        envelope: Envelope,
        hop: &Address,
        topic_delivered: bool,
        reason: &str,
    ) -> std::result::Result<(), Undeliverable> {
        if topic_delivered {
            Ok(())
        } else {
            Err(Undeliverable::new(envelope, hop.to_string(), reason))
        }
    }

    fn deliver_to(&self, cell: &CellNucleus, mut envelope: Envelope, hop: &Address) {
        let routed = envelope.destination_path().current() != Some(hop);
        if routed {
            envelope.add_source_address(self.inner.address.clone());
        }
        trace!(uoid = %envelope.uoid(), cell = %cell.name(), routed, "Delivering locally");
        cell.deliver(envelope, routed);
    }

    /// Send a copy to every subscriber of the topic `hop`; true if any
    /// copy was delivered
    fn fan_out(&self, envelope: &Envelope, hop: &Address, allow_remote: bool) -> bool {
        let mut delivered = false;
        for route in self.inner.routes.find_topic_routes(hop) {
            let subscriber = route.gateway();
            let mut copy = envelope.clone();
            let outcome = if subscriber.is_domain_address() {
                if !allow_remote {
                    continue;
                }
                copy.destination_path_mut().insert(subscriber.clone());
                self.route_envelope(copy, true, true, false)
            } else {
                copy.destination_path_mut().replace_current(subscriber.clone());
                self.route_envelope(copy, true, allow_remote, false)
            };
            match outcome {
                Ok(()) => delivered = true,
                Err(failed) => debug!(
                    topic = %hop,
                    subscriber = %subscriber,
                    reason = %failed.reason,
                    "Topic delivery failed"
                ),
            }
        }
        delivered
    }

    /// Send a no-route error back along the reversed source path
    fn report_undeliverable(&self, failed: Undeliverable) {
        let Undeliverable {
            envelope,
            target,
            reason,
        } = failed;

        if envelope.is_reply() && matches!(envelope.peek_message(&self.inner.codecs), Ok(Message::Error(_))) {
            warn!(
                uoid = %envelope.uoid(),
                target = %target,
                reason = %reason,
                destination = %envelope.destination_path(),
                "Dropping undeliverable error reply"
            );
            return;
        }

        debug!(
            uoid = %envelope.uoid(),
            source = %envelope.source_path(),
            target = %target,
            reason = %reason,
            "Envelope undeliverable, notifying sender"
        );

        let uoid = envelope.uoid();
        let path = envelope.destination_path().to_string();
        let mut notice = envelope;
        notice.revert_direction();
        let error = RemoteError::no_route(format!("{reason}: {target} (at {})", self.inner.name)).for_envelope(uoid, path);
        notice.set_message(Message::Error(error));
        notice.add_source_address(self.inner.address.clone());

        if let Err(e) = notice.encode_payload(&self.inner.codecs) {
            error!(uoid = %uoid, error = %e, "Failed to encode no-route notice");
            return;
        }
        if let Err(e) = self.send_envelope(notice, true, true) {
            warn!(uoid = %uoid, error = %e, "Failed to send no-route notice");
        }
    }
}

impl fmt::Debug for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Domain")
            .field("name", &self.inner.name)
            .field("cells", &self.inner.cells.len())
            .field("routes", &self.inner.routes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_name_resolution() {
        let domain = Domain::new("naming");
        assert_eq!(domain.resolve_cell_name("pool"), "pool");
        assert_eq!(domain.resolve_cell_name("a@b"), "a+b");
        assert_eq!(domain.resolve_cell_name("*"), "$-101");
        assert_eq!(domain.resolve_cell_name(""), "$-102");
        assert_eq!(domain.resolve_cell_name("worker*"), "worker-103");
    }

    #[test]
    fn test_domain_name_wildcard() {
        let domain = Domain::new("client-*");
        assert!(domain.name().starts_with("client-"));
        assert!(domain.name()["client-".len()..].parse::<u64>().is_ok());
        assert_eq!(domain.address().to_string(), format!("*@{}", domain.name()));

        let unnamed = Domain::new("");
        assert!(unnamed.name().parse::<u64>().is_ok());
    }

    #[test]
    fn test_with_config_rejects_bad_codec() {
        let mut config = DomainConfig::default();
        config.codec.default = "xml".to_string();
        assert!(matches!(Domain::with_config(&config), Err(CellError::Codec(_))));

        let mut config = DomainConfig::default();
        config.domain.name = "local".to_string();
        assert!(matches!(Domain::with_config(&config), Err(CellError::Config(_))));

        let mut config = DomainConfig::default();
        config.domain.name = String::new();
        let domain = Domain::with_config(&config).unwrap();
        assert!(domain.name().parse::<u64>().is_ok());
    }

    #[test]
    fn test_context_values() {
        let domain = Domain::new("ctx");
        assert!(domain.set_context("motd", serde_json::json!("hello")).is_none());
        assert_eq!(domain.context("motd"), Some(serde_json::json!("hello")));
        assert_eq!(domain.remove_context("motd"), Some(serde_json::json!("hello")));
        assert!(domain.context("motd").is_none());
    }

    #[test]
    fn test_unknown_cells() {
        let domain = Domain::new("empty");
        assert!(matches!(domain.kill("ghost"), Err(CellError::CellNotFound(_))));
        assert!(matches!(domain.export_cell("ghost"), Err(CellError::CellNotFound(_))));
        assert!(domain.cell_info("ghost").is_none());
        // nothing to wait for
        assert!(tokio_test::block_on(domain.join("ghost", None)));
    }

    struct Quiet;

    #[async_trait::async_trait]
    impl Cell for Quiet {
        async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
            Ok(None)
        }
    }

    #[tokio::test]
    async fn test_shutdown_releases_domain() {
        let domain = Domain::new("release");
        let cell = domain.spawn_cell("quiet", Arc::new(Quiet)).await.unwrap();
        assert!(Arc::strong_count(&domain.inner) > 1);
        drop(cell);

        assert!(domain.shutdown(Duration::from_secs(2)).await);
        // the last removal task drops its handle right after the cell is gone
        let released = async {
            while Arc::strong_count(&domain.inner) > 1 {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        };
        assert!(tokio::time::timeout(Duration::from_secs(2), released).await.is_ok());
    }
}
