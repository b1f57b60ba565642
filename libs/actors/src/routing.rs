//! Routing Table
//!
//! Holds the routes of one domain in per-kind stores. All stores are
//! concurrent maps, so lookups on the send path never block behind route
//! updates.
//!
//! # Lookup Order
//!
//! For an unqualified address: well-known, then queue. For a qualified
//! address: exact, then domain (remote resolution only). Both then retry
//! the exact store, which is where aliases of unqualified names live, and
//! fall back to the default route (remote resolution only).
//!
//! Topic routes are never returned by [`RoutingTable::find`]; the domain
//! fans out to them separately via [`RoutingTable::find_topic_routes`].

use crate::error::{CellError, Result};
use crate::route::{Route, RouteType};
use cell_types::Address;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicUsize, Ordering};

#[derive(Debug, Default)]
pub struct RoutingTable {
    exact: DashMap<Address, Route>,
    well_known: DashMap<String, Route>,
    domains: DashMap<String, Route>,
    queues: DashMap<String, Vec<Route>>,
    topics: DashMap<String, Vec<Route>>,
    default: Mutex<Option<Route>>,
    dumpster: Mutex<Option<Route>>,
    queue_turn: AtomicUsize,
}

fn duplicate(route: &Route) -> CellError {
    CellError::DuplicateRoute {
        route: route.to_string(),
    }
}

fn not_found(route: &Route) -> CellError {
    CellError::RouteNotFound {
        route: route.to_string(),
    }
}

fn insert_unique<K: Eq + Hash>(map: &DashMap<K, Route>, key: K, route: Route) -> Result<()> {
    match map.entry(key) {
        Entry::Occupied(_) => Err(duplicate(&route)),
        Entry::Vacant(slot) => {
            slot.insert(route);
            Ok(())
        }
    }
}

fn push_unique(map: &DashMap<String, Vec<Route>>, route: Route) -> Result<()> {
    let mut routes = map.entry(route.channel_name().to_string()).or_default();
    if routes.contains(&route) {
        return Err(duplicate(&route));
    }
    routes.push(route);
    Ok(())
}

fn remove_member(map: &DashMap<String, Vec<Route>>, route: &Route) -> Option<Route> {
    let name = route.channel_name();
    let removed = map.get_mut(name).and_then(|mut routes| {
        let index = routes.iter().position(|r| r == route)?;
        Some(routes.remove(index))
    });
    map.remove_if(name, |_, routes| routes.is_empty());
    removed
}

fn set_slot(slot: &Mutex<Option<Route>>, route: Route) -> Result<()> {
    let mut slot = slot.lock();
    if slot.is_some() {
        return Err(duplicate(&route));
    }
    *slot = Some(route);
    Ok(())
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a route; fails if its slot is taken
    pub fn add(&self, route: Route) -> Result<()> {
        match route.kind() {
            RouteType::Exact | RouteType::Alias => insert_unique(&self.exact, route.destination().clone(), route),
            RouteType::WellKnown => {
                let key = route.destination().cell_name().to_string();
                insert_unique(&self.well_known, key, route)
            }
            RouteType::Domain => {
                let key = route.destination().domain_name().to_string();
                insert_unique(&self.domains, key, route)
            }
            RouteType::Default => set_slot(&self.default, route),
            RouteType::Dumpster => set_slot(&self.dumpster, route),
            RouteType::Queue => push_unique(&self.queues, route),
            RouteType::Topic => push_unique(&self.topics, route),
        }
    }

    /// Remove the route occupying `route`'s slot and return it
    pub fn delete(&self, route: &Route) -> Result<Route> {
        let removed = match route.kind() {
            RouteType::Exact | RouteType::Alias => self.exact.remove(route.destination()).map(|(_, r)| r),
            RouteType::WellKnown => self.well_known.remove(route.destination().cell_name()).map(|(_, r)| r),
            RouteType::Domain => self.domains.remove(route.destination().domain_name()).map(|(_, r)| r),
            RouteType::Default => self.default.lock().take(),
            RouteType::Dumpster => self.dumpster.lock().take(),
            RouteType::Queue => remove_member(&self.queues, route),
            RouteType::Topic => remove_member(&self.topics, route),
        };
        removed.ok_or_else(|| not_found(route))
    }

    /// Route for `address`, or `None`
    ///
    /// With `allow_remote` unset, domain and default routes are skipped.
    pub fn find(&self, address: &Address, allow_remote: bool) -> Option<Route> {
        if address.is_local() {
            if let Some(route) = self.well_known.get(address.cell_name()) {
                return Some(route.clone());
            }
            if let Some(route) = self.next_consumer(address.cell_name()) {
                return Some(route);
            }
        } else {
            if let Some(route) = self.exact.get(address) {
                return Some(route.clone());
            }
            if allow_remote {
                if let Some(route) = self.domains.get(address.domain_name()) {
                    return Some(route.clone());
                }
            }
        }

        if let Some(route) = self.exact.get(address) {
            return Some(route.clone());
        }
        if allow_remote {
            return self.default.lock().clone();
        }
        None
    }

    /// Consumers of a queue take turns
    fn next_consumer(&self, name: &str) -> Option<Route> {
        let consumers = self.queues.get(name)?;
        if consumers.is_empty() {
            return None;
        }
        let turn = self.queue_turn.fetch_add(1, Ordering::Relaxed);
        Some(consumers[turn % consumers.len()].clone())
    }

    /// Subscribers of the topic named by an unqualified address
    pub fn find_topic_routes(&self, address: &Address) -> Vec<Route> {
        if !address.is_local() {
            return Vec::new();
        }
        self.topics
            .get(address.cell_name())
            .map(|routes| routes.clone())
            .unwrap_or_default()
    }

    pub fn dumpster(&self) -> Option<Route> {
        self.dumpster.lock().clone()
    }

    pub fn default_route(&self) -> Option<Route> {
        self.default.lock().clone()
    }

    /// Every route, ordered by kind, destination and gateway
    pub fn routes(&self) -> Vec<Route> {
        let mut routes: Vec<Route> = Vec::new();
        routes.extend(self.exact.iter().map(|e| e.value().clone()));
        routes.extend(self.well_known.iter().map(|e| e.value().clone()));
        routes.extend(self.domains.iter().map(|e| e.value().clone()));
        routes.extend(self.queues.iter().flat_map(|e| e.value().clone()));
        routes.extend(self.topics.iter().flat_map(|e| e.value().clone()));
        routes.extend(self.default.lock().clone());
        routes.extend(self.dumpster.lock().clone());
        routes.sort_by(|a, b| {
            (a.kind(), a.destination(), a.gateway()).cmp(&(b.kind(), b.destination(), b.gateway()))
        });
        routes
    }

    /// Routes whose gateway is `cell` (unqualified or in `domain`)
    pub fn routes_to(&self, cell: &str, domain: &str) -> Vec<Route> {
        self.routes()
            .into_iter()
            .filter(|route| route.leads_to(cell, domain))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.routes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for RoutingTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<9} {:<24} {}", "TYPE", "DESTINATION", "GATEWAY")?;
        for route in self.routes() {
            writeln!(f, "{route}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[test]
    fn test_duplicate_rejected() {
        let table = RoutingTable::new();
        table.add(Route::well_known("pool", addr("t1"))).unwrap();
        let err = table.add(Route::well_known("pool", addr("t2"))).unwrap_err();
        assert!(matches!(err, CellError::DuplicateRoute { .. }));

        table.add(Route::default_route(addr("t1"))).unwrap();
        assert!(table.add(Route::default_route(addr("t2"))).is_err());
    }

    #[test]
    fn test_unqualified_lookup() {
        let table = RoutingTable::new();
        table.add(Route::well_known("pool", addr("t1"))).unwrap();
        table.add(Route::default_route(addr("t9"))).unwrap();

        assert_eq!(table.find(&addr("pool"), true).unwrap().gateway(), &addr("t1"));
        assert_eq!(table.find(&addr("other"), true).unwrap().kind(), RouteType::Default);
        assert!(table.find(&addr("other"), false).is_none());
    }

    #[test]
    fn test_qualified_lookup() {
        let table = RoutingTable::new();
        table.add(Route::exact(addr("pool@d2"), addr("t1"))).unwrap();
        table.add(Route::domain("d2", addr("t2"))).unwrap();

        assert_eq!(table.find(&addr("pool@d2"), false).unwrap().gateway(), &addr("t1"));
        assert_eq!(table.find(&addr("door@d2"), true).unwrap().gateway(), &addr("t2"));
        assert!(table.find(&addr("door@d2"), false).is_none());
    }

    #[test]
    fn test_alias_of_unqualified_name() {
        let table = RoutingTable::new();
        table.add(Route::alias(addr("old"), addr("new@d1"))).unwrap();
        let route = table.find(&addr("old"), false).unwrap();
        assert_eq!(route.kind(), RouteType::Alias);
        assert_eq!(route.gateway(), &addr("new@d1"));
    }

    #[test]
    fn test_queue_consumers_take_turns() {
        let table = RoutingTable::new();
        table.add(Route::queue("jobs", addr("w1"))).unwrap();
        table.add(Route::queue("jobs", addr("w2"))).unwrap();

        let first = table.find(&addr("jobs"), false).unwrap();
        let second = table.find(&addr("jobs"), false).unwrap();
        assert_ne!(first.gateway(), second.gateway());
    }

    #[test]
    fn test_topics_not_returned_by_find() {
        let table = RoutingTable::new();
        table.add(Route::topic("news", addr("r1"))).unwrap();
        table.add(Route::topic("news", addr("r2"))).unwrap();

        assert!(table.find(&addr("news"), true).is_none());
        assert_eq!(table.find_topic_routes(&addr("news")).len(), 2);
        assert!(table.find_topic_routes(&addr("news@d1")).is_empty());
    }

    #[test]
    fn test_delete() {
        let table = RoutingTable::new();
        let topic = Route::topic("news", addr("r1"));
        table.add(topic.clone()).unwrap();
        table.add(Route::dumpster(addr("bin"))).unwrap();

        assert_eq!(table.delete(&topic).unwrap(), topic);
        assert!(table.find_topic_routes(&addr("news")).is_empty());
        assert!(matches!(table.delete(&topic), Err(CellError::RouteNotFound { .. })));

        assert!(table.delete(&Route::dumpster(addr("other"))).is_ok());
        assert!(table.dumpster().is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_routes_to_gateway() {
        let table = RoutingTable::new();
        table.add(Route::domain("d2", addr("tunnel"))).unwrap();
        table.add(Route::default_route(addr("tunnel@d1"))).unwrap();
        table.add(Route::well_known("pool", addr("other"))).unwrap();

        assert_eq!(table.routes_to("tunnel", "d1").len(), 2);
        assert_eq!(table.len(), 3);
    }

    proptest! {
        #[test]
        fn prop_queue_turns_are_balanced(consumers in 1usize..8, rounds in 1usize..20) {
            let table = RoutingTable::new();
            for i in 0..consumers {
                table.add(Route::queue("jobs", Address::local(format!("w{i}")))).unwrap();
            }

            let mut served = std::collections::HashMap::new();
            for _ in 0..consumers * rounds {
                let route = table.find(&addr("jobs"), false).unwrap();
                *served.entry(route.gateway().clone()).or_insert(0usize) += 1;
            }
            prop_assert_eq!(served.len(), consumers);
            prop_assert!(served.values().all(|&n| n == rounds));
        }
    }
}
