//! Routes
//!
//! A [`Route`] maps a destination pattern to a gateway address. The kind
//! decides which store of the [`RoutingTable`](crate::RoutingTable) holds it
//! and how the destination is matched:
//!
//! | Kind       | Destination   | Matches                                   |
//! |------------|---------------|-------------------------------------------|
//! | Exact      | `cell@domain` | that address                              |
//! | WellKnown  | `cell`        | unqualified `cell`                        |
//! | Domain     | `*@domain`    | any cell in `domain`                      |
//! | Default    | `*@*`         | anything else                             |
//! | Dumpster   | `*@*`         | replies nobody can route                  |
//! | Alias      | `cell@domain` | like Exact, but rewrites the destination  |
//! | Queue      | `name`        | unqualified `name`, one consumer per send |
//! | Topic      | `name`        | unqualified `name`, every subscriber      |
//!
//! Routes compare equal when they occupy the same slot: same store and same
//! key. Topic routes additionally key on the gateway, so one topic can have
//! many subscribers.

use crate::error::{CellError, Result};
use cell_types::{Address, DOMAIN_WILDCARD};
use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum RouteType {
    Exact,
    WellKnown,
    Domain,
    Default,
    Dumpster,
    Alias,
    Queue,
    Topic,
}

impl RouteType {
    pub fn as_str(&self) -> &'static str {
        match self {
            RouteType::Exact => "exact",
            RouteType::WellKnown => "wellknown",
            RouteType::Domain => "domain",
            RouteType::Default => "default",
            RouteType::Dumpster => "dumpster",
            RouteType::Alias => "alias",
            RouteType::Queue => "queue",
            RouteType::Topic => "topic",
        }
    }
}

impl fmt::Display for RouteType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RouteType {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(RouteType::Exact),
            "wellknown" | "well-known" => Ok(RouteType::WellKnown),
            "domain" => Ok(RouteType::Domain),
            "default" => Ok(RouteType::Default),
            "dumpster" => Ok(RouteType::Dumpster),
            "alias" => Ok(RouteType::Alias),
            "queue" => Ok(RouteType::Queue),
            "topic" => Ok(RouteType::Topic),
            other => Err(CellError::Config(format!("unknown route type '{other}'"))),
        }
    }
}

/// Slot a route occupies in the routing table
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum RouteKey {
    Exact(Address),
    WellKnown(String),
    Domain(String),
    Default,
    Dumpster,
    Queue(String, Address),
    Topic(String, Address),
}

#[derive(Debug, Clone, Serialize)]
pub struct Route {
    kind: RouteType,
    destination: Address,
    gateway: Address,
}

impl Route {
    fn new(kind: RouteType, destination: Address, gateway: Address) -> Self {
        Self {
            kind,
            destination,
            gateway,
        }
    }

    pub fn exact(destination: Address, gateway: Address) -> Self {
        Self::new(RouteType::Exact, destination, gateway)
    }

    pub fn well_known(cell: &str, gateway: Address) -> Self {
        Self::new(RouteType::WellKnown, Address::local(cell), gateway)
    }

    pub fn domain(domain: &str, gateway: Address) -> Self {
        Self::new(RouteType::Domain, Address::for_domain(domain), gateway)
    }

    pub fn default_route(gateway: Address) -> Self {
        Self::new(RouteType::Default, wildcard(), gateway)
    }

    pub fn dumpster(gateway: Address) -> Self {
        Self::new(RouteType::Dumpster, wildcard(), gateway)
    }

    /// Sending to `destination` continues as if sent to `target`
    pub fn alias(destination: Address, target: Address) -> Self {
        Self::new(RouteType::Alias, destination, target)
    }

    pub fn queue(name: &str, consumer: Address) -> Self {
        Self::new(RouteType::Queue, Address::local(name), consumer)
    }

    pub fn topic(name: &str, subscriber: Address) -> Self {
        Self::new(RouteType::Topic, Address::local(name), subscriber)
    }

    /// Build a route from textual destination and gateway
    ///
    /// With `kind` left out the kind follows from the destination: `*` or
    /// `*@*` is the default route, `*@domain` a domain route, an unqualified
    /// name a well-known route and anything else an exact route.
    pub fn parse(kind: Option<RouteType>, destination: &str, gateway: &str) -> Result<Self> {
        let gateway = parse_address(gateway)?;
        let destination = parse_address(destination)?;
        let wildcard_domain = destination.domain_name() == DOMAIN_WILDCARD;

        let kind = match kind {
            Some(kind) => kind,
            None if destination.is_domain_address() && (wildcard_domain || destination.is_local()) => RouteType::Default,
            None if destination.is_domain_address() => RouteType::Domain,
            None if destination.is_local() => RouteType::WellKnown,
            None => RouteType::Exact,
        };

        let route = match kind {
            RouteType::Exact | RouteType::Alias => Self::new(kind, destination, gateway),
            RouteType::WellKnown | RouteType::Queue | RouteType::Topic => {
                Self::new(kind, Address::local(destination.cell_name()), gateway)
            }
            RouteType::Domain => Self::domain(destination.domain_name(), gateway),
            RouteType::Default => Self::default_route(gateway),
            RouteType::Dumpster => Self::dumpster(gateway),
        };
        Ok(route)
    }

    pub fn kind(&self) -> RouteType {
        self.kind
    }

    pub fn destination(&self) -> &Address {
        &self.destination
    }

    pub fn gateway(&self) -> &Address {
        &self.gateway
    }

    /// Name of the queue or topic this route serves
    pub fn channel_name(&self) -> &str {
        self.destination.cell_name()
    }

    pub fn key(&self) -> RouteKey {
        match self.kind {
            RouteType::Exact | RouteType::Alias => RouteKey::Exact(self.destination.clone()),
            RouteType::WellKnown => RouteKey::WellKnown(self.destination.cell_name().to_string()),
            RouteType::Domain => RouteKey::Domain(self.destination.domain_name().to_string()),
            RouteType::Default => RouteKey::Default,
            RouteType::Dumpster => RouteKey::Dumpster,
            RouteType::Queue => RouteKey::Queue(self.channel_name().to_string(), self.gateway.clone()),
            RouteType::Topic => RouteKey::Topic(self.channel_name().to_string(), self.gateway.clone()),
        }
    }

    /// True if the gateway names `cell` in `domain` or unqualified
    pub fn leads_to(&self, cell: &str, domain: &str) -> bool {
        self.gateway.cell_name() == cell && (self.gateway.is_local() || self.gateway.domain_name() == domain)
    }
}

fn wildcard() -> Address {
    Address::new(DOMAIN_WILDCARD, DOMAIN_WILDCARD)
}

fn parse_address(text: &str) -> Result<Address> {
    Address::parse(text).map_err(|e| CellError::Config(e.to_string()))
}

impl PartialEq for Route {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Route {}

impl Hash for Route {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.key().hash(state);
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:<9} {:<24} {}", self.kind.as_str(), self.destination.to_string(), self.gateway)
    }
}

/// Parses `[kind] destination gateway`
impl FromStr for Route {
    type Err = CellError;

    fn from_str(s: &str) -> Result<Self> {
        let parts: Vec<&str> = s.split_whitespace().collect();
        match parts.as_slice() {
            [destination, gateway] => Route::parse(None, destination, gateway),
            [kind, destination, gateway] => Route::parse(Some(kind.parse()?), destination, gateway),
            _ => Err(CellError::Config(format!("route '{s}' must be '[kind] destination gateway'"))),
        }
    }
}
