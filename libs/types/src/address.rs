//! Cell Addresses
//!
//! An [`Address`] names one cell inside one domain, written `name@domain`.
//!
//! Two forms carry special meaning:
//!
//! - **Unqualified** (`name` or `name@local`): the domain is the literal
//!   [`LOCAL_DOMAIN`] and resolution happens relative to the domain doing the
//!   routing.
//! - **Domain** (`*@domain`): the cell name is the wildcard [`DOMAIN_WILDCARD`]
//!   and the address stands for the domain itself rather than any one cell.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Domain name used by unqualified addresses
pub const LOCAL_DOMAIN: &str = "local";

/// Cell name used by domain addresses
pub const DOMAIN_WILDCARD: &str = "*";

/// Separator between cell name and domain name
pub const DOMAIN_SEPARATOR: char = '@';

/// Separator between addresses in a textual path
pub const PATH_SEPARATOR: char = ':';

/// Errors raised while parsing addresses and paths
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Nothing to parse
    #[error("address must not be empty")]
    Empty,

    /// The cell part before `@` is empty
    #[error("address '{input}' has an empty cell name")]
    EmptyCellName { input: String },

    /// A reserved separator appears inside a name
    #[error("address '{input}' contains reserved character '{character}'")]
    ReservedCharacter { input: String, character: char },
}

/// Location of a cell: a cell name qualified by a domain name
///
/// Equality, ordering and hashing consider both parts, so `a@local` and
/// `a@dom` are different addresses even when they end up naming the same cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Address {
    cell: String,
    domain: String,
}

impl Address {
    /// Build an address from its parts
    ///
    /// An empty domain is normalized to [`LOCAL_DOMAIN`].
    pub fn new(cell: impl Into<String>, domain: impl Into<String>) -> Self {
        let domain = domain.into();
        Self {
            cell: cell.into(),
            domain: if domain.is_empty() {
                LOCAL_DOMAIN.to_string()
            } else {
                domain
            },
        }
    }

    /// Unqualified address `cell@local`
    pub fn local(cell: impl Into<String>) -> Self {
        Self::new(cell, LOCAL_DOMAIN)
    }

    /// Domain address `*@domain`
    pub fn for_domain(domain: impl Into<String>) -> Self {
        Self::new(DOMAIN_WILDCARD, domain)
    }

    /// Parse `name` or `name@domain`
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(AddressError::Empty);
        }
        if input.contains(PATH_SEPARATOR) {
            return Err(AddressError::ReservedCharacter {
                input: input.to_string(),
                character: PATH_SEPARATOR,
            });
        }

        let (cell, domain) = match input.split_once(DOMAIN_SEPARATOR) {
            Some((cell, domain)) => (cell, domain),
            None => (input, LOCAL_DOMAIN),
        };

        if cell.is_empty() {
            return Err(AddressError::EmptyCellName {
                input: input.to_string(),
            });
        }
        if domain.contains(DOMAIN_SEPARATOR) {
            return Err(AddressError::ReservedCharacter {
                input: input.to_string(),
                character: DOMAIN_SEPARATOR,
            });
        }

        Ok(Self::new(cell, domain))
    }

    pub fn cell_name(&self) -> &str {
        &self.cell
    }

    pub fn domain_name(&self) -> &str {
        &self.domain
    }

    /// True for unqualified addresses (`name@local`)
    pub fn is_local(&self) -> bool {
        self.domain == LOCAL_DOMAIN
    }

    /// True for domain addresses (`*@domain`)
    pub fn is_domain_address(&self) -> bool {
        self.cell == DOMAIN_WILDCARD
    }

    /// Same cell name, qualified with `domain`
    pub fn qualified(&self, domain: &str) -> Self {
        Self::new(self.cell.clone(), domain)
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}{}", self.cell, DOMAIN_SEPARATOR, self.domain)
    }
}

impl FromStr for Address {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
