//! Cell Paths
//!
//! A [`CellPath`] is an ordered list of [`Address`]es plus a cursor naming
//! the current hop. Envelopes carry two of them: the destination path (where
//! the envelope is going, cursor at the next hop) and the source path (where
//! it has been, appended to at every send and routed delivery).
//!
//! # Cursor
//!
//! The cursor starts at `-1` for an empty path and at `0` once the first
//! address is added. Advancing past the last address leaves the cursor at
//! `len`, the *exhausted* position, where there is no current hop.

use crate::address::{Address, AddressError, PATH_SEPARATOR};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellPath {
    hops: Vec<Address>,
    position: isize,
}

impl Default for CellPath {
    fn default() -> Self {
        Self::new()
    }
}

impl CellPath {
    /// Empty path with the cursor at `-1`
    pub fn new() -> Self {
        Self {
            hops: Vec::new(),
            position: -1,
        }
    }

    /// Single-hop path
    pub fn from_address(address: Address) -> Self {
        Self {
            hops: vec![address],
            position: 0,
        }
    }

    /// Parse `a@d1:b:c@d2`; the cursor points at the first address
    pub fn parse(input: &str) -> Result<Self, AddressError> {
        let hops = input
            .split(PATH_SEPARATOR)
            .map(Address::parse)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { hops, position: 0 })
    }

    /// Append an address at the end
    pub fn add(&mut self, address: Address) {
        self.hops.push(address);
        if self.position < 0 {
            self.position = 0;
        }
    }

    /// Insert an address at the cursor so it becomes the current hop
    pub fn insert(&mut self, address: Address) {
        if self.position < 0 {
            self.position = 0;
        }
        let at = (self.position as usize).min(self.hops.len());
        self.hops.insert(at, address);
    }

    /// Advance the cursor; returns true if there is a new current hop
    pub fn next(&mut self) -> bool {
        let len = self.hops.len() as isize;
        if self.position < len {
            self.position += 1;
        }
        self.position < len
    }

    /// Address under the cursor
    pub fn current(&self) -> Option<&Address> {
        if self.position < 0 {
            return None;
        }
        self.hops.get(self.position as usize)
    }

    /// Replace the address under the cursor; returns false when there is none
    pub fn replace_current(&mut self, address: Address) -> bool {
        if self.position < 0 {
            return false;
        }
        match self.hops.get_mut(self.position as usize) {
            Some(slot) => {
                *slot = address;
                true
            }
            None => false,
        }
    }

    /// True when the cursor sits on the last address or past it
    pub fn is_final_destination(&self) -> bool {
        self.position >= self.hops.len() as isize - 1
    }

    /// True when the cursor has moved past the last address
    pub fn is_exhausted(&self) -> bool {
        !self.hops.is_empty() && self.position >= self.hops.len() as isize
    }

    /// First address of the path
    pub fn source(&self) -> Option<&Address> {
        self.hops.first()
    }

    /// Last address of the path
    pub fn destination(&self) -> Option<&Address> {
        self.hops.last()
    }

    pub fn hops(&self) -> usize {
        self.hops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hops.is_empty()
    }

    pub fn position(&self) -> isize {
        self.position
    }

    pub fn addresses(&self) -> &[Address] {
        &self.hops
    }

    /// Reversed path for replies, cursor at `0`
    ///
    /// After reversal every domain address `*@D` that is immediately followed
    /// by an address in domain `D` is dropped: the following hop already
    /// takes the envelope into `D`.
    pub fn reverse(&self) -> CellPath {
        let reversed: Vec<&Address> = self.hops.iter().rev().collect();
        let mut hops = Vec::with_capacity(reversed.len());

        for (i, address) in reversed.iter().enumerate() {
            let redundant = address.is_domain_address()
                && reversed
                    .get(i + 1)
                    .is_some_and(|next| next.domain_name() == address.domain_name());
            if !redundant {
                hops.push((*address).clone());
            }
        }

        let position = if hops.is_empty() { -1 } else { 0 };
        CellPath { hops, position }
    }
}

impl From<Address> for CellPath {
    fn from(address: Address) -> Self {
        Self::from_address(address)
    }
}

impl fmt::Display for CellPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, hop) in self.hops.iter().enumerate() {
            if i > 0 {
                write!(f, "{PATH_SEPARATOR}")?;
            }
            write!(f, "{hop}")?;
        }
        Ok(())
    }
}

impl FromStr for CellPath {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
