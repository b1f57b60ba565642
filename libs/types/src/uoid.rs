//! Unique message identifiers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

static NEXT_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Process-wide unique id of one envelope
///
/// Made of a monotonically increasing counter and the creation wall-clock
/// time in milliseconds. Replies carry the request's id as their
/// `last_uoid`, which is how waiters find their answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Uoid {
    timestamp_ms: u64,
    counter: u64,
}

impl Uoid {
    pub fn new() -> Self {
        let counter = NEXT_COUNTER.fetch_add(1, Ordering::Relaxed);
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default();
        Self {
            timestamp_ms,
            counter,
        }
    }

    pub fn counter(&self) -> u64 {
        self.counter
    }

    pub fn timestamp_ms(&self) -> u64 {
        self.timestamp_ms
    }
}

impl Default for Uoid {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for Uoid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}:{}>", self.timestamp_ms, self.counter)
    }
}
