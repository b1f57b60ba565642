//! Cell lifecycle states and status snapshots

use serde::Serialize;
use std::fmt;

/// Externally visible lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum CellState {
    Initial,
    Active,
    Removing,
    Dead,
}

impl fmt::Display for CellState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            CellState::Initial => "initial",
            CellState::Active => "active",
            CellState::Removing => "removing",
            CellState::Dead => "dead",
        };
        f.write_str(name)
    }
}

/// Internal lifecycle of a nucleus
///
/// ```text
/// New ──> Starting ──> Running ──> Stopping ──> Terminated
///              └──> Failed ─────────────┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Lifecycle {
    New,
    Starting,
    Running,
    Failed,
    Stopping,
    Terminated,
}

impl Lifecycle {
    pub(crate) fn public_state(self) -> CellState {
        match self {
            Lifecycle::New => CellState::Initial,
            Lifecycle::Starting | Lifecycle::Running => CellState::Active,
            Lifecycle::Failed | Lifecycle::Stopping => CellState::Removing,
            Lifecycle::Terminated => CellState::Dead,
        }
    }

    /// New inbound messages may be queued and callback requests will see
    /// a real answer
    pub(crate) fn is_accepting(self) -> bool {
        matches!(self, Lifecycle::New | Lifecycle::Starting | Lifecycle::Running)
    }
}

/// Status snapshot of one cell
#[derive(Debug, Clone, Serialize)]
pub struct CellInfo {
    pub name: String,
    pub domain: String,
    pub cell_type: String,
    pub state: CellState,
    pub created_at_ms: u64,
    /// Messages and callbacks waiting for a worker
    pub queue_size: usize,
    /// Queueing delay observed by the most recent delivery
    pub expected_queue_time_ms: u64,
    /// Requests waiting for an answer
    pub pending_requests: usize,
    /// Pool workers plus running cell-owned tasks
    pub thread_count: usize,
    /// Cell-provided one-line summary
    pub short_info: String,
}

impl fmt::Display for CellInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:<20} {:<8} {:<4} {:<16} {}",
            self.name, self.state, self.queue_size, self.cell_type, self.short_info
        )
    }
}
