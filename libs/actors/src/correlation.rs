//! Request/Reply Correlation
//!
//! Requests that expect an answer leave a [`CellLock`] in the sending cell's
//! [`CorrelationTable`], keyed by the request's id. A reply whose `last_uoid`
//! matches removes the entry and goes to the waiter instead of the mailbox.
//!
//! Removal is the only way an entry is consumed, so every request is
//! answered, failed or timed out exactly once no matter how replies, the
//! sweep and shutdown race.

use crate::context::DiagnosticContext;
use crate::error::CellError;
use cell_types::{Envelope, Uoid};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::oneshot;

/// Outcome delivered to closure-style reply handlers
#[derive(Debug)]
pub enum Answer {
    Reply(Envelope),
    Error(CellError),
    TimedOut,
}

/// Receives the outcome of a callback request
pub trait ReplyHandler: Send + Sync + 'static {
    fn answer_arrived(&self, request: &Envelope, answer: Envelope);

    fn exception_arrived(&self, request: &Envelope, error: CellError);

    fn answer_timed_out(&self, request: &Envelope);
}

impl<F> ReplyHandler for F
where
    F: Fn(&Envelope, Answer) + Send + Sync + 'static,
{
    fn answer_arrived(&self, request: &Envelope, answer: Envelope) {
        self(request, Answer::Reply(answer))
    }

    fn exception_arrived(&self, request: &Envelope, error: CellError) {
        self(request, Answer::Error(error))
    }

    fn answer_timed_out(&self, request: &Envelope) {
        self(request, Answer::TimedOut)
    }
}

/// Where a reply handler runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CallbackExecutor {
    /// The sending cell's callback pool
    #[default]
    CellPool,
    /// Directly on the task that resolved the request
    Inline,
}

pub(crate) enum Waiter {
    Sync(oneshot::Sender<Envelope>),
    Callback {
        handler: Arc<dyn ReplyHandler>,
        executor: CallbackExecutor,
    },
}

pub(crate) struct CellLock {
    pub(crate) request: Envelope,
    pub(crate) waiter: Waiter,
    pub(crate) deadline: Option<Instant>,
    pub(crate) context: DiagnosticContext,
}

impl CellLock {
    pub(crate) fn new(request: Envelope, waiter: Waiter, timeout: Duration, context: DiagnosticContext) -> Self {
        Self {
            request,
            waiter,
            deadline: Instant::now().checked_add(timeout),
            context,
        }
    }

    pub(crate) fn is_expired(&self, now: Instant) -> bool {
        self.deadline.is_some_and(|deadline| deadline <= now)
    }
}

/// Snapshot of one outstanding request
#[derive(Debug, Clone)]
pub struct PendingRequest {
    pub uoid: Uoid,
    pub destination: String,
    pub callback: bool,
    pub remaining: Option<Duration>,
}

#[derive(Default)]
pub(crate) struct CorrelationTable {
    locks: DashMap<Uoid, CellLock>,
}

impl CorrelationTable {
    pub(crate) fn insert(&self, uoid: Uoid, lock: CellLock) {
        self.locks.insert(uoid, lock);
    }

    pub(crate) fn remove(&self, uoid: &Uoid) -> Option<CellLock> {
        self.locks.remove(uoid).map(|(_, lock)| lock)
    }

    pub(crate) fn len(&self) -> usize {
        self.locks.len()
    }

    /// Remove and return every entry past its deadline
    pub(crate) fn take_expired(&self, now: Instant) -> Vec<CellLock> {
        let expired: Vec<Uoid> = self
            .locks
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| *entry.key())
            .collect();

        expired
            .into_iter()
            .filter_map(|uoid| self.locks.remove_if(&uoid, |_, lock| lock.is_expired(now)))
            .map(|(_, lock)| lock)
            .collect()
    }

    /// Remove and return every entry
    pub(crate) fn drain(&self) -> Vec<CellLock> {
        let keys: Vec<Uoid> = self.locks.iter().map(|entry| *entry.key()).collect();
        keys.into_iter().filter_map(|uoid| self.remove(&uoid)).collect()
    }

    pub(crate) fn pending(&self) -> Vec<PendingRequest> {
        let now = Instant::now();
        self.locks
            .iter()
            .map(|entry| {
                let lock = entry.value();
                PendingRequest {
                    uoid: *entry.key(),
                    destination: lock.request.destination_path().to_string(),
                    callback: matches!(lock.waiter, Waiter::Callback { .. }),
                    remaining: lock.deadline.map(|d| d.saturating_duration_since(now)),
                }
            })
            .collect()
    }
}
