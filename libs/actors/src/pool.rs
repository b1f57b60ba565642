//! Worker Pools
//!
//! Each cell owns two [`WorkerPool`]s: one draining its mailbox and one
//! running reply callbacks. A fixed pool of one worker preserves submission
//! order; more workers trade order for parallelism. An elastic pool spawns a
//! task per job, bounded by a semaphore.
//!
//! Every job runs behind a panic guard: a panicking job is logged and the
//! worker moves on to the next one.
//!
//! [`WorkerTracker`] keeps the long-running tasks a cell starts for itself so
//! shutdown can wait for them and abort stragglers.

use crate::error::{CellError, Result};
use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use parking_lot::Mutex;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinHandle;
use tracing::{debug, error, trace, warn};

type Job = BoxFuture<'static, ()>;

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

async fn run_guarded(pool: &str, job: Job, active: &AtomicUsize) {
    active.fetch_add(1, Ordering::Relaxed);
    if let Err(panic) = AssertUnwindSafe(job).catch_unwind().await {
        error!(pool = %pool, panic = %panic_message(panic.as_ref()), "Worker job panicked");
    }
    active.fetch_sub(1, Ordering::Relaxed);
}

pub struct WorkerPool {
    name: String,
    sender: Mutex<Option<mpsc::UnboundedSender<Job>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    size: usize,
}

impl WorkerPool {
    /// `workers` tasks sharing one queue
    pub fn fixed(name: impl Into<String>, workers: usize) -> Self {
        let name = name.into();
        let workers = workers.max(1);
        let (tx, rx) = mpsc::unbounded_channel::<Job>();
        let rx = Arc::new(tokio::sync::Mutex::new(rx));
        let active = Arc::new(AtomicUsize::new(0));

        let handles = (0..workers)
            .map(|index| {
                let rx = rx.clone();
                let active = active.clone();
                let pool = name.clone();
                tokio::spawn(async move {
                    loop {
                        let job = { rx.lock().await.recv().await };
                        match job {
                            Some(job) => run_guarded(&pool, job, &active).await,
                            None => break,
                        }
                    }
                    trace!(pool = %pool, worker = index, "Worker exiting");
                })
            })
            .collect();

        Self {
            name,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(handles),
            active,
            size: workers,
        }
    }

    /// One task per job, at most `max_workers` at a time
    pub fn elastic(name: impl Into<String>, max_workers: usize) -> Self {
        let name = name.into();
        let max_workers = max_workers.max(1);
        let (tx, mut rx) = mpsc::unbounded_channel::<Job>();
        let active = Arc::new(AtomicUsize::new(0));
        let permits = Arc::new(Semaphore::new(max_workers));

        let dispatcher = {
            let active = active.clone();
            let pool = name.clone();
            tokio::spawn(async move {
                while let Some(job) = rx.recv().await {
                    let Ok(permit) = permits.clone().acquire_owned().await else {
                        break;
                    };
                    let active = active.clone();
                    let pool = pool.clone();
                    tokio::spawn(async move {
                        run_guarded(&pool, job, &active).await;
                        drop(permit);
                    });
                }
                // every permit back means every spawned job finished
                let _ = permits.acquire_many(max_workers as u32).await;
                trace!(pool = %pool, "Elastic dispatcher exiting");
            })
        };

        Self {
            name,
            sender: Mutex::new(Some(tx)),
            workers: Mutex::new(vec![dispatcher]),
            active,
            size: max_workers,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Fixed worker count, or the elastic bound
    pub fn size(&self) -> usize {
        self.size
    }

    /// Jobs running right now
    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::Relaxed)
    }

    pub fn is_shutdown(&self) -> bool {
        self.sender.lock().is_none()
    }

    fn submit(&self, job: Job) -> std::result::Result<(), Job> {
        match self.sender.lock().as_ref() {
            Some(tx) => tx.send(job).map_err(|rejected| rejected.0),
            None => Err(job),
        }
    }

    /// Queue a job; fails once the pool is shut down
    pub fn execute<F>(&self, job: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.submit(Box::pin(job))
            .map_err(|_| CellError::PoolClosed(self.name.clone()))
    }

    /// Queue a job, or run it as a detached task if the pool is shut down
    pub fn execute_or_spawn<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        if let Err(job) = self.submit(Box::pin(job)) {
            debug!(pool = %self.name, "Pool shut down, running job detached");
            let pool = self.name.clone();
            let active = self.active.clone();
            tokio::spawn(async move { run_guarded(&pool, job, &active).await });
        }
    }

    /// Stop accepting jobs and wait for queued ones to finish
    ///
    /// Returns false if the queue did not drain within `timeout`; the
    /// remaining workers are aborted in that case.
    pub async fn shutdown(&self, timeout: Duration) -> bool {
        self.sender.lock().take();
        let mut handles = std::mem::take(&mut *self.workers.lock());
        if handles.is_empty() {
            return true;
        }

        let drained = tokio::time::timeout(timeout, join_all(handles.iter_mut())).await.is_ok();
        if !drained {
            warn!(pool = %self.name, timeout_ms = timeout.as_millis() as u64, "Worker pool did not drain in time");
            for handle in &handles {
                handle.abort();
            }
        }
        drained
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        for handle in self.workers.lock().iter() {
            handle.abort();
        }
    }
}

struct TrackedWorker {
    name: String,
    handle: JoinHandle<()>,
}

/// Long-running tasks started by one cell
pub struct WorkerTracker {
    owner: String,
    next_id: AtomicU64,
    workers: Mutex<Vec<TrackedWorker>>,
}

impl WorkerTracker {
    pub fn new(owner: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            next_id: AtomicU64::new(0),
            workers: Mutex::new(Vec::new()),
        }
    }

    /// Spawn a tracked task; returns its name
    pub fn spawn<F>(&self, name: &str, task: F) -> String
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let worker = format!("{}-{}-{}", self.owner, name, id);
        let label = worker.clone();
        let handle = tokio::spawn(async move {
            if let Err(panic) = AssertUnwindSafe(task).catch_unwind().await {
                error!(worker = %label, panic = %panic_message(panic.as_ref()), "Cell worker panicked");
            }
        });

        let mut workers = self.workers.lock();
        workers.retain(|w| !w.handle.is_finished());
        workers.push(TrackedWorker {
            name: worker.clone(),
            handle,
        });
        worker
    }

    /// Names of tasks still running
    pub fn active_workers(&self) -> Vec<String> {
        let mut workers = self.workers.lock();
        workers.retain(|w| !w.handle.is_finished());
        workers.iter().map(|w| w.name.clone()).collect()
    }

    /// Abort every running task; returns how many were aborted
    pub fn interrupt_all(&self) -> usize {
        let workers = self.workers.lock();
        let mut interrupted = 0;
        for worker in workers.iter().filter(|w| !w.handle.is_finished()) {
            debug!(worker = %worker.name, "Interrupting cell worker");
            worker.handle.abort();
            interrupted += 1;
        }
        interrupted
    }

    /// Wait up to `grace` for every task to finish
    pub async fn join_all(&self, grace: Duration) -> bool {
        let mut workers = std::mem::take(&mut *self.workers.lock());
        let finished = tokio::time::timeout(grace, join_all(workers.iter_mut().map(|w| &mut w.handle)))
            .await
            .is_ok();
        if !finished {
            workers.retain(|w| !w.handle.is_finished());
            self.workers.lock().extend(workers);
        }
        finished
    }
}

impl Drop for WorkerTracker {
    fn drop(&mut self) {
        for worker in self.workers.lock().iter() {
            worker.handle.abort();
        }
    }
}
