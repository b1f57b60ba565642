//! Cell Nucleus
//!
//! The kernel half of a cell: mailbox, worker pools, correlation table and
//! lifecycle. The domain hands envelopes to [`CellNucleus::deliver`]; the
//! nucleus queues them on its delivery pool and calls into the [`Cell`].
//!
//! # Delivery Path
//!
//! ```text
//! Domain ──deliver()──┬─ reply with matching lock ──> waiter / callback pool
//!                     │
//!                     └─ otherwise ──> delivery pool ──> run_delivery()
//!                                          │
//!                          routed ─────────┼──> routed_message_arrived
//!                          more hops ──────┼──> message_to_forward
//!                          error payload ──┼──> exception_arrived
//!                          final ──────────┴──> message_arrived ──> auto reply
//! ```
//!
//! # Requests
//!
//! [`send_and_wait`](CellNucleus::send_and_wait) parks the caller on a
//! oneshot; [`send_with_callback`](CellNucleus::send_with_callback) hands the
//! answer to a [`ReplyHandler`]. Either way the request sits in the
//! correlation table until a reply, the periodic sweep or shutdown removes
//! it, and whoever removes it owns the outcome.
//!
//! # Shutdown
//!
//! Killing a cell stops new inbound messages, lets queued ones drain, runs
//! `last_message` and `prepare_removal` behind them, times out pending
//! requests, stops the pools, runs `post_removal`, joins (then aborts) the
//! cell's own workers and finally removes the cell from the domain.

use crate::cell::Cell;
use crate::context::DiagnosticContext;
use crate::correlation::{CallbackExecutor, CellLock, CorrelationTable, PendingRequest, ReplyHandler, Waiter};
use crate::error::{CellError, Result};
use crate::events::CellEventListener;
use crate::glue::Domain;
use crate::info::{CellInfo, CellState, Lifecycle};
use crate::pool::{panic_message, WorkerPool, WorkerTracker};
use cell_codec::{CodecRegistry, EnvelopeCodecExt};
use cell_config::CellSettings;
use cell_types::{Address, Envelope, Message, RemoteError};
use futures::FutureExt;
use parking_lot::{Mutex, RwLock};
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(millis)
        .unwrap_or(0)
}

pub struct CellNucleus {
    name: String,
    address: Address,
    cell_type: String,
    domain: Domain,
    cell: Arc<dyn Cell>,
    settings: CellSettings,
    created_at_ms: u64,
    state: RwLock<Lifecycle>,
    correlation: CorrelationTable,
    delivery: WorkerPool,
    callbacks: WorkerPool,
    workers: WorkerTracker,
    queue_size: AtomicUsize,
    last_queue_time_ms: AtomicU64,
    started: watch::Sender<bool>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    me: Weak<CellNucleus>,
}

impl CellNucleus {
    pub(crate) fn new(domain: Domain, name: String, cell: Arc<dyn Cell>, settings: CellSettings) -> Arc<Self> {
        let address = Address::new(name.clone(), domain.name());
        let cell_type = cell.cell_type().to_string();
        let delivery = WorkerPool::fixed(format!("{name}-delivery"), settings.delivery_workers);
        let callbacks = if settings.elastic_callbacks {
            WorkerPool::elastic(format!("{name}-callbacks"), settings.max_elastic_workers)
        } else {
            WorkerPool::fixed(format!("{name}-callbacks"), settings.callback_workers)
        };
        let (started, _) = watch::channel(false);

        Arc::new_cyclic(|me| Self {
            workers: WorkerTracker::new(name.clone()),
            name,
            address,
            cell_type,
            domain,
            cell,
            settings,
            created_at_ms: now_millis(),
            state: RwLock::new(Lifecycle::New),
            correlation: CorrelationTable::default(),
            delivery,
            callbacks,
            queue_size: AtomicUsize::new(0),
            last_queue_time_ms: AtomicU64::new(0),
            started,
            sweeper: Mutex::new(None),
            me: me.clone(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `name@domain`
    pub fn address(&self) -> &Address {
        &self.address
    }

    pub fn cell_type(&self) -> &str {
        &self.cell_type
    }

    pub fn domain(&self) -> &Domain {
        &self.domain
    }

    pub fn settings(&self) -> &CellSettings {
        &self.settings
    }

    pub fn state(&self) -> CellState {
        self.state.read().public_state()
    }

    pub fn queue_size(&self) -> usize {
        self.queue_size.load(Ordering::Acquire)
    }

    fn codecs(&self) -> &CodecRegistry {
        self.domain.codecs()
    }

    fn context_for(&self, envelope: &Envelope) -> DiagnosticContext {
        DiagnosticContext::new(&self.name, self.domain.name()).with_session(envelope.session())
    }

    fn invalid_state(&self, operation: &'static str) -> CellError {
        CellError::InvalidState {
            cell: self.name.clone(),
            operation,
            state: self.state().to_string(),
        }
    }

    // ─── Sending ──────────────────────────────────────────────────────────

    /// Stamp an outgoing envelope: our address on first send, and the
    /// current session if the envelope has none
    fn prepare_outgoing(&self, envelope: &mut Envelope) {
        if envelope.is_live() {
            envelope.add_source_address(self.address.clone());
        }
        if envelope.session().is_none() {
            if let Some(session) = DiagnosticContext::current_session() {
                envelope.set_session(session);
            }
        }
    }

    /// Fire and forget
    pub fn send(&self, envelope: Envelope) -> Result<()> {
        self.send_with(envelope, true, true)
    }

    /// Send with explicit local/remote resolution flags
    pub fn send_with(&self, mut envelope: Envelope, allow_local: bool, allow_remote: bool) -> Result<()> {
        self.prepare_outgoing(&mut envelope);
        self.domain.send_envelope(envelope, allow_local, allow_remote)
    }

    /// Answer `request` with `message` along its reversed source path
    pub fn reply(&self, request: &Envelope, message: Message) -> Result<()> {
        let mut reply = request.clone();
        reply.revert_direction();
        reply.set_message(message);
        self.send(reply)
    }

    /// Pass an envelope on to the next hop of its destination path
    ///
    /// Routing failures go back to the original sender as an error reply.
    pub fn forward(&self, mut envelope: Envelope) -> Result<()> {
        envelope.add_source_address(self.address.clone());
        envelope.encode_payload(self.codecs())?;
        self.domain.send_envelope(envelope, true, true)
    }

    /// Send and wait up to `timeout` for the reply
    ///
    /// Returns `Ok(None)` on timeout. An error payload in the reply comes
    /// back as [`CellError::Remote`].
    pub async fn send_and_wait(&self, envelope: Envelope, timeout: Duration) -> Result<Option<Envelope>> {
        self.send_and_wait_with(envelope, true, true, timeout).await
    }

    pub async fn send_and_wait_with(
        &self,
        mut envelope: Envelope,
        allow_local: bool,
        allow_remote: bool,
        timeout: Duration,
    ) -> Result<Option<Envelope>> {
        if *self.state.read() == Lifecycle::Terminated {
            return Err(self.invalid_state("send_and_wait"));
        }

        self.prepare_outgoing(&mut envelope);
        envelope.set_ttl(timeout);
        let uoid = envelope.uoid();
        let (tx, rx) = oneshot::channel();
        let lock = CellLock::new(envelope.clone(), Waiter::Sync(tx), timeout, self.context_for(&envelope));
        self.correlation.insert(uoid, lock);

        if let Err(e) = self.domain.send_envelope(envelope, allow_local, allow_remote) {
            self.correlation.remove(&uoid);
            return Err(e);
        }

        let mut reply = match tokio::time::timeout(timeout, rx).await {
            Ok(Ok(reply)) => reply,
            // lock removed by the sweep or by shutdown
            Ok(Err(_)) => return Ok(None),
            Err(_) => {
                self.correlation.remove(&uoid);
                debug!(cell = %self.name, uoid = %uoid, timeout_ms = millis(timeout), "Request timed out");
                return Ok(None);
            }
        };

        reply.destination_path_mut().next();
        reply.decode_payload(self.codecs())?;
        if let Some(error) = reply.message().and_then(Message::as_error) {
            return Err(CellError::from_remote(error.clone()));
        }
        Ok(Some(reply))
    }

    /// Like [`send_and_wait`](Self::send_and_wait) but a timeout is an error
    pub async fn request(&self, envelope: Envelope, timeout: Duration) -> Result<Envelope> {
        let uoid = envelope.uoid();
        self.send_and_wait(envelope, timeout)
            .await?
            .ok_or(CellError::Timeout {
                uoid,
                timeout_ms: millis(timeout),
            })
    }

    /// Send and hand the answer to `handler` on this cell's callback pool
    pub fn send_with_callback(&self, envelope: Envelope, handler: Arc<dyn ReplyHandler>, timeout: Duration) -> Result<()> {
        self.send_with_callback_on(envelope, true, true, handler, CallbackExecutor::CellPool, timeout)
    }

    /// Send and hand the answer to `handler`
    ///
    /// Routing failures are reported to the handler rather than returned;
    /// only encoding failures come back as `Err`. On a cell that is being
    /// removed the handler sees an immediate timeout.
    pub fn send_with_callback_on(
        &self,
        mut envelope: Envelope,
        allow_local: bool,
        allow_remote: bool,
        handler: Arc<dyn ReplyHandler>,
        executor: CallbackExecutor,
        timeout: Duration,
    ) -> Result<()> {
        let state = *self.state.read();
        if state == Lifecycle::Terminated {
            return Err(self.invalid_state("send_with_callback"));
        }

        self.prepare_outgoing(&mut envelope);
        envelope.set_ttl(timeout);
        let uoid = envelope.uoid();
        let lock = CellLock::new(
            envelope.clone(),
            Waiter::Callback { handler, executor },
            timeout,
            self.context_for(&envelope),
        );

        if !state.is_accepting() {
            self.time_out(lock);
            return Ok(());
        }

        self.correlation.insert(uoid, lock);
        match self.domain.send_envelope(envelope, allow_local, allow_remote) {
            Ok(()) => Ok(()),
            Err(e @ CellError::Codec(_)) => {
                self.correlation.remove(&uoid);
                Err(e)
            }
            Err(e) => {
                if let Some(lock) = self.correlation.remove(&uoid) {
                    self.fail(lock, e);
                }
                Ok(())
            }
        }
    }

    /// Outstanding requests of this cell
    pub fn pending_requests(&self) -> Vec<PendingRequest> {
        self.correlation.pending()
    }

    // ─── Inbound ──────────────────────────────────────────────────────────

    /// Queue an envelope for this cell; `routed` marks envelopes for which
    /// this cell is only a gateway
    pub(crate) fn deliver(&self, mut envelope: Envelope, routed: bool) {
        envelope.mark_received();

        if !routed && envelope.is_reply() {
            if let Some(lock) = envelope.last_uoid().and_then(|uoid| self.correlation.remove(&uoid)) {
                trace!(cell = %self.name, uoid = %envelope.uoid(), "Reply matches pending request");
                self.resolve(lock, envelope);
                return;
            }
        }

        let state = *self.state.read();
        if !state.is_accepting() {
            warn!(
                cell = %self.name,
                uoid = %envelope.uoid(),
                state = %state.public_state(),
                "Cell is not accepting messages, dropping"
            );
            return;
        }

        if self.queue_size.load(Ordering::Acquire) == 0 {
            self.last_queue_time_ms.store(0, Ordering::Relaxed);
        } else if self.settings.busy_fail_fast && !envelope.is_reply() {
            let queue_time_ms = self.last_queue_time_ms.load(Ordering::Relaxed);
            if envelope.ttl_ms() < queue_time_ms {
                self.reject_busy(&envelope, queue_time_ms);
            }
        }

        let Some(this) = self.me.upgrade() else {
            return;
        };
        let context = self.context_for(&envelope);
        self.queue_size.fetch_add(1, Ordering::AcqRel);
        let job = context.scope(async move { this.run_delivery(envelope, routed).await });
        if let Err(e) = self.delivery.execute(job) {
            self.queue_size.fetch_sub(1, Ordering::AcqRel);
            error!(cell = %self.name, error = %e, "Dropping message");
        }
    }

    /// Tell the sender we will not make its TTL; the message is still queued
    fn reject_busy(&self, request: &Envelope, queue_time_ms: u64) {
        let reason = format!(
            "{} is busy (its estimated response time of {} ms is longer than the message TTL of {} ms)",
            self.address,
            queue_time_ms,
            request.ttl_ms()
        );
        let error = RemoteError::no_route(reason).for_envelope(request.uoid(), request.destination_path().to_string());
        let mut notice = Envelope::new(request.source_path().reverse(), Message::Error(error));
        notice.set_last_uoid(request.uoid());
        notice.set_reply(true);
        if let Some(session) = request.session() {
            notice.set_session(session);
        }
        if let Err(e) = self.send(notice) {
            debug!(cell = %self.name, uoid = %request.uoid(), error = %e, "Failed to send busy notice");
        }
    }

    async fn run_delivery(self: Arc<Self>, envelope: Envelope, routed: bool) {
        self.queue_size.fetch_sub(1, Ordering::AcqRel);
        self.last_queue_time_ms
            .store(millis(envelope.local_age()), Ordering::Relaxed);

        if routed {
            self.cell.routed_message_arrived(&self, envelope).await;
        } else {
            self.dispatch(envelope).await;
        }
    }

    /// Run an envelope through this cell's message hooks as its addressee
    ///
    /// Advances the destination path, decodes the payload and either hands
    /// the envelope to [`Cell::message_to_forward`] or, at the end of the
    /// path, to [`Cell::message_arrived`] with the answer sent back as reply.
    pub async fn dispatch(&self, mut envelope: Envelope) {
        if !envelope.is_reply() && envelope.is_expired() {
            warn!(
                cell = %self.name,
                uoid = %envelope.uoid(),
                ttl_ms = envelope.ttl_ms(),
                age_ms = millis(envelope.local_age()),
                "Discarding expired message"
            );
            return;
        }

        envelope.destination_path_mut().next();
        if let Err(e) = envelope.decode_payload(self.codecs()) {
            warn!(cell = %self.name, uoid = %envelope.uoid(), error = %e, "Failed to decode message");
            if !envelope.is_reply() {
                self.return_error(envelope, CellError::from(e).to_remote());
            }
            return;
        }

        if !envelope.destination_path().is_exhausted() {
            self.cell.message_to_forward(self, envelope).await;
            return;
        }

        if let Some(error) = envelope.message().and_then(Message::as_error).cloned() {
            self.cell.exception_arrived(self, &envelope, error).await;
            return;
        }

        let outcome = AssertUnwindSafe(self.cell.message_arrived(self, &envelope))
            .catch_unwind()
            .await;

        match outcome {
            Ok(Ok(Some(answer))) => {
                if envelope.is_reply() {
                    debug!(cell = %self.name, uoid = %envelope.uoid(), "Ignoring answer to a reply");
                } else if let Err(e) = self.reply(&envelope, answer) {
                    warn!(cell = %self.name, uoid = %envelope.uoid(), error = %e, "Failed to send reply");
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => {
                warn!(cell = %self.name, uoid = %envelope.uoid(), error = %format!("{e:#}"), "Message handler failed");
                if !envelope.is_reply() {
                    let remote = e
                        .downcast_ref::<RemoteError>()
                        .cloned()
                        .unwrap_or_else(|| RemoteError::application(format!("{e:#}")));
                    self.return_error(envelope, remote);
                }
            }
            Err(panic) => {
                let failure = CellError::ActorPanic {
                    cell: self.name.clone(),
                    message: panic_message(panic.as_ref()),
                };
                error!(cell = %self.name, uoid = %envelope.uoid(), error = %failure, "Message handler panicked");
                if !envelope.is_reply() {
                    self.return_error(envelope, failure.to_remote());
                }
            }
        }
    }

    fn return_error(&self, mut request: Envelope, error: RemoteError) {
        let uoid = request.uoid();
        let path = request.destination_path().to_string();
        request.revert_direction();
        request.set_message(Message::Error(error.for_envelope(uoid, path)));
        if let Err(e) = self.send(request) {
            error!(cell = %self.name, uoid = %uoid, error = %e, "Failed to return error to sender");
        }
    }

    // ─── Correlation ──────────────────────────────────────────────────────

    fn resolve(&self, lock: CellLock, answer: Envelope) {
        let CellLock {
            request, waiter, context, ..
        } = lock;
        match waiter {
            Waiter::Sync(tx) => {
                if tx.send(answer).is_err() {
                    debug!(cell = %self.name, uoid = %request.uoid(), "Waiter gone, dropping reply");
                }
            }
            Waiter::Callback { handler, executor } => {
                let codecs = self.domain.codecs_handle();
                self.run_callback(executor, context, move || {
                    deliver_answer(&codecs, handler.as_ref(), &request, answer)
                });
            }
        }
    }

    fn time_out(&self, lock: CellLock) {
        let CellLock {
            request, waiter, context, ..
        } = lock;
        match waiter {
            // dropping the sender wakes the waiter without a reply
            Waiter::Sync(_) => {}
            Waiter::Callback { handler, executor } => {
                self.run_callback(executor, context, move || handler.answer_timed_out(&request));
            }
        }
    }

    fn fail(&self, lock: CellLock, error: CellError) {
        let CellLock {
            request, waiter, context, ..
        } = lock;
        if let Waiter::Callback { handler, executor } = waiter {
            self.run_callback(executor, context, move || handler.exception_arrived(&request, error));
        }
    }

    fn run_callback<F>(&self, executor: CallbackExecutor, context: DiagnosticContext, callback: F)
    where
        F: FnOnce() + Send + 'static,
    {
        match (executor, self.me.upgrade()) {
            (CallbackExecutor::CellPool, Some(this)) => {
                self.queue_size.fetch_add(1, Ordering::AcqRel);
                self.callbacks.execute_or_spawn(context.scope(async move {
                    this.queue_size.fetch_sub(1, Ordering::AcqRel);
                    callback();
                }));
            }
            _ => {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| context.enter(callback))) {
                    error!(cell = %self.name, panic = %panic_message(panic.as_ref()), "Reply handler panicked");
                }
            }
        }
    }

    /// Time out every request past its deadline; returns how many
    pub fn expire_requests(&self) -> usize {
        let expired = self.correlation.take_expired(Instant::now());
        let count = expired.len();
        for lock in expired {
            debug!(cell = %self.name, uoid = %lock.request.uoid(), "Request expired");
            self.time_out(lock);
        }
        count
    }

    fn start_sweeper(&self) {
        let weak = self.me.clone();
        let period = self.settings.sweep_interval();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            // first tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let Some(nucleus) = weak.upgrade() else {
                    break;
                };
                let expired = nucleus.expire_requests();
                if expired > 0 {
                    trace!(cell = %nucleus.name, expired, "Swept expired requests");
                }
            }
        });
        if let Some(previous) = self.sweeper.lock().replace(handle) {
            previous.abort();
        }
    }

    // ─── Workers ──────────────────────────────────────────────────────────

    /// Start a long-running task owned by this cell
    ///
    /// Shutdown waits for it up to the configured grace period and then
    /// aborts it.
    pub fn spawn_worker<F>(&self, name: &str, task: F) -> String
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let context = DiagnosticContext::new(&self.name, self.domain.name());
        self.workers.spawn(name, context.scope(task))
    }

    pub fn active_workers(&self) -> Vec<String> {
        self.workers.active_workers()
    }

    /// Abort every task started with [`spawn_worker`](Self::spawn_worker)
    pub fn interrupt_all(&self) -> usize {
        self.workers.interrupt_all()
    }

    pub fn add_event_listener(&self, listener: Arc<dyn CellEventListener>) {
        self.domain.add_event_listener(&self.name, listener);
    }

    /// Kill this cell
    pub fn kill(&self) -> Result<()> {
        self.domain.kill_from(&self.name, &self.name)
    }

    /// Kill another cell of this domain, recording this cell as the killer
    pub fn kill_cell(&self, name: &str) -> Result<()> {
        self.domain.kill_from(name, &self.name)
    }

    pub fn info(&self) -> CellInfo {
        let queue_size = self.queue_size();
        let expected_queue_time_ms = if queue_size == 0 {
            0
        } else {
            self.last_queue_time_ms.load(Ordering::Relaxed)
        };
        CellInfo {
            name: self.name.clone(),
            domain: self.domain.name().to_string(),
            cell_type: self.cell_type.clone(),
            state: self.state(),
            created_at_ms: self.created_at_ms,
            queue_size,
            expected_queue_time_ms,
            pending_requests: self.correlation.len(),
            thread_count: self.delivery.size() + self.callbacks.size() + self.workers.active_workers().len(),
            short_info: self.cell.short_info(),
        }
    }

    // ─── Lifecycle ────────────────────────────────────────────────────────

    /// Run the startup hooks on the delivery pool
    pub(crate) async fn start(&self) -> Result<()> {
        *self.state.write() = Lifecycle::Starting;
        let this = self.me.upgrade().ok_or_else(|| self.invalid_state("start"))?;

        let (tx, rx) = oneshot::channel();
        let context = DiagnosticContext::new(&self.name, self.domain.name());
        self.delivery.execute(context.scope(async move {
            let outcome = match AssertUnwindSafe(this.cell.prepare_startup(&this)).catch_unwind().await {
                Ok(Ok(())) => {
                    this.guarded("post_startup", this.cell.post_startup(&this)).await;
                    Ok(())
                }
                Ok(Err(e)) => Err(format!("{e:#}")),
                Err(panic) => Err(panic_message(panic.as_ref())),
            };
            let _ = tx.send(outcome);
        }))?;

        let outcome = rx
            .await
            .unwrap_or_else(|_| Err("startup task aborted".to_string()));

        match outcome {
            Ok(()) => {
                {
                    let mut state = self.state.write();
                    if *state == Lifecycle::Starting {
                        *state = Lifecycle::Running;
                    }
                }
                self.started.send_replace(true);
                self.start_sweeper();
                info!(cell = %self.name, cell_type = %self.cell_type, "Cell started");
                Ok(())
            }
            Err(message) => {
                *self.state.write() = Lifecycle::Failed;
                self.started.send_replace(true);
                error!(cell = %self.name, error = %message, "Cell failed to start");
                if let Err(e) = self.domain.kill_from(&self.name, &self.name) {
                    debug!(cell = %self.name, error = %e, "Failed cell already gone");
                }
                Err(CellError::StartupFailed {
                    cell: self.name.clone(),
                    message,
                })
            }
        }
    }

    async fn guarded<F: Future<Output = ()>>(&self, hook: &'static str, future: F) {
        if let Err(panic) = AssertUnwindSafe(future).catch_unwind().await {
            error!(cell = %self.name, hook, panic = %panic_message(panic.as_ref()), "Cell hook panicked");
        }
    }

    pub(crate) async fn shutdown(self: Arc<Self>, killer: String) {
        let mut started = self.started.subscribe();
        if tokio::time::timeout(self.settings.startup_wait(), started.wait_for(|done| *done))
            .await
            .is_err()
        {
            warn!(cell = %self.name, "Startup still running, removing anyway");
        }

        *self.state.write() = Lifecycle::Stopping;
        info!(cell = %self.name, killer = %killer, "Removing cell");
        if let Some(sweeper) = self.sweeper.lock().take() {
            sweeper.abort();
        }

        // queued behind every message accepted before the kill
        let (tx, rx) = oneshot::channel();
        let this = self.clone();
        let context = DiagnosticContext::new(&self.name, self.domain.name());
        let removal = context.scope(async move {
            this.guarded("last_message", this.cell.last_message(&this)).await;
            this.guarded("prepare_removal", this.cell.prepare_removal(&this)).await;
            let _ = tx.send(());
        });
        match self.delivery.execute(removal) {
            Ok(()) => {
                let _ = rx.await;
            }
            Err(e) => warn!(cell = %self.name, error = %e, "Skipping removal hooks"),
        }

        for lock in self.correlation.drain() {
            self.time_out(lock);
        }

        let grace = self.settings.pool_shutdown();
        if !self.delivery.shutdown(grace).await {
            warn!(cell = %self.name, "Delivery pool did not stop in time");
        }
        if !self.callbacks.shutdown(grace).await {
            warn!(cell = %self.name, "Callback pool did not stop in time");
        }

        self.guarded("post_removal", self.cell.post_removal(&self)).await;

        let grace = self.settings.shutdown_grace();
        if !self.workers.join_all(grace).await {
            let interrupted = self.workers.interrupt_all();
            warn!(cell = %self.name, interrupted, "Cell workers did not stop in time");
            let _ = self.workers.join_all(grace).await;
        }

        *self.state.write() = Lifecycle::Terminated;
        self.domain.destroy(&self.name);
        info!(cell = %self.name, "Cell removed");
    }
}

fn deliver_answer(codecs: &CodecRegistry, handler: &dyn ReplyHandler, request: &Envelope, mut answer: Envelope) {
    answer.destination_path_mut().next();
    if let Err(e) = answer.decode_payload(codecs) {
        handler.exception_arrived(request, CellError::Codec(e));
        return;
    }
    match answer.message().and_then(Message::as_error).cloned() {
        Some(error) => handler.exception_arrived(request, CellError::from_remote(error)),
        None => handler.answer_arrived(request, answer),
    }
}

impl std::fmt::Debug for CellNucleus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CellNucleus")
            .field("name", &self.name)
            .field("domain", &self.domain.name())
            .field("cell_type", &self.cell_type)
            .field("state", &self.state())
            .finish()
    }
}
