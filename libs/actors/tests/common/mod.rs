//! Cells and helpers shared by the runtime integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use cell_runtime::{Cell, CellNucleus};
use cell_types::{Envelope, Message, RemoteError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

pub const WAIT: Duration = Duration::from_secs(2);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Replies with the message it received
pub struct Echo;

#[async_trait]
impl Cell for Echo {
    fn cell_type(&self) -> &str {
        "Echo"
    }

    async fn message_arrived(&self, _nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        Ok(envelope.message().cloned())
    }
}

/// Ignores everything; used as the sending side of requests
pub struct Idle;

#[async_trait]
impl Cell for Idle {
    async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        Ok(None)
    }
}

/// Reports every message it gets as `(cell name, envelope)`
pub struct Recorder {
    seen: mpsc::UnboundedSender<(String, Envelope)>,
}

impl Recorder {
    pub fn new(seen: mpsc::UnboundedSender<(String, Envelope)>) -> Self {
        Self { seen }
    }
}

#[async_trait]
impl Cell for Recorder {
    async fn message_arrived(&self, nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        let _ = self.seen.send((nucleus.name().to_string(), envelope.clone()));
        Ok(None)
    }
}

/// Reports error replies that no request was waiting for
pub struct Complaints {
    seen: mpsc::UnboundedSender<RemoteError>,
}

impl Complaints {
    pub fn new(seen: mpsc::UnboundedSender<RemoteError>) -> Self {
        Self { seen }
    }
}

#[async_trait]
impl Cell for Complaints {
    async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        Ok(None)
    }

    async fn exception_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope, error: RemoteError) {
        let _ = self.seen.send(error);
    }
}

/// Sleeps before answering
pub struct Slow {
    pub delay: Duration,
}

#[async_trait]
impl Cell for Slow {
    async fn message_arrived(&self, _nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        tokio::time::sleep(self.delay).await;
        Ok(envelope.message().cloned())
    }
}

/// Records the order in which hooks run
#[derive(Default)]
pub struct HookLog {
    pub calls: Mutex<Vec<&'static str>>,
}

impl HookLog {
    pub fn snapshot(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }
}

pub struct Lifecycle {
    pub log: Arc<HookLog>,
    pub fail_startup: bool,
}

#[async_trait]
impl Cell for Lifecycle {
    async fn prepare_startup(&self, _nucleus: &CellNucleus) -> anyhow::Result<()> {
        self.log.calls.lock().push("prepare_startup");
        if self.fail_startup {
            anyhow::bail!("missing resource");
        }
        Ok(())
    }

    async fn post_startup(&self, _nucleus: &CellNucleus) {
        self.log.calls.lock().push("post_startup");
    }

    async fn message_arrived(&self, _nucleus: &CellNucleus, _envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        self.log.calls.lock().push("message");
        Ok(None)
    }

    async fn last_message(&self, _nucleus: &CellNucleus) {
        self.log.calls.lock().push("last_message");
    }

    async fn prepare_removal(&self, _nucleus: &CellNucleus) {
        self.log.calls.lock().push("prepare_removal");
    }

    async fn post_removal(&self, _nucleus: &CellNucleus) {
        self.log.calls.lock().push("post_removal");
    }
}

/// Receive `count` items or fail after [`WAIT`]
pub async fn collect<T>(rx: &mut mpsc::UnboundedReceiver<T>, count: usize) -> Vec<T> {
    let mut items = Vec::with_capacity(count);
    while items.len() < count {
        match tokio::time::timeout(WAIT, rx.recv()).await {
            Ok(Some(item)) => items.push(item),
            _ => panic!("expected {count} items, got {}", items.len()),
        }
    }
    items
}

/// True if nothing arrives within `quiet`
pub async fn stays_quiet<T>(rx: &mut mpsc::UnboundedReceiver<T>, quiet: Duration) -> bool {
    tokio::time::timeout(quiet, rx.recv()).await.is_err()
}
