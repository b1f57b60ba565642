//! Standalone cell domain
//!
//! Starts one domain with an echo cell and runs until Ctrl-C.

use anyhow::{Context, Result};
use async_trait::async_trait;
use cell_config::{init_tracing, DomainConfig};
use cell_runtime::{Cell, CellNucleus, Domain, Route};
use cell_types::{Address, Envelope, Message};
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "cell-domain")]
#[command(about = "Run a single cell domain with an echo cell")]
struct Cli {
    /// Configuration file (defaults to config/domain.toml if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Domain name, overrides the configuration
    #[arg(short, long)]
    domain: Option<String>,

    /// Log filter, overrides the configuration
    #[arg(long)]
    log_level: Option<String>,

    /// Log as JSON lines
    #[arg(long)]
    json: bool,

    /// Seconds to wait for cells to stop on exit
    #[arg(long, default_value_t = 10)]
    shutdown_timeout: u64,
}

/// Answers pings with pongs and echoes everything else
#[derive(Default)]
struct EchoCell {
    answered: AtomicU64,
}

#[async_trait]
impl Cell for EchoCell {
    fn cell_type(&self) -> &str {
        "Echo"
    }

    fn short_info(&self) -> String {
        format!("answered={}", self.answered.load(Ordering::Relaxed))
    }

    async fn message_arrived(&self, _nucleus: &CellNucleus, envelope: &Envelope) -> anyhow::Result<Option<Message>> {
        self.answered.fetch_add(1, Ordering::Relaxed);
        let answer = match envelope.message() {
            Some(Message::Ping { sequence, sent_at_ms }) => Message::Pong {
                sequence: *sequence,
                sent_at_ms: *sent_at_ms,
            },
            Some(other) => other.clone(),
            None => Message::Empty,
        };
        Ok(Some(answer))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = DomainConfig::load(cli.config.as_deref()).context("Failed to load domain configuration")?;
    if let Some(name) = cli.domain {
        config.domain.name = name;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
    }
    config.logging.json |= cli.json;
    init_tracing(&config.logging)?;

    let domain = Domain::with_config(&config).context("Failed to create domain")?;
    let echo = domain
        .spawn_cell("echo", Arc::new(EchoCell::default()))
        .await
        .context("Failed to start echo cell")?;
    domain
        .route_add(Route::well_known("echo", echo.address().clone()))
        .context("Failed to register echo route")?;

    // one self-check so a broken setup shows up at start
    let sent_at_ms = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0);
    let ping = Envelope::to(Address::local("echo"), Message::Ping { sequence: 0, sent_at_ms });
    match echo.send_and_wait(ping, Duration::from_secs(1)).await {
        Ok(Some(_)) => info!(domain = %domain.name(), "Echo cell answering"),
        Ok(None) => warn!(domain = %domain.name(), "Echo self-check timed out"),
        Err(e) => warn!(domain = %domain.name(), error = %e, "Echo self-check failed"),
    }

    for cell in domain.cell_infos() {
        info!(domain = %domain.name(), "{cell}");
    }
    info!(domain = %domain.name(), routes = domain.routes().len(), "Domain running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for Ctrl-C")?;

    if !domain
        .shutdown(Duration::from_secs(cli.shutdown_timeout))
        .await
    {
        warn!(domain = %domain.name(), "Some cells did not stop in time");
    }
    info!(domain = %domain.name(), "Domain stopped");
    Ok(())
}
