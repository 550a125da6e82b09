//! # chatpush
//!
//! Notification server binary: loads settings, installs logging, and serves
//! the WebSocket push endpoints until interrupted.

#![deny(unsafe_code)]

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use chatpush_server::ChatServer;
use chatpush_settings::{load_settings, load_settings_from_path, ChatpushSettings, LoadedSettings};
use chatpush_telemetry::{init_telemetry, TelemetryConfig};
use tracing::{info, warn};

const DEV_HOST: &str = "0.0.0.0";
const DEV_PORT: u16 = 8080;

/// Real-time chat notification server.
#[derive(Parser, Debug)]
#[command(name = "chatpush", version, about = "Real-time chat notification server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (defaults to `~/.chatpush/settings.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Log level filter, e.g. `debug` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Development mode: bind 0.0.0.0:8080 with human-readable `info` logs.
    #[arg(long)]
    dev: bool,
}

impl Cli {
    /// Layer command-line flags over loaded settings. Explicit flags beat `--dev`.
    fn apply(&self, settings: &mut ChatpushSettings) {
        if self.dev {
            settings.server.host = DEV_HOST.into();
            settings.server.port = DEV_PORT;
            settings.logging.level = "info".into();
            settings.logging.json = false;
        }
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let LoadedSettings {
        mut settings,
        rejected,
    } = match &cli.config {
        Some(path) => load_settings_from_path(path)
            .with_context(|| format!("failed to load settings from {}", path.display()))?,
        None => load_settings().context("failed to load settings")?,
    };
    cli.apply(&mut settings);

    init_telemetry(&TelemetryConfig::from_level_name(
        &settings.logging.level,
        settings.logging.json,
    ))?;
    for r in &rejected {
        warn!(key = r.key, value = %r.value, "invalid env var, ignoring");
    }

    let server = ChatServer::new(settings.server);
    let handle = server.listen().await.context("failed to bind listener")?;
    info!(
        addr = %handle.addr,
        dev = cli.dev,
        queue = server.settings().send_queue_capacity,
        "chatpush ready"
    );

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")?;

    let drained = server.shutdown().drain(vec![handle.into_task()], None).await;
    info!(drained, "chatpush stopped");
    Ok(())
}
