//! # hearthd
//!
//! Hearth realtime gateway binary: loads settings, starts the WebSocket
//! gateway and serves until Ctrl-C.

#![deny(unsafe_code)]

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use hearth_server::{HearthServer, ServerConfig};
use hearth_settings::HearthSettings;

/// Hearth realtime gateway.
#[derive(Parser, Debug)]
#[command(name = "hearthd", about = "Hearth realtime gateway")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Path to the settings file.
    #[arg(long)]
    settings: Option<PathBuf>,

    /// Log filter directive, e.g. `debug` or `hearth_server=trace` (overrides settings).
    #[arg(long)]
    log_level: Option<String>,

    /// Maximum concurrent sessions (overrides settings).
    #[arg(long)]
    max_connections: Option<usize>,
}

impl Cli {
    fn settings_path(&self) -> PathBuf {
        self.settings
            .clone()
            .unwrap_or_else(hearth_settings::settings_path)
    }

    /// Command-line flags win over file and environment.
    fn apply(&self, settings: &mut HearthSettings) {
        if let Some(host) = &self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(level) = &self.log_level {
            settings.logging.level.clone_from(level);
        }
        if let Some(max) = self.max_connections {
            settings.server.max_connections = max;
        }
    }
}

fn load(cli: &Cli) -> Result<HearthSettings> {
    let path = cli.settings_path();
    let mut settings = hearth_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))?;
    cli.apply(&mut settings);
    settings.validate().context("Invalid settings")?;
    Ok(settings)
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let settings = load(&cli)?;

    hearth_core::logging::init_subscriber(&settings.logging.level, settings.logging.format);

    let server = HearthServer::new(ServerConfig::from(&settings));
    let (addr, handle) = server.listen().await.context("Failed to bind server")?;
    tracing::info!(%addr, "hearthd ready");

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("shutting down");
    let outcome = server
        .shutdown()
        .drain(handle, Some(Duration::from_secs(10)))
        .await;
    tracing::info!(?outcome, "shutdown complete");
    Ok(())
}
