//! # eio-echo
//!
//! Echo server binary: loads settings, starts the engine, greets each client
//! with `"hi"` and sends every message back.

#![deny(unsafe_code)]

mod echo;

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use eio_core::logging;
use eio_server::{Engine, EngineConfig, EngineServer, ServerConfig};
use eio_settings::EngineSettings;

/// Echo server for engine clients.
#[derive(Parser, Debug)]
#[command(name = "eio-echo", about = "Engine echo server")]
struct Cli {
    /// Host to bind (overrides settings).
    #[arg(long)]
    host: Option<String>,

    /// Port to bind, 0 for auto-assign (overrides settings).
    #[arg(long)]
    port: Option<u16>,

    /// Settings file (default: `$EIO_CONFIG` or `./eio.json`).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Heartbeat interval in milliseconds (overrides settings; default 500).
    #[arg(long)]
    ping_interval: Option<u64>,

    /// Log level (overrides settings; `RUST_LOG` still wins).
    #[arg(long)]
    log_level: Option<String>,
}

impl Cli {
    fn apply(&self, settings: &mut EngineSettings) {
        if let Some(ref host) = self.host {
            settings.server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            settings.server.port = port;
        }
        if let Some(ms) = self.ping_interval {
            settings.engine.ping_interval_ms = ms;
        }
        if let Some(ref level) = self.log_level {
            settings.logging.level.clone_from(level);
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();

    let settings_path = args.config.clone().unwrap_or_else(eio_settings::settings_path);
    let mut settings = eio_settings::load_settings_over(&echo::base_settings(), &settings_path)
        .with_context(|| format!("Failed to load settings from {}", settings_path.display()))?;
    args.apply(&mut settings);

    if settings.logging.json {
        logging::init_json_subscriber(&settings.logging.level);
    } else {
        logging::init_subscriber(&settings.logging.level);
    }

    let config = EngineConfig::try_from(&settings).context("Invalid engine settings")?;
    let (engine, incoming) = Engine::builder(config).hook(echo::echo_header).build();

    let metrics = eio_server::metrics::install_recorder()
        .context("Failed to install metrics recorder")?;
    let server =
        EngineServer::new(ServerConfig::from(&settings.server), engine).with_metrics(metrics);
    let (addr, handle) = server.listen().await.context("Failed to bind listener")?;
    tracing::info!(%addr, path = %settings.server.path, "echo server ready");

    let echo_task = tokio::spawn(echo::run(incoming));

    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutting down...");
    if !server.graceful_shutdown(vec![handle], None).await {
        tracing::warn!("some sessions or tasks did not finish before the shutdown timeout");
    }
    echo_task.abort();
    Ok(())
}
