//! # murmur
//!
//! Binary entry point: `murmur serve` runs the poll-driven chat server,
//! `murmur connect` runs the interactive terminal client.

#![deny(unsafe_code)]

mod client;

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use murmur_core::logging::{self, LogFormat};
use murmur_server::{ChatServer, ServerConfig, ShutdownCoordinator};
use murmur_settings::{MurmurSettings, ServerSettings};
use tracing::info;

/// Readiness wait ceiling while the metrics exporter runs. A signal may land
/// on the exporter's thread instead of interrupting the wait, so the loop
/// must wake up on its own to notice the shutdown flag.
const EXPORTER_POLL_CEILING_MS: i64 = 1000;

/// murmur: a single-threaded, poll-driven line chat.
#[derive(Parser, Debug)]
#[command(name = "murmur", version, about = "Poll-driven multi-client chat")]
struct Cli {
    /// Log level or filter directive (overrides settings; `RUST_LOG` wins).
    #[arg(long, global = true)]
    log_level: Option<String>,

    /// Log output format: compact or json.
    #[arg(long, global = true)]
    log_format: Option<LogFormat>,

    /// Settings file (defaults to `~/.murmur/settings.json`).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the chat server.
    Serve(ServeArgs),
    /// Connect to a chat server from the terminal.
    Connect(ConnectArgs),
}

/// Server flags; each one overrides the corresponding setting.
#[derive(Args, Debug, Default)]
struct ServeArgs {
    /// Host to bind.
    #[arg(long)]
    host: Option<String>,

    /// Port to bind (0 for auto-assign).
    #[arg(long)]
    port: Option<u16>,

    /// Maximum concurrent sessions.
    #[arg(long)]
    max_clients: Option<usize>,

    /// Readiness wait bound in milliseconds (negative waits indefinitely).
    #[arg(long, allow_negative_numbers = true)]
    poll_timeout_ms: Option<i64>,

    /// Serve Prometheus metrics on this address.
    #[arg(long)]
    metrics_addr: Option<String>,
}

impl ServeArgs {
    fn apply(&self, server: &mut ServerSettings) {
        if let Some(host) = &self.host {
            server.host.clone_from(host);
        }
        if let Some(port) = self.port {
            server.port = port;
        }
        if let Some(max_clients) = self.max_clients {
            server.max_clients = max_clients;
        }
        if let Some(timeout) = self.poll_timeout_ms {
            server.poll_timeout_ms = timeout;
        }
        if let Some(addr) = &self.metrics_addr {
            server.metrics_addr = Some(addr.clone());
        }
    }
}

/// Client flags; each one overrides the corresponding setting.
#[derive(Args, Debug, Default)]
struct ConnectArgs {
    /// Server host.
    #[arg(long)]
    host: Option<String>,

    /// Server port.
    #[arg(long)]
    port: Option<u16>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Settings first: they carry the log level.
    let mut settings = load(cli.config.as_deref())?;
    match &cli.command {
        Command::Serve(args) => args.apply(&mut settings.server),
        Command::Connect(args) => {
            if let Some(host) = &args.host {
                settings.client.host.clone_from(host);
            }
            if let Some(port) = args.port {
                settings.client.port = port;
            }
        }
    }
    settings.validate().context("Invalid settings")?;

    let level = cli.log_level.as_deref().unwrap_or(&settings.logging.level);
    let format = cli.log_format.unwrap_or(settings.logging.format);
    logging::init_subscriber(level, format);

    match cli.command {
        Command::Serve(_) => serve(&settings.server),
        Command::Connect(_) => connect(&settings),
    }
}

fn load(config: Option<&Path>) -> Result<MurmurSettings> {
    let path = config.map_or_else(murmur_settings::settings_path, Path::to_path_buf);
    murmur_settings::load_settings_from_path(&path)
        .with_context(|| format!("Failed to load settings from {}", path.display()))
}

fn serve(settings: &ServerSettings) -> Result<()> {
    let mut config = ServerConfig::from(settings);

    if let Some(addr) = &settings.metrics_addr {
        let addr: SocketAddr = addr
            .parse()
            .with_context(|| format!("Invalid metrics address: {addr}"))?;
        murmur_server::metrics::install_exporter(addr)
            .context("Failed to start metrics exporter")?;
        config.poll_timeout_ms = exporter_poll_timeout(config.poll_timeout_ms);
    }

    let shutdown = ShutdownCoordinator::new();
    shutdown
        .register_signals()
        .context("Failed to register signal handlers")?;

    let mut server = ChatServer::bind(config, shutdown)
        .with_context(|| format!("Failed to bind {}:{}", settings.host, settings.port))?;
    let addr = server.local_addr().context("Failed to read bound address")?;
    info!(%addr, version = murmur_core::constants::VERSION, "murmur listening");

    server.run().context("Chat server failed")?;
    Ok(())
}

/// Bound an indefinite wait so the loop observes shutdown without a signal.
fn exporter_poll_timeout(configured: i64) -> i64 {
    if (0..=EXPORTER_POLL_CEILING_MS).contains(&configured) {
        configured
    } else {
        EXPORTER_POLL_CEILING_MS
    }
}

fn connect(settings: &MurmurSettings) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start client runtime")?;
    runtime.block_on(client::run(&settings.client.host, settings.client.port))
}
