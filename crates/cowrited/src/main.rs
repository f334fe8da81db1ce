//! CoWrite Daemon (cowrited)
//!
//! The authoritative sequencer for CoWrite rooms.
//!
//! # Usage
//!
//! ```bash
//! # Start with defaults (WebSocket on 8080, documents in ./documents)
//! cowrited
//!
//! # Custom port and document directory
//! cowrited --port 9000 --doc-dir /var/lib/cowrite
//!
//! # Volatile rooms only
//! cowrited --no-persist
//!
//! # With a configuration file
//! cowrited --config /etc/cowrite/cowrite.toml
//! ```

mod config;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use cowrite_server::{Hub, WsServer};
use cowrite_storage::{FileStorage, MemoryStorage, Storage};

use crate::config::FileConfig;

/// CoWrite Daemon - collaborative text sequencer
#[derive(Parser, Debug)]
#[command(name = "cowrited")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// WebSocket port to listen on
    #[arg(long, env = "COWRITE_PORT")]
    port: Option<u16>,

    /// Bind address
    #[arg(long, env = "COWRITE_BIND")]
    bind: Option<String>,

    /// Directory for persisted room documents
    #[arg(long, env = "COWRITE_DOC_DIR")]
    doc_dir: Option<PathBuf>,

    /// Keep rooms in memory only (no persistence)
    #[arg(long)]
    no_persist: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "COWRITE_LOG_LEVEL")]
    log_level: Option<String>,

    /// Configuration file path
    #[arg(short, long, env = "COWRITE_CONFIG")]
    config: Option<PathBuf>,
}

/// Flags override file values, file values override defaults
struct Settings {
    port: u16,
    bind: String,
    doc_dir: PathBuf,
    no_persist: bool,
    log_level: String,
}

impl Settings {
    fn resolve(args: Args, file: FileConfig) -> Self {
        Self {
            port: args.port.or(file.port).unwrap_or(8080),
            bind: args
                .bind
                .or(file.bind)
                .unwrap_or_else(|| "0.0.0.0".to_string()),
            doc_dir: args
                .doc_dir
                .or(file.doc_dir)
                .unwrap_or_else(|| PathBuf::from("./documents")),
            no_persist: args.no_persist || file.no_persist.unwrap_or(false),
            log_level: args
                .log_level
                .or(file.log_level)
                .unwrap_or_else(|| "info".to_string()),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let file = match &args.config {
        Some(path) => FileConfig::load(path)?,
        None => FileConfig::default(),
    };
    let settings = Settings::resolve(args, file);

    // Initialize logging
    let level = match settings.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    print_banner();

    // Storage backend: flat files per room, or memory only
    let storage: Arc<dyn Storage> = if settings.no_persist {
        info!("Running in-memory only (--no-persist)");
        Arc::new(MemoryStorage::new())
    } else {
        let storage = FileStorage::new(&settings.doc_dir)
            .map_err(|e| anyhow::anyhow!("Failed to open document directory: {}", e))?;
        info!(dir = %storage.dir().display(), "Room documents persisted to flat files");
        Arc::new(storage)
    };

    let hub = Arc::new(Hub::new().with_storage(storage));

    let addr: SocketAddr = format!("{}:{}", settings.bind, settings.port).parse()?;
    info!(
        addr = %addr,
        persist = !settings.no_persist,
        "Starting CoWrite daemon"
    );

    let server = WsServer::new(hub, addr);
    let handle = tokio::spawn(async move {
        if let Err(e) = server.run().await {
            tracing::error!(error = %e, "WebSocket server error");
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutting down...");
    handle.abort();

    Ok(())
}

fn print_banner() {
    println!(
        r#"
  ╔═╗╔═╗╦ ╦╦═╗╦╔╦╗╔═╗
  ║  ║ ║║║║╠╦╝║ ║ ║╣
  ╚═╝╚═╝╚╩╝╩╚═╩ ╩ ╚═╝
  Collaborative Text Sequencer
  Version {}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
