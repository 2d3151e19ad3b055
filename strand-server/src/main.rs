//! Strand Server - TCP ingestion endpoint
//!
//! ```text
//! $ strand-server --port 9898 --data-dir ./data --collection docs
//! $ printf 'CREATE { "a" = ["Doc"], title = "x" };\n' | nc localhost 9898
//! ```

use clap::Parser;
use std::net::IpAddr;
use std::path::PathBuf;
use strand_core::query::StatementSeparator;
use strand_server::{Config, IngestServer, open_engine};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Strand Server CLI arguments
#[derive(Parser, Debug)]
#[command(name = "strand-server")]
#[command(about = "Strand graph store TCP ingestion server", long_about = None)]
struct Args {
    /// Configuration file (default: config/strand.toml when present)
    #[arg(long, short = 'c')]
    config: Option<PathBuf>,

    /// Address to bind
    #[arg(long)]
    host: Option<IpAddr>,

    /// Port to listen on
    #[arg(long, short = 'p')]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Collection queries are executed against
    #[arg(long)]
    collection: Option<String>,

    /// Statement separator: semicolon, newline or both
    #[arg(long)]
    separator: Option<StatementSeparator>,

    /// Enable verbose logging
    #[arg(long, short = 'v')]
    verbose: bool,
}

impl Args {
    fn apply(self, mut config: Config) -> Config {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(data_dir) = self.data_dir {
            config.data_dir = data_dir;
        }
        if let Some(collection) = self.collection {
            config.collection = collection;
        }
        if let Some(separator) = self.separator {
            config.separator = separator;
        }
        config
    }
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let filter = if args.verbose {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "strand_server=debug,strand_core=debug".into())
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "strand_server=info,strand_core=info".into())
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let rt = tokio::runtime::Builder::new_multi_thread()
        .thread_name("strand-worker")
        .enable_all()
        .build()?;

    rt.block_on(async_main(args))
}

async fn async_main(args: Args) -> anyhow::Result<()> {
    let config = match &args.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_default_file()?,
    };
    let config = args.apply(config.with_env()?);
    config.validate()?;

    info!("Using data directory: {}", config.data_dir.display());
    let engine = open_engine(&config).await?;

    let cancel = CancellationToken::new();
    let server = IngestServer::bind(config.clone(), engine, cancel.clone()).await?;
    info!("Strand Server listening on {}", server.local_addr()?);

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Received Ctrl-C, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
        }
    });

    let stats = server.run().await?;
    info!(
        completed = stats.completed,
        failed = stats.failed,
        "Strand Server stopped"
    );
    Ok(())
}
