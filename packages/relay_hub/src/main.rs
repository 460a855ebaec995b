use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::prelude::*;

use relay_hub::config::{self, FileConfig, ServerConfig};
use relay_hub::server::RelayServer;

#[derive(Parser)]
#[command(name = "relay-hub")]
#[command(about = "Broadcast relay between the problem scraper and viewer panels")]
struct Cli {
    /// Port to listen on (overrides config file / env)
    #[arg(short, long)]
    port: Option<u16>,

    /// Host to bind to (overrides config file / env)
    #[arg(short = 'b', long)]
    host: Option<String>,

    /// Path to a relay.toml config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let default_directive = if cli.debug {
        "relay_hub=debug,tower_http=debug,info"
    } else {
        "relay_hub=info,tower_http=info,warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_directive));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(env_filter)
        .init();

    let file_config: FileConfig = config::load_config(cli.config.as_deref())
        .extract()
        .context("invalid configuration")?;
    let server_config = ServerConfig::resolve(&file_config, cli.host, cli.port)?;

    info!(
        "Starting relay hub (send queue depth: {})",
        server_config.send_queue_len
    );

    let server = RelayServer::new(server_config);

    // A bind failure is the one fatal condition: bubble up and exit non-zero.
    let addr = server.start().await?;
    info!("Relay hub listening on ws://{}", addr);
    info!("Health:  http://{}/health", addr);
    info!("Metrics: http://{}/metrics", addr);

    tokio::signal::ctrl_c()
        .await
        .context("Failed to install Ctrl+C handler")?;
    info!(
        "Received shutdown signal, closing {} connections...",
        server.hub().connection_count().await
    );
    server.stop().await;
    info!("Shutdown complete");

    Ok(())
}
