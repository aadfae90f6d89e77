//! rsplink - GDB remote serial protocol stub
//!
//! Listens on localhost for a debugger and serves it one session at a time.

use clap::Parser;
use rsplink_server::{Config, NullTarget, Server, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rsplink")]
#[command(about = "GDB remote serial protocol stub")]
#[command(version)]
struct Cli {
    /// Port to listen on (overrides the config file and RSPLINK_PORT)
    #[arg(short, long)]
    port: Option<u16>,

    /// YAML configuration file
    #[arg(short, long, env = "RSPLINK_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    let mut config = match Config::load_from(cli.config.as_deref()) {
        Ok(c) => {
            if let Some(path) = &cli.config {
                tracing::info!("Loaded config from {}", path.display());
            }
            c
        }
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            return Err(e.into());
        }
    };

    if let Some(port) = cli.port {
        config.network.port = port;
    }

    tracing::info!("Starting rsplink");
    tracing::info!("  Port: {}", config.network.port);
    tracing::info!("  Packet size: {}", config.transport.packet_size);
    tracing::info!(
        "  Max framing retries: {}",
        config.transport.max_framing_retries
    );
    tracing::info!("  Max frame size: {}", config.transport.max_frame_size);

    let handler = NullTarget::new(config.transport.packet_size);
    let server = Arc::new(Server::bind(ServerConfig::from_config(&config), handler)?);

    let shutdown_server = server.clone();
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        tracing::info!("Received shutdown signal, stopping server...");
        shutdown_server.shutdown();
    });

    server.run().await?;

    tracing::info!("Server stopped");
    Ok(())
}
