//! Image relay server binary
//!
//! Run with: image-relay --publisher-token <TOKEN> [--bind ADDR]
//!
//! Publish:   ws://HOST:PORT/api/stream/ws?socket_type=2&token=<TOKEN>
//! Subscribe: ws://HOST:PORT/api/stream/ws?socket_type=1

use std::net::SocketAddr;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use image_relay::server::{RelayServer, ServerConfig, StaticToken};

#[derive(Debug, Parser)]
#[command(name = "image-relay", version, about = "Single-publisher image relay over WebSocket")]
struct Args {
    /// Address to listen on
    #[arg(long, env = "RELAY_BIND", default_value = "0.0.0.0:8080")]
    bind: SocketAddr,

    /// Token the publisher must present
    #[arg(long, env = "RELAY_PUBLISHER_TOKEN", hide_env_values = true)]
    publisher_token: String,

    /// Largest reassembled message in bytes
    #[arg(long, env = "RELAY_MAX_MESSAGE_SIZE")]
    max_message_size: Option<usize>,

    /// Concurrent connection limit (0 = unlimited)
    #[arg(long, env = "RELAY_MAX_CONNECTIONS", default_value_t = 0)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("image_relay=info")),
        )
        .init();

    let mut config = ServerConfig::with_addr(args.bind).max_connections(args.max_connections);
    if let Some(size) = args.max_message_size {
        config = config.max_message_size(size);
    }

    tracing::info!(
        addr = %config.bind_addr,
        max_message_size = config.max_message_size,
        max_connections = config.max_connections,
        "Starting image relay"
    );

    let server = RelayServer::new(config, StaticToken::new(args.publisher_token));

    server
        .run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            }
        })
        .await?;

    Ok(())
}
