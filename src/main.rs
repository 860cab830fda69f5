//! Line Chat Relay - Entry Point
//!
//! Loads the config, starts the Dispatcher actor, and accepts connections
//! until Ctrl-C.

use std::path::PathBuf;

use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::{AppError, ChatServer, ServerConfig};

/// Multi-user line-based chat relay
#[derive(Debug, Parser)]
#[command(name = "chat_relay", version)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Listen address (ip:port)
    #[arg(long)]
    addr: Option<String>,

    /// Seconds of silence before a client is evicted
    #[arg(long)]
    idle_timeout: Option<u64>,

    /// Capacity of each event queue
    #[arg(long)]
    queue_capacity: Option<usize>,
}

impl Args {
    fn into_config(self) -> Result<ServerConfig, AppError> {
        let mut config = match &self.config {
            Some(path) => ServerConfig::from_file(path)?,
            None => ServerConfig::default(),
        };
        if let Some(addr) = self.addr {
            config.addr = addr;
        }
        if let Some(secs) = self.idle_timeout {
            config.idle_timeout_secs = secs;
        }
        if let Some(capacity) = self.queue_capacity {
            config.queue_capacity = capacity;
        }
        config.validate()
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with environment filter
    // e.g., RUST_LOG=debug or RUST_LOG=chat_relay=trace
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chat_relay=info")),
        )
        .init();

    let config = Args::parse().into_config()?;

    let listener = TcpListener::bind(&config.addr).await?;
    info!("Chat relay listening on {}", config.addr);
    info!(
        "Idle timeout {}s, queue capacity {}, backpressure {:?}",
        config.idle_timeout_secs, config.queue_capacity, config.backpressure
    );

    let (server, dispatcher) = ChatServer::new(&config);
    tokio::spawn(dispatcher.run());

    tokio::select! {
        result = server.serve(listener) => result?,
        _ = tokio::signal::ctrl_c() => {
            info!("Shutdown requested");
            server.close_all().await;
        }
    }

    Ok(())
}
