//! Line Chat Relay - Terminal Client
//!
//! Connects to the relay and pipes stdin/stdout through it. Type `\q` to quit.

use clap::Parser;
use tokio::io::BufReader;
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

use chat_relay::client::{self, Exit};

/// Terminal client for the chat relay
#[derive(Debug, Parser)]
#[command(name = "chat_relay_client", version)]
struct Args {
    /// Server ip
    #[arg(long, default_value = "127.0.0.1")]
    ip: String,

    /// Server port
    #[arg(long, default_value_t = 8888)]
    port: u16,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Logs go to stderr so they never mix with chat output
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();
    let addr = format!("{}:{}", args.ip, args.port);
    let stream = TcpStream::connect(&addr).await?;
    eprintln!("connected to {}", addr);

    let stdin = BufReader::new(tokio::io::stdin());
    match client::run(stdin, tokio::io::stdout(), stream).await? {
        Exit::Quit => info!("Quit"),
        Exit::ServerClosed => eprintln!("server closed the connection"),
        Exit::InputClosed => info!("Input closed"),
    }

    Ok(())
}
