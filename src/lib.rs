//! Multi-user Line Chat Relay Library
//!
//! A learning-oriented TCP chat relay built on tokio using the Actor
//! pattern for state management.
//!
//! # Features
//! - Newline-delimited UTF-8 text protocol
//! - Broadcast chat with a single global order
//! - In-band commands: `\help`, `\who`, `\rename`, `\to`
//! - Idle eviction with departure notices
//! - Configurable queue capacity and backpressure
//!
//! # Architecture
//! - `ChatServer` accepts connections and registers a `Session` per client
//! - Each session runs a read task and an idle-timer task
//! - Sessions push events onto two bounded queues (lines, closes)
//! - `Dispatcher` is the only consumer: it mutates the `Registry`,
//!   broadcasts, and runs commands, one event at a time
//!
//! # Example
//! ```ignore
//! use tokio::net::TcpListener;
//! use chat_relay::{ChatServer, ServerConfig};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ServerConfig::default();
//!     let listener = TcpListener::bind(&config.addr).await.unwrap();
//!     let (server, dispatcher) = ChatServer::new(&config);
//!
//!     tokio::spawn(dispatcher.run());
//!     server.serve(listener).await.unwrap();
//! }
//! ```

pub mod client;
pub mod command;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod message;
pub mod queue;
pub mod registry;
pub mod server;
pub mod session;
pub mod types;

#[cfg(test)]
mod testing;

// Re-export main types for convenience
pub use command::Command;
pub use config::{Backpressure, ServerConfig};
pub use dispatcher::Dispatcher;
pub use error::{AppError, CommandError, SendError};
pub use message::{CloseEvent, CloseReason, Inbound, LineEvent, ServerMessage};
pub use registry::{Registry, SharedRegistry};
pub use server::ChatServer;
pub use session::{Session, SessionState};
pub use types::SessionId;
