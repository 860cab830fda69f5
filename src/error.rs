//! Error types for the chat relay
//!
//! Defines application-level errors, write errors, and command rejections.
//! Uses thiserror for ergonomic error definitions.

use thiserror::Error;

/// Application-level errors
///
/// These are fatal for whatever owns them (the process, or the
/// acceptor loop), never for the dispatcher.
#[derive(Debug, Error)]
pub enum AppError {
    /// IO error (fatal)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Config file could not be parsed
    #[error("Config error: {0}")]
    Config(#[from] serde_json::Error),

    /// Config value out of range
    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    /// Channel send error (fatal - dispatcher is gone)
    #[error("Channel send error")]
    ChannelSend,
}

/// Session write errors
#[derive(Debug, Error)]
pub enum SendError {
    /// The session has already been closed
    #[error("Session closed")]
    Closed,

    /// The peer did not accept the bytes in time
    #[error("Write timed out")]
    Timeout,

    /// Transport failure
    #[error("Write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Command rejections
///
/// The `Display` output is exactly the text sent back to the issuer.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    #[error("do you want to use [\\help]?\n")]
    HelpUsage,

    #[error("do you want to use [\\who]?\n")]
    WhoUsage,

    #[error("do you want to use [\\rename new_name]?\n")]
    RenameUsage,

    #[error("New name can't contain spaces and its length must be at least 2.\n")]
    InvalidName,

    #[error("This name exists, rename fail.\n")]
    NameTaken,

    #[error("do you want to use [\\to user info]?\n")]
    ToUsage,

    #[error("You can't speak to yourself.\n")]
    SelfTarget,

    #[error("[{0}] offline.\n")]
    Offline(String),

    #[error("unknown command, use \\help to get available commands.\n")]
    Unknown,
}
