//! Line protocol definitions
//!
//! Inbound: newline-delimited UTF-8 lines, classified into chat text or a
//! command by a leading `\`. Outbound: plain text shapes rendered with a
//! local timestamp.

use chrono::Local;

use crate::types::SessionId;

/// Marker that turns a line into a command
pub const COMMAND_MARKER: char = '\\';

/// Timestamp layout used in every timestamped message
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Current local time, `YYYY-MM-DD HH:MM:SS`
pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// A command line split into its verb and arguments
///
/// Tokens are separated by single spaces; consecutive spaces produce
/// empty tokens, which count towards argument arity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    /// First token, including the marker (`\who`)
    pub verb: String,
    /// Remaining tokens
    pub args: Vec<String>,
    /// The whole line as typed
    pub raw: String,
}

impl CommandLine {
    pub fn parse(raw: &str) -> Self {
        let mut tokens = raw.split(' ').map(str::to_string);
        let verb = tokens.next().unwrap_or_default();
        Self {
            verb,
            args: tokens.collect(),
            raw: raw.to_string(),
        }
    }

    /// Everything after the first `n` arguments and their separators
    pub fn rest_after(&self, n: usize) -> &str {
        let mut offset = self.verb.len();
        for arg in self.args.iter().take(n) {
            offset += 1 + arg.len();
        }
        self.raw.get(offset + 1..).unwrap_or("")
    }
}

/// One inbound line after classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// Plain chat text
    Chat(String),
    /// In-band command
    Command(CommandLine),
}

impl Inbound {
    /// Classify a line that has already had its terminator stripped
    pub fn classify(line: &str) -> Self {
        if line.starts_with(COMMAND_MARKER) {
            Inbound::Command(CommandLine::parse(line))
        } else {
            Inbound::Chat(line.to_string())
        }
    }
}

/// Events on the line queue (session → dispatcher)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineEvent {
    /// A session was registered and should be announced
    Joined { sender: SessionId },
    /// Plain chat line to broadcast
    Chat { sender: SessionId, text: String },
    /// Command to run for the sender
    Command { sender: SessionId, line: CommandLine },
}

impl LineEvent {
    pub fn sender(&self) -> SessionId {
        match self {
            LineEvent::Joined { sender }
            | LineEvent::Chat { sender, .. }
            | LineEvent::Command { sender, .. } => *sender,
        }
    }

    /// Wrap a classified line
    pub fn from_inbound(sender: SessionId, inbound: Inbound) -> Self {
        match inbound {
            Inbound::Chat(text) => LineEvent::Chat { sender, text },
            Inbound::Command(line) => LineEvent::Command { sender, line },
        }
    }
}

/// Why a session closed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Peer closed the stream
    PeerClosed,
    /// Idle budget ran out
    IdleTimeout,
    /// Peer sent a line longer than the limit
    LineTooLong,
    /// Server is shutting the session down
    Shutdown,
}

/// Event on the close queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseEvent {
    pub sender: SessionId,
    /// Name the session held when it closed, for logging only
    pub name: String,
    pub reason: CloseReason,
}

/// Server → client text
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerMessage {
    /// Broadcast chat line
    Chat { from: String, text: String },
    /// Broadcast join notice
    Joined { name: String },
    /// Broadcast departure notice
    Left { name: String },
    /// Private message to one session
    Private { from: String, text: String },
    /// Untimestamped command reply
    Reply(String),
    /// Notice sent right before an idle eviction
    IdleKick,
    /// Notice sent before closing a session that overran the line limit
    LineTooLong,
}

impl ServerMessage {
    /// Render with the current time
    pub fn to_wire(&self) -> String {
        self.render(&timestamp())
    }

    /// Render with the given timestamp
    pub fn render(&self, ts: &str) -> String {
        match self {
            ServerMessage::Chat { from, text } => format!("[{}] {}: {}\n\n", ts, from, text),
            ServerMessage::Joined { name } => format!("[{}] {} joined.\n\n", ts, name),
            ServerMessage::Left { name } => format!("[{}] {} left...\n", ts, name),
            ServerMessage::Private { from, text } => {
                format!("[{} {} speak to you] {} \n\n", ts, from, text)
            }
            ServerMessage::Reply(text) => text.clone(),
            ServerMessage::IdleKick => {
                "You have been idle for too long, kicked out...\n".to_string()
            }
            ServerMessage::LineTooLong => "Line too long, disconnected...\n".to_string(),
        }
    }
}
