//! Bounded event queues between sessions and the dispatcher
//!
//! Two channels: one for line events, one for close events. Both are
//! bounded. Close events always wait for space; line events follow the
//! configured `Backpressure` policy, except join notices, which always wait.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

use crate::config::Backpressure;
use crate::error::AppError;
use crate::message::{CloseEvent, LineEvent};

/// Outcome of pushing a line event
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pushed {
    Queued,
    Dropped,
}

/// Producer side, cloned into every session
#[derive(Debug, Clone)]
pub struct EventSender {
    lines: mpsc::Sender<LineEvent>,
    closes: mpsc::Sender<CloseEvent>,
    policy: Backpressure,
}

/// Consumer side, owned by the dispatcher
#[derive(Debug)]
pub struct EventReceiver {
    pub lines: mpsc::Receiver<LineEvent>,
    pub closes: mpsc::Receiver<CloseEvent>,
}

/// Create both queues with the same capacity
pub fn event_queue(capacity: usize, policy: Backpressure) -> (EventSender, EventReceiver) {
    let (line_tx, line_rx) = mpsc::channel(capacity);
    let (close_tx, close_rx) = mpsc::channel(capacity);
    (
        EventSender {
            lines: line_tx,
            closes: close_tx,
            policy,
        },
        EventReceiver {
            lines: line_rx,
            closes: close_rx,
        },
    )
}

impl EventSender {
    /// Push a line event according to the backpressure policy
    ///
    /// Fails only when the dispatcher has gone away.
    pub async fn push_line(&self, event: LineEvent) -> Result<Pushed, AppError> {
        let policy = match event {
            // A dropped join would leave a registered session unannounced.
            LineEvent::Joined { .. } => Backpressure::Block,
            _ => self.policy,
        };
        match policy {
            Backpressure::Block => {
                self.lines
                    .send(event)
                    .await
                    .map_err(|_| AppError::ChannelSend)?;
                Ok(Pushed::Queued)
            }
            Backpressure::DropNewest => match self.lines.try_send(event) {
                Ok(()) => Ok(Pushed::Queued),
                Err(TrySendError::Full(event)) => {
                    warn!("Line queue full, dropping event from {}", event.sender());
                    Ok(Pushed::Dropped)
                }
                Err(TrySendError::Closed(_)) => Err(AppError::ChannelSend),
            },
        }
    }

    /// Push a close event, waiting for space if needed
    pub async fn push_close(&self, event: CloseEvent) -> Result<(), AppError> {
        self.closes
            .send(event)
            .await
            .map_err(|_| AppError::ChannelSend)
    }
}
