//! Session: one connected client
//!
//! Owns the write half of the connection and runs two tasks per client:
//! a read loop that turns bytes into line events, and an idle watcher that
//! evicts the client after a period of silence. Both tasks may try to close
//! the session; the state machine (Active → Closing → Closed) lets exactly
//! one of them win.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::SendError;
use crate::message::{CloseEvent, CloseReason, Inbound, LineEvent, ServerMessage};
use crate::queue::EventSender;
use crate::types::SessionId;

type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Active = 0,
    Closing = 1,
    Closed = 2,
}

impl SessionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => SessionState::Active,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// Per-session timing knobs
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    /// Silence allowed before eviction
    pub idle_timeout: Duration,
    /// Upper bound on one write
    pub write_timeout: Duration,
    /// Longest accepted line in bytes, terminator excluded
    pub max_line_len: usize,
}

/// Connected client
pub struct Session {
    id: SessionId,
    /// Display name; only the dispatcher changes it
    name: Mutex<String>,
    /// `None` once the connection has been shut down
    writer: AsyncMutex<Option<BoxedWriter>>,
    state: AtomicU8,
    /// Cancelled on close; stops the read loop and the idle watcher
    cancel: CancellationToken,
    /// Instant of the last parsed line
    activity: watch::Sender<Instant>,
    settings: SessionSettings,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("name", &self.name())
            .field("state", &self.state())
            .finish()
    }
}

impl Session {
    /// Create a session around the write half of a connection
    ///
    /// Nothing runs until `start` is called with the read half.
    pub fn new<W>(id: SessionId, name: String, writer: W, settings: SessionSettings) -> Arc<Self>
    where
        W: AsyncWrite + Send + Unpin + 'static,
    {
        let (activity, _) = watch::channel(Instant::now());
        let writer: BoxedWriter = Box::new(writer);
        Arc::new(Self {
            id,
            name: Mutex::new(name),
            writer: AsyncMutex::new(Some(writer)),
            state: AtomicU8::new(SessionState::Active as u8),
            cancel: CancellationToken::new(),
            activity,
            settings,
        })
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    /// Current display name
    pub fn name(&self) -> String {
        self.name
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Update the display name (dispatcher only, under the registry lock)
    pub(crate) fn set_name(&self, name: &str) {
        let mut guard = self
            .name
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = name.to_string();
    }

    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn is_active(&self) -> bool {
        self.state() == SessionState::Active
    }

    /// Spawn the read loop and the idle watcher
    pub fn start<R>(self: &Arc<Self>, reader: R, events: EventSender)
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        tokio::spawn(Arc::clone(self).read_loop(reader, events.clone()));
        tokio::spawn(Arc::clone(self).idle_loop(events));
    }

    /// Write raw text to the client
    ///
    /// Returns the number of bytes written.
    pub async fn send(&self, text: &str) -> Result<usize, SendError> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or(SendError::Closed)?;
        let write = async {
            writer.write_all(text.as_bytes()).await?;
            writer.flush().await
        };
        time::timeout(self.settings.write_timeout, write)
            .await
            .map_err(|_| SendError::Timeout)??;
        Ok(text.len())
    }

    /// Close the session and notify the dispatcher
    ///
    /// Returns `false` if another caller already closed it; in that case
    /// nothing is enqueued.
    pub async fn close(&self, events: &EventSender, reason: CloseReason) -> bool {
        if !self.begin_close() {
            return false;
        }

        self.shutdown().await;

        let name = self.name();
        debug!("Session {} ({}) closing: {:?}", self.id, name, reason);
        let event = CloseEvent {
            sender: self.id,
            name,
            reason,
        };
        if events.push_close(event).await.is_err() {
            warn!("Dispatcher gone, close of {} not delivered", self.id);
        }

        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        true
    }

    /// Close after a failed write, without enqueueing a close event
    ///
    /// For the dispatcher, which removes and announces the session itself.
    /// Returns `false` if the session was already closing; its own close
    /// event is then still on the way.
    pub async fn fault(&self) -> bool {
        if !self.begin_close() {
            return false;
        }
        debug!("Session {} ({}) faulted", self.id, self.name());
        self.shutdown().await;
        self.state
            .store(SessionState::Closed as u8, Ordering::Release);
        true
    }

    /// Shut down and release the write half; idempotent
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        if let Some(mut writer) = self.writer.lock().await.take() {
            // A stalled peer can block the flush in shutdown as well.
            let _ = time::timeout(self.settings.write_timeout, writer.shutdown()).await;
        }
    }

    /// Active → Closing; only one caller ever wins
    fn begin_close(&self) -> bool {
        self.state
            .compare_exchange(
                SessionState::Active as u8,
                SessionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }

    fn touch(&self) {
        self.activity.send_replace(Instant::now());
    }

    async fn read_loop<R>(self: Arc<Self>, reader: R, events: EventSender)
    where
        R: AsyncRead + Unpin,
    {
        let mut reader = BufReader::new(reader);
        let mut buf = Vec::new();
        // Room for the longest line plus `\r\n`.
        let limit = self.settings.max_line_len as u64 + 2;

        loop {
            buf.clear();
            let mut limited = (&mut reader).take(limit);
            let read = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    debug!("Read loop for {} cancelled", self.id);
                    return;
                }
                read = limited.read_until(b'\n', &mut buf) => read,
            };

            match read {
                Ok(0) => {
                    self.close(&events, CloseReason::PeerClosed).await;
                    return;
                }
                Ok(n) if buf.last() != Some(&b'\n') && n as u64 == limit => {
                    self.reject_long_line(&events).await;
                    return;
                }
                Ok(n) if buf.last() != Some(&b'\n') => {
                    debug!("Discarding {} byte partial line from {}", n, self.id);
                    self.close(&events, CloseReason::PeerClosed).await;
                    return;
                }
                Ok(_) if trim_terminator(&buf).len() > self.settings.max_line_len => {
                    self.reject_long_line(&events).await;
                    return;
                }
                Ok(_) => {
                    let line = strip_terminator(&buf);
                    self.touch();
                    let event = LineEvent::from_inbound(self.id, Inbound::classify(&line));
                    if events.push_line(event).await.is_err() {
                        debug!("Dispatcher gone, ending read loop for {}", self.id);
                        return;
                    }
                }
                Err(e) => {
                    // No close here; the idle watcher evicts the session later.
                    warn!("Read error for {} ({}): {}", self.id, self.name(), e);
                    return;
                }
            }
        }
    }

    async fn reject_long_line(&self, events: &EventSender) {
        warn!(
            "Session {} ({}) sent a line over {} bytes, closing",
            self.id,
            self.name(),
            self.settings.max_line_len
        );
        if let Err(e) = self.send(&ServerMessage::LineTooLong.to_wire()).await {
            debug!("Line limit notice to {} failed: {}", self.id, e);
        }
        self.close(events, CloseReason::LineTooLong).await;
    }

    async fn idle_loop(self: Arc<Self>, events: EventSender) {
        let mut activity = self.activity.subscribe();

        loop {
            let deadline = *activity.borrow_and_update() + self.settings.idle_timeout;
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return,
                changed = activity.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = time::sleep_until(deadline) => {
                    info!("Session {} ({}) idle, evicting", self.id, self.name());
                    if let Err(e) = self.send(&ServerMessage::IdleKick.to_wire()).await {
                        debug!("Idle notice to {} failed: {}", self.id, e);
                    }
                    self.close(&events, CloseReason::IdleTimeout).await;
                    return;
                }
            }
        }
    }
}

/// Drop a trailing `\n` or `\r\n`
fn trim_terminator(buf: &[u8]) -> &[u8] {
    match buf.strip_suffix(b"\n") {
        Some(line) => line.strip_suffix(b"\r").unwrap_or(line),
        None => buf,
    }
}

/// Decode a line without its terminator
fn strip_terminator(buf: &[u8]) -> String {
    String::from_utf8_lossy(trim_terminator(buf)).into_owned()
}
