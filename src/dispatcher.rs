//! Dispatcher actor
//!
//! The single consumer of both event queues. Every registry mutation after
//! connect, every broadcast and every command reply happens here, one event
//! at a time, so all clients observe chat events in one global order.
//!
//! A session whose write times out or fails is evicted on the spot, so one
//! stalled client costs at most one write timeout.

use std::sync::Arc;

use futures_util::future::join_all;
use tracing::{debug, info, warn};

use crate::command::{self, Delivery};
use crate::error::SendError;
use crate::message::{CloseEvent, LineEvent, ServerMessage};
use crate::queue::EventReceiver;
use crate::registry::{Registry, SharedRegistry};
use crate::session::Session;

/// The event loop that owns chat semantics
pub struct Dispatcher {
    registry: SharedRegistry,
    events: EventReceiver,
}

impl Dispatcher {
    /// Create a dispatcher over a registry and the receiving end of the queues
    pub fn new(registry: SharedRegistry, events: EventReceiver) -> Self {
        Self { registry, events }
    }

    /// Run the event loop
    ///
    /// Takes one event per iteration from whichever queue is ready and
    /// stops once every producer has been dropped.
    pub async fn run(mut self) {
        info!("Dispatcher started");

        loop {
            tokio::select! {
                Some(event) = self.events.lines.recv() => self.handle_line(event).await,
                Some(event) = self.events.closes.recv() => self.handle_close(event).await,
                else => break,
            }
        }

        info!("Dispatcher shutting down");
    }

    /// Broadcast a chat line or run a command
    async fn handle_line(&mut self, event: LineEvent) {
        let mut registry = self.registry.lock().await;

        let sender = event.sender();
        let Some(name) = registry.name_of(sender).map(str::to_string) else {
            warn!("Dropping line event from unregistered session {}", sender);
            return;
        };

        let faulted = match event {
            LineEvent::Joined { .. } => {
                info!("{} joined ({} online)", name, registry.len());
                broadcast(&registry, ServerMessage::Joined { name }).await
            }
            LineEvent::Chat { text, .. } => {
                debug!("{}: {}", name, text);
                broadcast(&registry, ServerMessage::Chat { from: name, text }).await
            }
            LineEvent::Command { line, .. } => {
                debug!("{} issued {:?}", name, line.raw);
                match command::do_command(sender, &line, &mut registry) {
                    Some(delivery) => deliver(delivery).await.into_iter().collect(),
                    None => Vec::new(),
                }
            }
        };
        evict(&mut registry, faulted).await;
    }

    /// Remove a closed session and announce its departure
    async fn handle_close(&mut self, event: CloseEvent) {
        let mut registry = self.registry.lock().await;

        let Some(name) = registry.name_of(event.sender).map(str::to_string) else {
            debug!("Close for {} ({}) already handled", event.sender, event.name);
            return;
        };
        if let Some(session) = registry.remove(event.sender) {
            session.shutdown().await;
        }

        info!("{} left: {:?} ({} online)", name, event.reason, registry.len());
        let faulted = broadcast(&registry, ServerMessage::Left { name }).await;
        evict(&mut registry, faulted).await;
    }
}

/// Send one rendering of `message` to every registered session
///
/// Returns the sessions whose write failed.
async fn broadcast(registry: &Registry, message: ServerMessage) -> Vec<Arc<Session>> {
    let text = message.to_wire();
    let sends = registry.sessions().map(|session| {
        let text = &text;
        async move { check_send(session, session.send(text).await) }
    });
    join_all(sends).await.into_iter().flatten().collect()
}

async fn deliver(delivery: Delivery) -> Option<Arc<Session>> {
    let result = delivery.to.send(&delivery.message.to_wire()).await;
    check_send(&delivery.to, result)
}

/// The session to evict, if the write failed on a live connection
///
/// `Closed` means the session is already closing and its close event is
/// queued, so it is left alone.
fn check_send(session: &Arc<Session>, result: Result<usize, SendError>) -> Option<Arc<Session>> {
    match result {
        Ok(_) => None,
        Err(SendError::Closed) => {
            debug!("Skipped closed session {}", session.id());
            None
        }
        Err(e) => {
            warn!("Write to {} failed: {}", session.name(), e);
            Some(Arc::clone(session))
        }
    }
}

/// Close, remove and announce sessions whose writes failed
///
/// Announcing a departure can fault further sessions; those are handled
/// in the same pass. No close event is enqueued for them: the dispatcher
/// must never wait on its own queue.
async fn evict(registry: &mut Registry, mut faulted: Vec<Arc<Session>>) {
    while let Some(session) = faulted.pop() {
        if !session.fault().await {
            continue;
        }
        let Some(removed) = registry.remove(session.id()) else {
            continue;
        };
        let name = removed.name();
        info!("{} dropped after a failed write ({} online)", name, registry.len());
        faulted.extend(broadcast(registry, ServerMessage::Left { name }).await);
    }
}
