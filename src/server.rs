//! ChatServer: connection acceptor
//!
//! Accepts connections, registers a session for each one, announces it,
//! and starts its tasks. Everything after registration is the
//! dispatcher's job.

use std::sync::Arc;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::dispatcher::Dispatcher;
use crate::error::AppError;
use crate::message::{CloseReason, LineEvent};
use crate::queue::{event_queue, EventSender};
use crate::registry::{Registry, SharedRegistry};
use crate::session::{Session, SessionSettings};
use crate::types::SessionId;

/// Acceptor half of the relay
pub struct ChatServer {
    registry: SharedRegistry,
    events: EventSender,
    settings: SessionSettings,
}

impl ChatServer {
    /// Build the acceptor and the dispatcher that serves it
    ///
    /// The caller spawns `Dispatcher::run`.
    pub fn new(config: &ServerConfig) -> (Self, Dispatcher) {
        let registry = Registry::shared();
        let (events, receiver) = event_queue(config.queue_capacity, config.backpressure);
        let server = Self {
            registry: registry.clone(),
            events,
            settings: SessionSettings {
                idle_timeout: config.idle_timeout(),
                write_timeout: config.write_timeout(),
                max_line_len: config.max_line_len,
            },
        };
        (server, Dispatcher::new(registry, receiver))
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    /// Accept connections until the listener fails
    pub async fn serve(&self, listener: TcpListener) -> Result<(), AppError> {
        loop {
            match listener.accept().await {
                Ok((stream, addr)) => {
                    info!("New connection from {}", addr);
                    if let Err(e) = self.connect(stream, addr.to_string()).await {
                        error!("Failed to register {}: {}", addr, e);
                        return Err(e);
                    }
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            }
        }
    }

    /// Register a new connection and start its session
    ///
    /// `peer` becomes the initial display name, suffixed if it is taken.
    pub async fn connect<S>(&self, stream: S, peer: String) -> Result<Arc<Session>, AppError>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        let id = SessionId::new();

        let session = {
            let mut registry = self.registry.lock().await;
            let name = registry.available_name(&peer, id);
            let session = Session::new(id, name, writer, self.settings);
            registry.insert(session.clone());
            session
        };

        // The lock is released first: a full queue waits on the dispatcher,
        // which needs the lock to drain it.
        if let Err(e) = self.events.push_line(LineEvent::Joined { sender: id }).await {
            self.registry.lock().await.remove(id);
            return Err(e);
        }

        session.start(reader, self.events.clone());
        Ok(session)
    }

    /// Close every registered session
    pub async fn close_all(&self) {
        let sessions: Vec<Arc<Session>> = {
            let registry = self.registry.lock().await;
            registry.sessions().cloned().collect()
        };
        info!("Closing {} sessions", sessions.len());
        for session in sessions {
            session.close(&self.events, CloseReason::Shutdown).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;
    use crate::message::ServerMessage;
    use crate::testing::{expect_message, expect_silence};

    fn start(config: ServerConfig) -> ChatServer {
        let (server, dispatcher) = ChatServer::new(&config);
        tokio::spawn(dispatcher.run());
        server
    }

    async fn join(server: &ChatServer, name: &str) -> DuplexStream {
        let (client, stream) = tokio::io::duplex(4096);
        server.connect(stream, name.to_string()).await.unwrap();
        client
    }

    fn joined(name: &str) -> ServerMessage {
        ServerMessage::Joined {
            name: name.to_string(),
        }
    }

    #[tokio::test]
    async fn test_full_scenario() {
        let server = start(ServerConfig::default());

        let mut a = join(&server, "A").await;
        expect_message(&mut a, &joined("A")).await;
        let mut b = join(&server, "B").await;
        expect_message(&mut a, &joined("B")).await;
        expect_message(&mut b, &joined("B")).await;

        a.write_all(b"hello\n").await.unwrap();
        let hello = ServerMessage::Chat {
            from: "A".to_string(),
            text: "hello".to_string(),
        };
        expect_message(&mut a, &hello).await;
        expect_message(&mut b, &hello).await;

        a.write_all(b"\\rename C\n\\who\n").await.unwrap();
        expect_message(&mut a, &ServerMessage::Reply("[B]\n[C]\n\n".to_string())).await;
        expect_silence(&mut b).await;

        b.write_all(b"\\to C hi\n").await.unwrap();
        let private = ServerMessage::Private {
            from: "B".to_string(),
            text: "hi".to_string(),
        };
        expect_message(&mut a, &private).await;
        expect_silence(&mut b).await;

        drop(a);
        expect_message(&mut b, &ServerMessage::Left { name: "C".to_string() }).await;
        let registry = server.registry();
        let registry = registry.lock().await;
        assert_eq!(registry.names(), vec!["B"]);
        registry.assert_consistent();
    }

    #[tokio::test]
    async fn test_self_private_message_rejected() {
        let server = start(ServerConfig::default());
        let mut a = join(&server, "A").await;
        expect_message(&mut a, &joined("A")).await;

        a.write_all(b"\\to A hi\n").await.unwrap();
        expect_message(
            &mut a,
            &ServerMessage::Reply("You can't speak to yourself.\n".to_string()),
        )
        .await;
        expect_silence(&mut a).await;
    }

    #[tokio::test]
    async fn test_colliding_peer_name_is_suffixed() {
        let server = start(ServerConfig::default());
        let _first = join(&server, "10.0.0.1:4000").await;
        let _second = join(&server, "10.0.0.1:4000").await;

        let registry = server.registry();
        let registry = registry.lock().await;
        let names = registry.names();
        assert_eq!(names.len(), 2);
        assert_eq!(names[0], "10.0.0.1:4000");
        assert!(names[1].starts_with("10.0.0.1:4000#"));
        registry.assert_consistent();
    }

    #[tokio::test]
    async fn test_idle_session_evicted_and_announced_once() {
        let config = ServerConfig {
            idle_timeout_secs: 1,
            ..ServerConfig::default()
        };
        let server = start(config);

        let mut a = join(&server, "A").await;
        let b = join(&server, "B").await;
        let (b_read, mut b_write) = tokio::io::split(b);

        // Keep B busy past A's deadline, then let it go quiet too.
        let keepalive = tokio::spawn(async move {
            for _ in 0..5 {
                b_write.write_all(b"\\who\n").await.unwrap();
                tokio::time::sleep(Duration::from_millis(300)).await;
            }
            b_write
        });

        let mut a_lines = BufReader::new(&mut a).lines();
        let mut kicked = false;
        while let Some(line) = a_lines.next_line().await.unwrap() {
            kicked |= line == "You have been idle for too long, kicked out...";
        }
        assert!(kicked);

        let mut departures = 0;
        let mut b_lines = BufReader::new(b_read).lines();
        let reading = async {
            while let Some(line) = b_lines.next_line().await.unwrap() {
                if line.ends_with("] A left...") {
                    departures += 1;
                }
            }
        };
        tokio::time::timeout(Duration::from_secs(5), reading)
            .await
            .unwrap();
        let _b_write = keepalive.await.unwrap();
        assert_eq!(departures, 1);

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(server.registry().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_close_all_empties_registry() {
        let server = start(ServerConfig::default());
        let mut a = join(&server, "A").await;
        let mut b = join(&server, "B").await;

        server.close_all().await;

        let mut rest = Vec::new();
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::io::AsyncReadExt::read_to_end(&mut a, &mut rest),
        )
        .await
        .unwrap()
        .unwrap();
        tokio::time::timeout(
            Duration::from_secs(2),
            tokio::io::AsyncReadExt::read_to_end(&mut b, &mut rest),
        )
        .await
        .unwrap()
        .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(server.registry().lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_tcp_round_trip() {
        let server = start(ServerConfig::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { server.serve(listener).await });

        let stream = tokio::net::TcpStream::connect(addr).await.unwrap();
        let (read, mut write) = stream.into_split();
        let mut lines = BufReader::new(read).lines();

        let welcome = lines.next_line().await.unwrap().unwrap();
        assert!(welcome.ends_with(" joined."), "got {:?}", welcome);
        assert_eq!(lines.next_line().await.unwrap().unwrap(), "");

        write.write_all(b"hello\r\n").await.unwrap();
        let chat = lines.next_line().await.unwrap().unwrap();
        assert!(chat.ends_with(": hello"), "got {:?}", chat);
    }
}
