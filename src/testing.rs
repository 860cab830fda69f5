//! Helpers shared by the unit tests

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, DuplexStream};

use crate::message::ServerMessage;
use crate::session::{Session, SessionSettings};
use crate::types::SessionId;

/// Stand-in timestamp, same width as a real one
pub const TS_MASK: &str = "0000-00-00 00:00:00";

const READ_TIMEOUT: Duration = Duration::from_secs(2);
const SILENCE: Duration = Duration::from_millis(100);

pub fn test_settings() -> SessionSettings {
    SessionSettings {
        idle_timeout: Duration::from_secs(10),
        write_timeout: Duration::from_secs(1),
        max_line_len: 4096,
    }
}

/// Session writing into an in-memory pipe; the other end is returned
pub fn pipe_session(name: &str) -> (Arc<Session>, DuplexStream) {
    let (client, server) = tokio::io::duplex(4096);
    let session = Session::new(SessionId::new(), name.to_string(), server, test_settings());
    (session, client)
}

/// Read exactly one rendering of `expected`, ignoring the timestamp value
pub async fn expect_message(client: &mut DuplexStream, expected: &ServerMessage) {
    let want = expected.render(TS_MASK);
    let mut buf = vec![0u8; want.len()];
    tokio::time::timeout(READ_TIMEOUT, client.read_exact(&mut buf))
        .await
        .expect("timed out waiting for message")
        .expect("read failed");

    if has_timestamp(expected) {
        buf[1..1 + TS_MASK.len()].copy_from_slice(TS_MASK.as_bytes());
    }
    assert_eq!(String::from_utf8_lossy(&buf), want);
}

/// Whether the rendered text starts with `[<timestamp>`
fn has_timestamp(message: &ServerMessage) -> bool {
    !matches!(
        message,
        ServerMessage::Reply(_) | ServerMessage::IdleKick | ServerMessage::LineTooLong
    )
}

/// Nothing arrives within a short window
pub async fn expect_silence(client: &mut DuplexStream) {
    let mut buf = [0u8; 64];
    match tokio::time::timeout(SILENCE, client.read(&mut buf)).await {
        Err(_) | Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!(
            "unexpected bytes: {:?}",
            String::from_utf8_lossy(&buf[..n])
        ),
        Ok(Err(e)) => panic!("read failed: {}", e),
    }
}

/// Read up to and excluding the next `\n`
pub async fn read_line(client: &mut DuplexStream) -> String {
    let mut line = Vec::new();
    loop {
        let byte = tokio::time::timeout(READ_TIMEOUT, client.read_u8())
            .await
            .expect("timed out waiting for line")
            .expect("read failed");
        if byte == b'\n' {
            return String::from_utf8_lossy(&line).into_owned();
        }
        line.push(byte);
    }
}

/// Read `count` timestamped chat messages and return their bodies
pub async fn read_chat_lines(client: &mut DuplexStream, count: usize) -> Vec<String> {
    let prefix = format!("[{}] ", TS_MASK).len();
    let mut lines = Vec::with_capacity(count);
    for _ in 0..count {
        let line = read_line(client).await;
        let blank = read_line(client).await;
        assert!(blank.is_empty(), "chat message not followed by blank line");
        lines.push(line[prefix..].to_string());
    }
    lines
}
