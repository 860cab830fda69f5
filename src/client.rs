//! Terminal client front-end
//!
//! No protocol logic: every input line is forwarded verbatim with a `\n`
//! appended, and every byte from the server is printed verbatim.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::AppError;

/// Input line that ends the client without telling the server
pub const QUIT_TOKEN: &str = "\\q";

/// Why the client loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    /// The user typed the quit token
    Quit,
    /// The server closed the connection
    ServerClosed,
    /// Local input reached end of file
    InputClosed,
}

/// Pump lines from `input` to the server and bytes from the server to `output`
pub async fn run<I, O, S>(input: I, mut output: O, stream: S) -> Result<Exit, AppError>
where
    I: AsyncBufRead + Unpin,
    O: AsyncWrite + Unpin,
    S: AsyncRead + AsyncWrite + Unpin,
{
    let (mut server_read, mut server_write) = tokio::io::split(stream);
    let mut lines = input.lines();
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            line = lines.next_line() => match line? {
                Some(line) if line == QUIT_TOKEN => return Ok(Exit::Quit),
                Some(mut line) => {
                    line.push('\n');
                    server_write.write_all(line.as_bytes()).await?;
                }
                None => return Ok(Exit::InputClosed),
            },
            read = server_read.read(&mut buf) => {
                let n = read?;
                if n == 0 {
                    return Ok(Exit::ServerClosed);
                }
                output.write_all(&buf[..n]).await?;
                output.flush().await?;
            }
        }
    }
}
