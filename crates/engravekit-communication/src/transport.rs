//! Line-oriented device transports
//!
//! The controller speaks a line-oriented request/response protocol over
//! a persistent connection: one command line out, at most one reply line
//! back. [`LineTransport`] is the seam between the session state machine
//! and the wire, so tests can substitute a scripted transport.

use async_trait::async_trait;
use engravekit_core::{ConnectionError, Result};
use std::io;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Line-oriented transport to an engraving controller
#[async_trait]
pub trait LineTransport: Send {
    /// Send one command line; a trailing newline is appended.
    async fn send_line(&mut self, line: &str) -> Result<()>;

    /// Wait up to `wait` for one reply line.
    ///
    /// Returns `Ok(None)` when the controller stays silent for the full
    /// wait - a timeout is policy data for the session, not an error.
    async fn recv_line(&mut self, wait: Duration) -> Result<Option<String>>;

    /// Release the connection.
    async fn shutdown(&mut self) -> Result<()>;
}

/// TCP implementation of [`LineTransport`]
pub struct TcpLineTransport {
    reader: BufReader<OwnedReadHalf>,
    writer: OwnedWriteHalf,
    peer: String,
}

impl TcpLineTransport {
    /// Dial the endpoint, bounded by `connect_timeout`.
    ///
    /// # Errors
    /// Fails with `ConnectTimeout` when the dial does not complete in
    /// time and `FailedToConnect` when the endpoint refuses or cannot
    /// be reached.
    pub async fn connect(host: &str, port: u16, connect_timeout: Duration) -> Result<Self> {
        let peer = format!("{}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect(&peer))
            .await
            .map_err(|_| ConnectionError::ConnectTimeout {
                timeout_ms: connect_timeout.as_millis() as u64,
            })?
            .map_err(|e| ConnectionError::FailedToConnect {
                endpoint: peer.clone(),
                reason: e.to_string(),
            })?;

        // One short command at a time; coalescing would only add latency.
        let _ = stream.set_nodelay(true);

        let (read_half, write_half) = stream.into_split();
        Ok(Self {
            reader: BufReader::new(read_half),
            writer: write_half,
            peer,
        })
    }

    /// The endpoint address this transport is connected to
    pub fn peer(&self) -> &str {
        &self.peer
    }
}

/// Classify a write error: a gone peer is session-fatal, anything else
/// is a per-command I/O failure.
fn classify_send_error(err: &io::Error) -> ConnectionError {
    match err.kind() {
        io::ErrorKind::BrokenPipe
        | io::ErrorKind::ConnectionReset
        | io::ErrorKind::ConnectionAborted
        | io::ErrorKind::NotConnected => ConnectionError::ConnectionLost {
            reason: err.to_string(),
        },
        _ => ConnectionError::IoError {
            reason: err.to_string(),
        },
    }
}

#[async_trait]
impl LineTransport for TcpLineTransport {
    async fn send_line(&mut self, line: &str) -> Result<()> {
        let write = async {
            self.writer.write_all(line.as_bytes()).await?;
            self.writer.write_all(b"\n").await?;
            self.writer.flush().await
        };
        write.await.map_err(|e| classify_send_error(&e).into())
    }

    async fn recv_line(&mut self, wait: Duration) -> Result<Option<String>> {
        let mut line = String::new();
        match timeout(wait, self.reader.read_line(&mut line)).await {
            // Silent controller: report the absence, let policy decide.
            Err(_) => Ok(None),
            Ok(Ok(0)) => Err(ConnectionError::ConnectionLost {
                reason: "connection closed by peer".to_string(),
            }
            .into()),
            Ok(Ok(_)) => Ok(Some(line.trim().to_string())),
            Ok(Err(e)) => Err(ConnectionError::ConnectionLost {
                reason: e.to_string(),
            }
            .into()),
        }
    }

    async fn shutdown(&mut self) -> Result<()> {
        let _ = self.writer.shutdown().await;
        Ok(())
    }
}
