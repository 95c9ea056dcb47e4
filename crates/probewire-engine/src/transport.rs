//! Transport layer: the byte pipe to the target.
//!
//! A transport sends frames and, when asked, performs one receive that
//! moves every complete inbound message onto the inbound channel. Bytes
//! are split on frame boundaries, so a reply and a stop-notification that
//! arrive in one segment reach the engine as two messages.

use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use probewire_core::frame::{self, ACK};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tokio::task::JoinHandle;

use crate::error::TransportError;

/// Producer side of the inbound channel.
pub type InboundSender = mpsc::UnboundedSender<String>;

/// Consumer side of the inbound channel.
pub(crate) type InboundReceiver = mpsc::UnboundedReceiver<String>;

/// Connection to the target.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Open `port`, delivering every received message to `inbound`.
    async fn connect(&self, port: &str, inbound: InboundSender) -> Result<(), TransportError>;

    /// Close the connection. Closing twice is harmless.
    fn disconnect(&self);

    /// Queue one frame or acknowledgment for writing. Never blocks.
    fn send(&self, frame: &str) -> Result<(), TransportError>;

    /// Move whatever has arrived onto the inbound channel. Never blocks.
    fn receive_once(&self) -> Result<(), TransportError>;

    /// Hint that the target is resetting and may split its answer.
    fn set_reset_mode(&self, _enabled: bool) {}
}

const READ_CHUNK: usize = 1024;

struct Connection {
    inbound: InboundSender,
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    outgoing: mpsc::UnboundedSender<String>,
    reader: JoinHandle<()>,
    pending: String,
}

/// TCP transport to a target's debug server.
///
/// A reader task and a writer task own the two halves of the socket;
/// the trait methods only touch channels and must run inside a tokio
/// runtime once connected.
pub struct TcpTransport {
    connect_timeout: Duration,
    reset_mode: AtomicBool,
    conn: Mutex<Option<Connection>>,
}

impl TcpTransport {
    /// Create an unconnected transport.
    pub fn new(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            reset_mode: AtomicBool::new(false),
            conn: Mutex::new(None),
        }
    }

    fn conn(&self) -> MutexGuard<'_, Option<Connection>> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Transport for TcpTransport {
    async fn connect(&self, port: &str, inbound: InboundSender) -> Result<(), TransportError> {
        let stream = tokio::time::timeout(self.connect_timeout, TcpStream::connect(port))
            .await
            .map_err(|_| {
                io::Error::new(io::ErrorKind::TimedOut, format!("connect to {port} timed out"))
            })??;
        stream.set_nodelay(true)?;
        let addr = stream.peer_addr()?;
        let (read_half, write_half) = stream.into_split();

        let (chunk_tx, chunks) = mpsc::unbounded_channel();
        let (outgoing, frames) = mpsc::unbounded_channel();
        let reader = tokio::spawn(read_chunks(read_half, chunk_tx));
        tokio::spawn(write_frames(write_half, frames));

        tracing::info!(%addr, "connected to target");
        let previous = self.conn().replace(Connection {
            inbound,
            chunks,
            outgoing,
            reader,
            pending: String::new(),
        });
        if let Some(old) = previous {
            old.reader.abort();
        }
        Ok(())
    }

    fn disconnect(&self) {
        if let Some(conn) = self.conn().take() {
            // Dropping `outgoing` lets the writer flush and shut down.
            conn.reader.abort();
            tracing::info!("disconnected from target");
        }
    }

    fn send(&self, frame: &str) -> Result<(), TransportError> {
        let guard = self.conn();
        let conn = guard.as_ref().ok_or(TransportError::NotConnected)?;
        conn.outgoing
            .send(frame.to_string())
            .map_err(|_| TransportError::Closed)
    }

    fn receive_once(&self) -> Result<(), TransportError> {
        let mut guard = self.conn();
        let conn = guard.as_mut().ok_or(TransportError::NotConnected)?;

        let mut received = false;
        let mut closed = false;
        loop {
            match conn.chunks.try_recv() {
                Ok(bytes) => {
                    conn.pending.push_str(&String::from_utf8_lossy(&bytes));
                    received = true;
                }
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    closed = true;
                    break;
                }
            }
        }

        let reset_mode = self.reset_mode.load(Ordering::Acquire);
        for message in assemble(&mut conn.pending, received, reset_mode) {
            tracing::trace!(message = ?message, "received");
            if conn.inbound.send(message).is_err() {
                return Err(TransportError::Closed);
            }
        }
        if closed {
            return Err(TransportError::Closed);
        }
        Ok(())
    }

    fn set_reset_mode(&self, enabled: bool) {
        self.reset_mode.store(enabled, Ordering::Release);
    }
}

async fn read_chunks(mut socket: OwnedReadHalf, chunks: mpsc::UnboundedSender<Vec<u8>>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match socket.read(&mut buf).await {
            Ok(0) => {
                tracing::info!("target closed the connection");
                return;
            }
            Ok(n) => {
                if chunks.send(buf[..n].to_vec()).is_err() {
                    return;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "read from target failed");
                return;
            }
        }
    }
}

async fn write_frames(mut socket: OwnedWriteHalf, mut frames: mpsc::UnboundedReceiver<String>) {
    while let Some(frame) = frames.recv().await {
        if let Err(e) = socket.write_all(frame.as_bytes()).await {
            tracing::warn!(error = %e, frame, "write to target failed");
            return;
        }
        tracing::trace!(frame, "sent");
    }
    // The peer may already be gone.
    let _ = socket.shutdown().await;
}

/// Split the pending bytes into inbound messages.
///
/// Complete messages always go out. A fragment that saw no new bytes
/// since the last receive is flushed as-is, except in reset mode, where
/// it is held until the rest of the stop-notification arrives. Bare
/// acknowledgments are never flushed alone.
fn assemble(pending: &mut String, received: bool, reset_mode: bool) -> Vec<String> {
    let mut messages = frame::drain_messages(pending);
    let stale = !received && !reset_mode;
    if stale && !pending.trim_start_matches(ACK).is_empty() {
        messages.push(std::mem::take(pending));
    }
    messages
}
