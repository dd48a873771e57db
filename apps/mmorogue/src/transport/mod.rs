//! Byte-stream transport for telnet clients.
//!
//! Incoming bytes go through the [`telnet::Negotiator`] before the session
//! sees them; outgoing bytes are queued on an [`OutputHandle`] and drained by a
//! dedicated writer task, so the simulation never blocks on a slow socket. The
//! queue is bounded; a client that stops reading loses output instead of
//! growing it.

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::trace;

pub mod ansi;
pub mod connection;
pub mod telnet;

pub use connection::{open, Connection, TelnetReader};
pub use telnet::{NegotiationState, Negotiator, TerminalInfo};

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection closed by peer")]
    Closed,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Chunks queued per connection before further writes are dropped. One
/// chunk is at most a full repaint, so this also bounds the memory a stalled
/// client can pin.
pub const OUTPUT_QUEUE_CHUNKS: usize = 64;

/// Raw output capability for one connection. Cloning is cheap; the writer task
/// exits once every handle has been dropped.
#[derive(Clone, Debug)]
pub struct OutputHandle {
    tx: mpsc::Sender<Bytes>,
}

impl OutputHandle {
    /// Create a handle together with the receiving end a writer drains.
    pub fn channel() -> (Self, mpsc::Receiver<Bytes>) {
        Self::with_capacity(OUTPUT_QUEUE_CHUNKS)
    }

    pub fn with_capacity(chunks: usize) -> (Self, mpsc::Receiver<Bytes>) {
        let (tx, rx) = mpsc::channel(chunks);
        (Self { tx }, rx)
    }

    /// Queue bytes unmodified. Never waits: returns `false` when the bytes
    /// were dropped, either because the queue is full or because the
    /// connection is gone.
    pub fn write(&self, bytes: impl Into<Bytes>) -> bool {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return !self.tx.is_closed();
        }
        match self.tx.try_send(bytes) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(dropped)) => {
                trace!(target: "mmorogue::transport", len = dropped.len(), "output queue full; dropping chunk");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        }
    }

    /// Move the remote cursor to the 0-based `(x, y)` and write `bytes` there.
    pub fn write_at(&self, x: usize, y: usize, bytes: &[u8]) -> bool {
        let mut out = Vec::with_capacity(bytes.len() + 8);
        ansi::move_to(&mut out, x, y);
        out.extend_from_slice(bytes);
        self.write(out)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Chunks waiting for the writer.
    pub fn queued(&self) -> usize {
        self.tx.max_capacity() - self.tx.capacity()
    }
}
