use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf};
use tokio::sync::mpsc::Receiver;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

use super::telnet::{Negotiator, TerminalInfo};
use super::{OutputHandle, TransportError};

const READ_CHUNK: usize = 512;

/// Reading side of a telnet connection. Negotiation is answered on the shared
/// [`OutputHandle`]; only application bytes are returned to the caller.
pub struct TelnetReader<R> {
    inner: R,
    negotiator: Negotiator,
    output: OutputHandle,
    scratch: Box<[u8]>,
    replies: Vec<u8>,
}

impl<R> TelnetReader<R> {
    /// Wrap `inner` and immediately queue the negotiation offer on `output`.
    pub fn new(inner: R, output: OutputHandle) -> Self {
        output.write(Negotiator::offer());
        Self {
            inner,
            negotiator: Negotiator::new(),
            output,
            scratch: vec![0u8; READ_CHUNK].into_boxed_slice(),
            replies: Vec::new(),
        }
    }

    pub fn terminal(&self) -> &TerminalInfo {
        self.negotiator.terminal()
    }

    pub fn output(&self) -> &OutputHandle {
        &self.output
    }
}

impl<R: AsyncRead + Unpin> TelnetReader<R> {
    /// Wait until at least one application byte is available.
    pub async fn read(&mut self) -> Result<Bytes, TransportError> {
        let mut data = Vec::new();
        loop {
            let n = self.inner.read(&mut self.scratch).await?;
            if n == 0 {
                return Err(TransportError::Closed);
            }
            self.negotiator
                .feed(&self.scratch[..n], &mut data, &mut self.replies);
            if !self.replies.is_empty() {
                trace!(target: "mmorogue::telnet", len = self.replies.len(), "negotiation reply");
                self.output.write(std::mem::take(&mut self.replies));
            }
            if !data.is_empty() {
                return Ok(Bytes::from(data));
            }
        }
    }
}

/// Both halves of an accepted connection plus the writer task that owns the
/// socket's write side.
pub struct Connection<R> {
    pub reader: TelnetReader<R>,
    pub output: OutputHandle,
    pub writer: JoinHandle<()>,
}

/// Split `stream`, start its writer task, and send the negotiation offer.
pub fn open<S>(stream: S) -> Connection<ReadHalf<S>>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
{
    let (read_half, write_half) = tokio::io::split(stream);
    let (output, rx) = OutputHandle::channel();
    let writer = tokio::spawn(drain(write_half, rx));
    let reader = TelnetReader::new(read_half, output.clone());
    Connection {
        reader,
        output,
        writer,
    }
}

async fn drain<W>(mut sink: W, mut rx: Receiver<Bytes>)
where
    W: AsyncWrite + Unpin,
{
    while let Some(chunk) = rx.recv().await {
        if let Err(err) = sink.write_all(&chunk).await {
            debug!(target: "mmorogue::transport", error = %err, "write failed; closing writer");
            return;
        }
    }
    let _ = sink.shutdown().await;
}
