use bytes::{Buf, BytesMut};
use tokio::io::AsyncRead;

use crate::transport::{TelnetReader, TransportError};

const BACKSPACE: u8 = 0x08;
const DELETE: u8 = 0x7f;
const ERASE: &[u8] = b"\x08 \x08";

/// Whether typed characters are echoed back. The server negotiated
/// `WILL ECHO`, so the client shows nothing unless we send it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Echo {
    Visible,
    Hidden,
}

/// Edits one line of at most `max` bytes. State survives across chunks, so a
/// CR at the end of one read still pairs with the LF at the start of the next.
#[derive(Debug)]
pub struct LineBuffer {
    line: Vec<u8>,
    max: usize,
    echo: Echo,
    got_return: bool,
}

impl LineBuffer {
    pub fn new(max: usize, echo: Echo) -> Self {
        Self {
            line: Vec::with_capacity(max),
            max,
            echo,
            got_return: false,
        }
    }

    /// Consume bytes until the line ends. Returns how many bytes of `input`
    /// were used once it has; `None` means all of `input` was used and the
    /// line is still open. Echo output is appended to `echo_out`.
    pub fn feed(&mut self, input: &[u8], echo_out: &mut Vec<u8>) -> Option<usize> {
        for (i, &byte) in input.iter().enumerate() {
            if self.got_return {
                self.got_return = false;
                // CR LF and CR NUL end here; anything else after a CR
                // belongs to whatever reads next.
                return Some(if matches!(byte, b'\n' | 0) { i + 1 } else { i });
            }
            match byte {
                b'\r' => self.got_return = true,
                b'\n' => return Some(i + 1),
                BACKSPACE | DELETE => {
                    if self.line.pop().is_some() && self.echo == Echo::Visible {
                        echo_out.extend_from_slice(ERASE);
                    }
                }
                0x20..=0x7e if self.line.len() < self.max => {
                    self.line.push(byte);
                    if self.echo == Echo::Visible {
                        echo_out.push(byte);
                    }
                }
                _ => {}
            }
        }
        None
    }

    /// True after a CR that has not yet been paired with what follows it.
    pub fn awaiting_line_feed(&self) -> bool {
        self.got_return
    }

    pub fn into_string(self) -> String {
        String::from_utf8_lossy(&self.line).into_owned()
    }
}

/// Reads lines from a telnet connection, keeping any bytes that arrive after
/// a line for the next caller.
#[derive(Debug, Default)]
pub struct LineEditor {
    pending: BytesMut,
}

impl LineEditor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Input received but not consumed by any line so far.
    pub fn take_pending(&mut self) -> BytesMut {
        std::mem::take(&mut self.pending)
    }

    pub async fn read_line<R>(
        &mut self,
        reader: &mut TelnetReader<R>,
        max: usize,
        echo: Echo,
    ) -> Result<String, TransportError>
    where
        R: AsyncRead + Unpin,
    {
        let mut line = LineBuffer::new(max, echo);
        let mut echo_out = Vec::new();
        loop {
            let consumed = line.feed(&self.pending, &mut echo_out);
            reader.output().write(std::mem::take(&mut echo_out));
            match consumed {
                Some(n) => {
                    self.pending.advance(n);
                    return Ok(line.into_string());
                }
                None => self.pending.clear(),
            }
            let chunk = reader.read().await?;
            self.pending.extend_from_slice(&chunk);
        }
    }
}
