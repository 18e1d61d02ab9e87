//! Newline-delimited framing over an async byte stream.
//!
//! One JSON object per line. Compact JSON never contains a raw newline, so the
//! writer only has to append `\n`. The reader skips blank lines, tolerates a
//! trailing `\r`, and reports a bad line as a non-fatal [`FrameError`] so the
//! caller can answer it and keep reading.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use super::{Message, RequestId, Response, RpcError};

/// Why a frame could not be turned into a [`Message`].
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The stream itself failed. Fatal.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("frame is not valid UTF-8")]
    Utf8,

    #[error("invalid JSON: {0}")]
    Parse(#[source] serde_json::Error),

    #[error("{reason}")]
    Invalid {
        id: Option<RequestId>,
        reason: String,
    },
}

impl FrameError {
    pub fn invalid(id: Option<RequestId>, reason: impl Into<String>) -> Self {
        FrameError::Invalid {
            id,
            reason: reason.into(),
        }
    }

    /// True if the connection cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(self, FrameError::Io(_))
    }

    /// The error response owed to the peer, if any.
    pub fn to_response(&self) -> Option<Response> {
        match self {
            FrameError::Io(_) => None,
            FrameError::Utf8 => Some(Response::error(None, RpcError::parse_error(self))),
            FrameError::Parse(e) => Some(Response::error(None, RpcError::parse_error(e))),
            FrameError::Invalid { id, reason } => {
                Some(Response::error(id.clone(), RpcError::invalid_request(reason)))
            }
        }
    }
}

/// Reads one [`Message`] per line.
pub struct FrameReader<R> {
    inner: R,
    buf: Vec<u8>,
}

impl<R: AsyncBufRead + Unpin> FrameReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            buf: Vec::new(),
        }
    }

    /// Read the next message. `Ok(None)` means the peer closed the stream.
    ///
    /// Cancel safe: a partially read line stays buffered for the next call.
    pub async fn read_message(&mut self) -> Result<Option<Message>, FrameError> {
        loop {
            let n = self.inner.read_until(b'\n', &mut self.buf).await?;
            if n == 0 && self.buf.is_empty() {
                return Ok(None);
            }

            let line = std::mem::take(&mut self.buf);
            let line = trim_line_ending(&line);
            if line.iter().all(u8::is_ascii_whitespace) {
                continue;
            }

            let text = std::str::from_utf8(line).map_err(|_| FrameError::Utf8)?;
            return Message::parse(text).map(Some);
        }
    }
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}

/// Writes one [`Message`] per line, flushing after each.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(inner: W) -> Self {
        Self { inner }
    }

    pub async fn write_message(&mut self, message: &Message) -> std::io::Result<()> {
        let mut bytes = serde_json::to_vec(message)?;
        bytes.push(b'\n');
        self.inner.write_all(&bytes).await?;
        self.inner.flush().await
    }

    pub async fn shutdown(&mut self) -> std::io::Result<()> {
        self.inner.shutdown().await
    }
}
