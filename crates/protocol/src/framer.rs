//! Line-delimited JSON framing over any async byte stream.
//!
//! Each [`Message`] is written as its JSON encoding followed by a single
//! `\n`. Reads are line-oriented and tolerate partial TCP reads: bytes that
//! don't yet contain a full line are buffered until the next read.
//!
//! [`Framer`] bundles a reader and writer half for callers that own the
//! stream outright (e.g. the agent client's single-task loop). Callers that
//! need the reader and writer to live on separate tasks -- the commander's
//! per-session reader loop plus its serialized writer task -- should call
//! [`Framer::split`] instead.

use std::fmt;
use std::time::Duration;

use tokio::io::{split, unsplit, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};

use crate::message::Message;

#[derive(Debug)]
pub enum FramerError {
    Io(std::io::Error),
    Decode(serde_json::Error),
    Timeout,
    Eof,
}

impl fmt::Display for FramerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FramerError::Io(e) => write!(f, "I/O error: {e}"),
            FramerError::Decode(e) => write!(f, "malformed frame: {e}"),
            FramerError::Timeout => write!(f, "read timed out"),
            FramerError::Eof => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for FramerError {}

impl From<std::io::Error> for FramerError {
    fn from(e: std::io::Error) -> Self {
        FramerError::Io(e)
    }
}

impl From<serde_json::Error> for FramerError {
    fn from(e: serde_json::Error) -> Self {
        FramerError::Decode(e)
    }
}

/// Incremental line splitter, analogous in shape to a length-prefixed frame
/// decoder but delimited by `\n` instead of a byte count.
#[derive(Debug, Default)]
struct LineBuffer {
    buf: Vec<u8>,
}

impl LineBuffer {
    fn feed(&mut self, bytes: &[u8]) -> Result<Vec<Message>, FramerError> {
        self.buf.extend_from_slice(bytes);
        let mut messages = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.buf.drain(..=pos).collect();
            let line = &line[..line.len() - 1];
            if line.is_empty() {
                continue;
            }
            messages.push(serde_json::from_slice(line)?);
        }
        Ok(messages)
    }

    fn discard_partial(&mut self) {
        self.buf.clear();
    }
}

const DEFAULT_READ_BUF: usize = 8192;

/// The read half of a framed connection.
pub struct FrameReader<R> {
    inner: R,
    incoming: LineBuffer,
    read_buf: Vec<u8>,
}

impl<R> FrameReader<R>
where
    R: AsyncRead + Unpin,
{
    pub fn new(inner: R) -> Self {
        Self::with_capacity(inner, DEFAULT_READ_BUF)
    }

    /// Like [`FrameReader::new`], but with an explicit per-read buffer size
    /// (the agent's `CONN_BUFF` setting mirrors this).
    pub fn with_capacity(inner: R, capacity: usize) -> Self {
        FrameReader {
            inner,
            incoming: LineBuffer::default(),
            read_buf: vec![0u8; capacity.max(1)],
        }
    }

    /// Reads one burst of bytes (bounded by `timeout`) and returns every
    /// complete frame it contained. A read that yields zero bytes is EOF;
    /// any bytes left over in the buffer at that point are discarded rather
    /// than surfaced as a frame.
    pub async fn read_frames(&mut self, timeout: Duration) -> Result<Vec<Message>, FramerError> {
        let n = match tokio::time::timeout(timeout, self.inner.read(&mut self.read_buf)).await {
            Ok(result) => result?,
            Err(_) => return Err(FramerError::Timeout),
        };
        if n == 0 {
            self.incoming.discard_partial();
            return Err(FramerError::Eof);
        }
        self.incoming.feed(&self.read_buf[..n])
    }
}

/// The write half of a framed connection.
pub struct FrameWriter<W> {
    inner: W,
}

impl<W> FrameWriter<W>
where
    W: AsyncWrite + Unpin,
{
    pub fn new(inner: W) -> Self {
        FrameWriter { inner }
    }

    pub async fn write_frame(&mut self, message: &Message) -> Result<(), FramerError> {
        let mut line = serde_json::to_vec(message)?;
        line.push(b'\n');
        self.inner.write_all(&line).await?;
        self.inner.flush().await?;
        Ok(())
    }
}

/// A framed duplex connection carrying [`Message`] values.
pub struct Framer<S> {
    reader: FrameReader<ReadHalf<S>>,
    writer: FrameWriter<WriteHalf<S>>,
}

impl<S> Framer<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S) -> Self {
        let (r, w) = split(stream);
        Framer {
            reader: FrameReader::new(r),
            writer: FrameWriter::new(w),
        }
    }

    /// Like [`Framer::new`], but with an explicit per-read buffer size.
    pub fn with_capacity(stream: S, capacity: usize) -> Self {
        let (r, w) = split(stream);
        Framer {
            reader: FrameReader::with_capacity(r, capacity),
            writer: FrameWriter::new(w),
        }
    }

    pub fn into_inner(self) -> S {
        unsplit(self.reader.inner, self.writer.inner)
    }

    /// Splits into independently-ownable reader/writer halves, for a
    /// session whose reader loop and writer task run on separate tasks.
    pub fn split(self) -> (FrameReader<ReadHalf<S>>, FrameWriter<WriteHalf<S>>) {
        (self.reader, self.writer)
    }

    pub async fn read_frames(&mut self, timeout: Duration) -> Result<Vec<Message>, FramerError> {
        self.reader.read_frames(timeout).await
    }

    pub async fn write_frame(&mut self, message: &Message) -> Result<(), FramerError> {
        self.writer.write_frame(message).await
    }
}
