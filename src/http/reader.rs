//! Buffered byte reader for a single connection.
//!
//! `ByteReader` pulls bytes from any `AsyncRead` into an internal buffer and
//! hands them out as CRLF-terminated lines or fixed-length chunks. Bytes that
//! were read from the stream but not yet consumed stay buffered for the next
//! call, so one read syscall can serve several logical reads (and pipelined
//! requests are not lost).

use std::future::Future;
use std::io;
use std::time::Duration;

use bytes::{Buf, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Default buffer size for reads
const BUFFER_SIZE: usize = 4096;

const CRLF: &[u8] = b"\r\n";

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("no CRLF within {limit} bytes")]
    LineTooLong { limit: usize },

    #[error("stream exceeded {limit} bytes")]
    LimitExceeded { limit: usize },

    #[error("connection closed early with {buffered} bytes buffered")]
    ClosedEarly { buffered: usize },

    #[error("read timed out after {0:?}")]
    Timeout(Duration),

    #[error("read failed: {0}")]
    Io(#[from] io::Error),
}

pub struct ByteReader<S> {
    inner: S,
    buffer: BytesMut,
    timeout: Option<Duration>,
}

impl<S> ByteReader<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            buffer: BytesMut::with_capacity(BUFFER_SIZE),
            timeout: None,
        }
    }

    /// Applies `timeout` to every subsequent read operation.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn set_timeout(&mut self, timeout: Option<Duration>) {
        self.timeout = timeout;
    }

    /// Bytes read from the stream but not yet consumed.
    pub fn buffered(&self) -> &[u8] {
        &self.buffer
    }

    pub fn get_ref(&self) -> &S {
        &self.inner
    }

    /// Mutable access to the underlying stream, e.g. for writing responses.
    /// Reading from it directly bypasses the buffer.
    pub fn get_mut(&mut self) -> &mut S {
        &mut self.inner
    }

    pub fn into_inner(self) -> S {
        self.inner
    }
}

impl<S: AsyncRead + Unpin> ByteReader<S> {
    /// Returns the next line with its CRLF stripped.
    ///
    /// Fails with `LineTooLong` if no terminator shows up within `max_len`
    /// bytes, and with `ClosedEarly` if the stream ends first.
    pub async fn read_line(&mut self, max_len: usize) -> Result<Bytes, ReadError> {
        let timeout = self.timeout;
        deadline(timeout, self.read_line_inner(max_len)).await
    }

    /// Returns exactly `n` bytes, waiting until they are available.
    pub async fn read_exact(&mut self, n: usize) -> Result<Bytes, ReadError> {
        let timeout = self.timeout;
        deadline(timeout, self.read_exact_inner(n)).await
    }

    /// Reads until the stream closes, failing with `LimitExceeded` past `limit`.
    pub async fn read_to_end(&mut self, limit: usize) -> Result<Bytes, ReadError> {
        let timeout = self.timeout;
        deadline(timeout, self.read_to_end_inner(limit)).await
    }

    /// Waits until at least one byte is buffered. Returns the number of
    /// buffered bytes; zero means the peer closed the stream.
    pub async fn fill_buf(&mut self) -> Result<usize, ReadError> {
        if !self.buffer.is_empty() {
            return Ok(self.buffer.len());
        }
        let timeout = self.timeout;
        deadline(timeout, self.fill()).await
    }

    async fn read_line_inner(&mut self, max_len: usize) -> Result<Bytes, ReadError> {
        let mut scanned = 0;

        loop {
            if let Some(pos) = find_crlf(&self.buffer[scanned..]).map(|p| p + scanned) {
                if pos > max_len {
                    return Err(ReadError::LineTooLong { limit: max_len });
                }
                let line = self.buffer.split_to(pos).freeze();
                self.buffer.advance(CRLF.len());
                return Ok(line);
            }

            if self.buffer.len() >= max_len.saturating_add(CRLF.len()) {
                return Err(ReadError::LineTooLong { limit: max_len });
            }

            // A CR may be waiting for its LF
            scanned = self.buffer.len().saturating_sub(1);

            if self.fill().await? == 0 {
                return Err(ReadError::ClosedEarly {
                    buffered: self.buffer.len(),
                });
            }
        }
    }

    async fn read_exact_inner(&mut self, n: usize) -> Result<Bytes, ReadError> {
        if self.buffer.len() < n {
            self.buffer.reserve(n - self.buffer.len());
        }

        while self.buffer.len() < n {
            if self.fill().await? == 0 {
                return Err(ReadError::ClosedEarly {
                    buffered: self.buffer.len(),
                });
            }
        }

        Ok(self.buffer.split_to(n).freeze())
    }

    async fn read_to_end_inner(&mut self, limit: usize) -> Result<Bytes, ReadError> {
        loop {
            if self.buffer.len() > limit {
                return Err(ReadError::LimitExceeded { limit });
            }
            if self.fill().await? == 0 {
                return Ok(self.buffer.split().freeze());
            }
        }
    }

    async fn fill(&mut self) -> Result<usize, ReadError> {
        if self.buffer.capacity() == self.buffer.len() {
            self.buffer.reserve(BUFFER_SIZE);
        }
        let n = self.inner.read_buf(&mut self.buffer).await?;
        Ok(n)
    }
}

async fn deadline<T>(
    limit: Option<Duration>,
    fut: impl Future<Output = Result<T, ReadError>>,
) -> Result<T, ReadError> {
    match limit {
        Some(limit) => tokio::time::timeout(limit, fut)
            .await
            .map_err(|_| ReadError::Timeout(limit))?,
        None => fut.await,
    }
}

fn find_crlf(buf: &[u8]) -> Option<usize> {
    buf.windows(2).position(|w| w == CRLF)
}
