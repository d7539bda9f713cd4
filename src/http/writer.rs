use std::time::Duration;

use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::error::Error;
use crate::http::headers::{is_field_value, is_token};
use crate::http::response::Response;

/// Serializes a response to its exact wire form.
///
/// Headers are written in the order given. `Content-Length` is always
/// computed from the body: a caller-supplied value is overwritten in place,
/// and appended after the other headers when missing. `Transfer-Encoding` is
/// dropped since bodies are never chunked.
pub fn serialize_response(resp: &Response) -> Vec<u8> {
    serialize(resp, true)
}

/// Serializes only the status line and headers, for replies to HEAD.
/// `Content-Length` still reports the full body length.
pub fn serialize_response_head(resp: &Response) -> Vec<u8> {
    serialize(resp, false)
}

fn serialize(resp: &Response, include_body: bool) -> Vec<u8> {
    let framed = resp.status.allows_body();
    let mut buf = Vec::with_capacity(256 + if include_body { resp.body.len() } else { 0 });

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        resp.version.as_str(),
        resp.status.as_u16(),
        sanitize_reason(&resp.reason)
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    let mut length_written = false;
    for (k, v) in resp.headers.iter() {
        if k.eq_ignore_ascii_case("Content-Length") {
            if framed && !length_written {
                write_header(&mut buf, k, &resp.body.len().to_string());
                length_written = true;
            }
            continue;
        }
        if k.eq_ignore_ascii_case("Transfer-Encoding") {
            continue;
        }
        if !is_token(k) || !is_field_value(v) {
            tracing::warn!(header = %k, "Dropping response header with invalid characters");
            continue;
        }
        write_header(&mut buf, k, v);
    }
    if framed && !length_written {
        write_header(&mut buf, "Content-Length", &resp.body.len().to_string());
    }

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    // Body
    if include_body && framed {
        buf.extend_from_slice(&resp.body);
    }

    buf
}

fn write_header(buf: &mut Vec<u8>, name: &str, value: &str) {
    buf.extend_from_slice(name.as_bytes());
    buf.extend_from_slice(b": ");
    buf.extend_from_slice(value.as_bytes());
    buf.extend_from_slice(b"\r\n");
}

fn sanitize_reason(reason: &str) -> String {
    reason.chars().filter(|c| *c != '\r' && *c != '\n').collect()
}

/// A serialized response and how much of it has been written.
pub struct ResponseWriter {
    buffer: Vec<u8>,
    written: usize,
}

impl ResponseWriter {
    pub fn new(response: &Response) -> Self {
        Self {
            buffer: serialize_response(response),
            written: 0,
        }
    }

    /// Like `new`, but leaves the body out (replies to HEAD).
    pub fn head(response: &Response) -> Self {
        Self {
            buffer: serialize_response_head(response),
            written: 0,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    pub fn written(&self) -> usize {
        self.written
    }

    /// Writes the whole response and flushes.
    ///
    /// The entire write must finish within `timeout`. A short write followed
    /// by a timeout is a failed connection; there is no resume.
    pub async fn write_to_stream<W>(&mut self, stream: &mut W, timeout: Duration) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        tokio::time::timeout(timeout, self.write_all(stream))
            .await
            .map_err(|_| Error::Timeout {
                op: "write",
                after: timeout,
            })?
    }

    async fn write_all<W>(&mut self, stream: &mut W) -> Result<(), Error>
    where
        W: AsyncWrite + Unpin,
    {
        let io_err = |source: std::io::Error| Error::Io { op: "write", source };

        while self.written < self.buffer.len() {
            let n = stream
                .write(&self.buffer[self.written..])
                .await
                .map_err(io_err)?;

            if n == 0 {
                return Err(io_err(std::io::ErrorKind::WriteZero.into()));
            }

            self.written += n;
        }

        stream.flush().await.map_err(io_err)
    }
}
