use std::fmt;

use bytes::Bytes;
use serde::Deserialize;
use tokio::io::AsyncRead;

use crate::http::error::Error;
use crate::http::headers::{Headers, is_field_value, is_token};
use crate::http::reader::{ByteReader, ReadError};
use crate::http::request::{Method, Request, Version};
use crate::http::response::{Response, StatusCode};

/// Offending lines are cut to this many bytes before they are stored.
const MAX_ERROR_LINE: usize = 64;

/// Empty lines tolerated before a request line (RFC 9112 section 2.2).
const MAX_LEADING_EMPTY_LINES: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParseErrorKind {
    MalformedStartLine,
    UnsupportedVersion,
    HeaderTooLarge,
    InvalidHeaderSyntax,
    BodyTooLarge,
    ConnectionClosedEarly,
}

impl ParseErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ParseErrorKind::MalformedStartLine => "malformed_start_line",
            ParseErrorKind::UnsupportedVersion => "unsupported_version",
            ParseErrorKind::HeaderTooLarge => "header_too_large",
            ParseErrorKind::InvalidHeaderSyntax => "invalid_header_syntax",
            ParseErrorKind::BodyTooLarge => "body_too_large",
            ParseErrorKind::ConnectionClosedEarly => "connection_closed_early",
        }
    }

    /// Status for the synthesized error response. `None` means the peer is
    /// gone and nothing should be written.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ParseErrorKind::MalformedStartLine
            | ParseErrorKind::UnsupportedVersion
            | ParseErrorKind::InvalidHeaderSyntax => Some(StatusCode::BAD_REQUEST),
            ParseErrorKind::HeaderTooLarge => Some(StatusCode::REQUEST_HEADER_FIELDS_TOO_LARGE),
            ParseErrorKind::BodyTooLarge => Some(StatusCode::PAYLOAD_TOO_LARGE),
            ParseErrorKind::ConnectionClosedEarly => None,
        }
    }
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A protocol violation, with the offending raw line (truncated).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {line:?}")]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub line: String,
}

impl ParseError {
    pub fn new(kind: ParseErrorKind, raw: &[u8]) -> Self {
        let raw = &raw[..raw.len().min(MAX_ERROR_LINE)];
        Self {
            kind,
            line: String::from_utf8_lossy(raw).into_owned(),
        }
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.kind.status()
    }
}

/// Protocol limits enforced while parsing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Limits {
    /// Longest start line or header line, CRLF excluded
    pub max_line_len: usize,
    /// Most header fields per message
    pub max_headers: usize,
    /// Total bytes of all header lines, CRLFs included
    pub max_header_bytes: usize,
    /// Largest accepted body
    pub max_body_size: u64,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_line_len: 8 * 1024,
            max_headers: 100,
            max_header_bytes: 64 * 1024,
            max_body_size: 1024 * 1024,
        }
    }
}

/// Reads one request from `reader`.
///
/// Parse failures come back as `Error::Parse`; read timeouts and transport
/// errors as `Error::Timeout` and `Error::Io`. Only the bytes of this request
/// are consumed, anything after it stays buffered.
pub async fn parse_request<S>(reader: &mut ByteReader<S>, limits: &Limits) -> Result<Request, Error>
where
    S: AsyncRead + Unpin,
{
    let line = read_start_line(reader, limits).await?;
    let (method, target, version) = parse_request_line(&line)?;
    let headers = parse_headers(reader, limits).await?;
    let body = read_body(reader, &headers, limits).await?;

    Ok(Request {
        method,
        target,
        version,
        headers,
        body,
    })
}

/// Reads one response from `reader`.
///
/// Bodies are framed by Content-Length, or run to end of stream when it is
/// absent. 1xx, 204 and 304 responses have no body.
pub async fn parse_response<S>(reader: &mut ByteReader<S>, limits: &Limits) -> Result<Response, Error>
where
    S: AsyncRead + Unpin,
{
    let line = next_line(reader, limits.max_line_len, ParseErrorKind::MalformedStartLine).await?;
    let (version, status, reason) = parse_status_line(&line)?;
    let headers = parse_headers(reader, limits).await?;

    let body = if !status.allows_body() {
        Bytes::new()
    } else if headers.contains("Content-Length") {
        read_body(reader, &headers, limits).await?
    } else {
        let limit = usize::try_from(limits.max_body_size).unwrap_or(usize::MAX);
        match reader.read_to_end(limit).await {
            Ok(body) => body,
            Err(ReadError::LimitExceeded { .. }) => {
                return Err(ParseError::new(ParseErrorKind::BodyTooLarge, b"").into());
            }
            Err(e) => return Err(map_read_error(e, reader.buffered())),
        }
    };

    Ok(Response {
        status,
        reason,
        version,
        headers,
        body: body.to_vec(),
    })
}

async fn read_start_line<S>(reader: &mut ByteReader<S>, limits: &Limits) -> Result<Bytes, Error>
where
    S: AsyncRead + Unpin,
{
    for _ in 0..=MAX_LEADING_EMPTY_LINES {
        let line = next_line(reader, limits.max_line_len, ParseErrorKind::MalformedStartLine).await?;
        if !line.is_empty() {
            return Ok(line);
        }
    }
    Err(ParseError::new(ParseErrorKind::MalformedStartLine, b"").into())
}

/// Splits `METHOD SP target SP version` on single spaces.
fn parse_request_line(line: &[u8]) -> Result<(Method, String, Version), ParseError> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedStartLine, line);

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let fields: Vec<&str> = text.split(' ').collect();
    let &[method, target, version] = fields.as_slice() else {
        return Err(malformed());
    };
    if method.is_empty() || target.is_empty() || version.is_empty() {
        return Err(malformed());
    }

    let method = Method::parse(method).ok_or_else(malformed)?;

    if !target.bytes().all(|b| b.is_ascii_graphic()) {
        return Err(malformed());
    }

    let version = Version::parse(version)
        .ok_or_else(|| ParseError::new(ParseErrorKind::UnsupportedVersion, line))?;

    Ok((method, target.to_string(), version))
}

/// Splits `version SP status SP reason`. The reason may be empty or contain
/// spaces.
fn parse_status_line(line: &[u8]) -> Result<(Version, StatusCode, String), ParseError> {
    let malformed = || ParseError::new(ParseErrorKind::MalformedStartLine, line);

    let text = std::str::from_utf8(line).map_err(|_| malformed())?;
    let mut parts = text.splitn(3, ' ');
    let version = parts.next().ok_or_else(malformed)?;
    let code = parts.next().ok_or_else(malformed)?;
    let reason = parts.next().unwrap_or("");

    let version = Version::parse(version)
        .ok_or_else(|| ParseError::new(ParseErrorKind::UnsupportedVersion, line))?;

    if code.len() != 3 || !code.bytes().all(|b| b.is_ascii_digit()) {
        return Err(malformed());
    }
    let status = code
        .parse()
        .ok()
        .and_then(StatusCode::new)
        .ok_or_else(malformed)?;

    Ok((version, status, reason.to_string()))
}

async fn parse_headers<S>(reader: &mut ByteReader<S>, limits: &Limits) -> Result<Headers, Error>
where
    S: AsyncRead + Unpin,
{
    let mut headers = Headers::new();
    let mut total = 0usize;

    loop {
        let budget = limits.max_line_len.min(limits.max_header_bytes.saturating_sub(total));
        let line = next_line(reader, budget, ParseErrorKind::HeaderTooLarge).await?;

        if line.is_empty() {
            return Ok(headers);
        }

        total += line.len() + 2;
        if headers.len() >= limits.max_headers {
            return Err(ParseError::new(ParseErrorKind::HeaderTooLarge, &line).into());
        }

        let (name, value) = parse_header_line(&line)?;
        headers.append(name, value);
    }
}

/// Splits a header line on its first colon and trims optional whitespace
/// around name and value.
fn parse_header_line(line: &[u8]) -> Result<(String, String), ParseError> {
    let invalid = || ParseError::new(ParseErrorKind::InvalidHeaderSyntax, line);

    // obs-fold continuation lines are not supported
    if line.first().is_some_and(|b| *b == b' ' || *b == b'\t') {
        return Err(invalid());
    }

    let text = std::str::from_utf8(line).map_err(|_| invalid())?;
    let (name, value) = text.split_once(':').ok_or_else(invalid)?;
    let name = name.trim_matches(is_ows);
    let value = value.trim_matches(is_ows);

    if !is_token(name) || !is_field_value(value) {
        return Err(invalid());
    }

    Ok((name.to_string(), value.to_string()))
}

async fn read_body<S>(reader: &mut ByteReader<S>, headers: &Headers, limits: &Limits) -> Result<Bytes, Error>
where
    S: AsyncRead + Unpin,
{
    if let Some(te) = headers.get("Transfer-Encoding") {
        let line = format!("Transfer-Encoding: {}", te);
        return Err(ParseError::new(ParseErrorKind::InvalidHeaderSyntax, line.as_bytes()).into());
    }

    let Some(length) = content_length(headers)? else {
        return Ok(Bytes::new());
    };

    let too_large = || {
        let line = format!("Content-Length: {}", length);
        ParseError::new(ParseErrorKind::BodyTooLarge, line.as_bytes())
    };
    if length > limits.max_body_size {
        return Err(too_large().into());
    }
    let length = usize::try_from(length).map_err(|_| too_large())?;

    reader
        .read_exact(length)
        .await
        .map_err(|e| map_read_error(e, b""))
}

/// Returns the declared body length. Repeated headers must agree.
fn content_length(headers: &Headers) -> Result<Option<u64>, ParseError> {
    let mut declared = None;

    for value in headers.get_all("Content-Length") {
        let line = format!("Content-Length: {}", value);
        if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
            return Err(ParseError::new(ParseErrorKind::InvalidHeaderSyntax, line.as_bytes()));
        }
        // all digits, so the only failure left is overflow
        let length: u64 = value
            .parse()
            .map_err(|_| ParseError::new(ParseErrorKind::BodyTooLarge, line.as_bytes()))?;

        match declared {
            Some(prev) if prev != length => {
                return Err(ParseError::new(ParseErrorKind::InvalidHeaderSyntax, line.as_bytes()));
            }
            _ => declared = Some(length),
        }
    }

    Ok(declared)
}

async fn next_line<S>(reader: &mut ByteReader<S>, max_len: usize, too_long: ParseErrorKind) -> Result<Bytes, Error>
where
    S: AsyncRead + Unpin,
{
    match reader.read_line(max_len).await {
        Ok(line) => Ok(line),
        Err(ReadError::LineTooLong { .. }) => Err(ParseError::new(too_long, reader.buffered()).into()),
        Err(e) => Err(map_read_error(e, reader.buffered())),
    }
}

fn map_read_error(err: ReadError, buffered: &[u8]) -> Error {
    match err {
        ReadError::ClosedEarly { .. } => {
            ParseError::new(ParseErrorKind::ConnectionClosedEarly, buffered).into()
        }
        ReadError::LineTooLong { .. } => ParseError::new(ParseErrorKind::HeaderTooLarge, buffered).into(),
        ReadError::LimitExceeded { .. } => ParseError::new(ParseErrorKind::BodyTooLarge, buffered).into(),
        ReadError::Timeout(after) => Error::Timeout { op: "read", after },
        ReadError::Io(source) => Error::Io { op: "read", source },
    }
}

fn is_ows(c: char) -> bool {
    c == ' ' || c == '\t'
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn parse(raw: &[u8]) -> Result<Request, Error> {
        let mut reader = ByteReader::new(raw);
        parse_request(&mut reader, &Limits::default()).await
    }

    #[tokio::test]
    async fn parse_simple_get() {
        let req = parse(b"GET / HTTP/1.1\r\nHost: example.com\r\n\r\n").await.unwrap();

        assert_eq!(req.target, "/");
        assert_eq!(req.header("Host"), Some("example.com"));
    }

    #[test]
    fn request_line_rejects_double_space() {
        let err = parse_request_line(b"GET  / HTTP/1.1").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::MalformedStartLine);
    }

    #[test]
    fn status_line_allows_spaces_in_reason() {
        let (_, status, reason) = parse_status_line(b"HTTP/1.1 418 I'm a teapot").unwrap();
        assert_eq!(status.as_u16(), 418);
        assert_eq!(reason, "I'm a teapot");
    }

    #[test]
    fn error_line_is_truncated() {
        let err = ParseError::new(ParseErrorKind::InvalidHeaderSyntax, &[b'x'; 500]);
        assert_eq!(err.line.len(), MAX_ERROR_LINE);
    }
}
