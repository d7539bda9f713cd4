use std::fmt;

use crate::http::headers::Headers;
use crate::http::parser::ParseError;
use crate::http::request::Version;

/// An HTTP status code in the range 100-599.
///
/// Common codes used by the server are available as associated constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct StatusCode(u16);

impl StatusCode {
    /// 100 Continue
    pub const CONTINUE: StatusCode = StatusCode(100);
    /// 200 OK
    pub const OK: StatusCode = StatusCode(200);
    /// 201 Created
    pub const CREATED: StatusCode = StatusCode(201);
    /// 204 No Content
    pub const NO_CONTENT: StatusCode = StatusCode(204);
    /// 304 Not Modified
    pub const NOT_MODIFIED: StatusCode = StatusCode(304);
    /// 400 Bad Request
    pub const BAD_REQUEST: StatusCode = StatusCode(400);
    /// 404 Not Found
    pub const NOT_FOUND: StatusCode = StatusCode(404);
    /// 405 Method Not Allowed
    pub const METHOD_NOT_ALLOWED: StatusCode = StatusCode(405);
    /// 413 Content Too Large
    pub const PAYLOAD_TOO_LARGE: StatusCode = StatusCode(413);
    /// 431 Request Header Fields Too Large
    pub const REQUEST_HEADER_FIELDS_TOO_LARGE: StatusCode = StatusCode(431);
    /// 500 Internal Server Error
    pub const INTERNAL_SERVER_ERROR: StatusCode = StatusCode(500);
    /// 503 Service Unavailable
    pub const SERVICE_UNAVAILABLE: StatusCode = StatusCode(503);

    /// Creates a status code, returning `None` outside 100-599.
    ///
    /// # Example
    ///
    /// ```
    /// # use wireline::http::response::StatusCode;
    /// assert_eq!(StatusCode::new(404), Some(StatusCode::NOT_FOUND));
    /// assert_eq!(StatusCode::new(99), None);
    /// assert_eq!(StatusCode::new(600), None);
    /// ```
    pub fn new(code: u16) -> Option<Self> {
        (100..=599).contains(&code).then_some(StatusCode(code))
    }

    /// Returns the numeric HTTP status code.
    pub fn as_u16(&self) -> u16 {
        self.0
    }

    /// Returns the standard reason phrase, or an empty string for codes
    /// without a registered phrase.
    ///
    /// # Example
    ///
    /// ```
    /// # use wireline::http::response::StatusCode;
    /// assert_eq!(StatusCode::OK.reason_phrase(), "OK");
    /// assert_eq!(StatusCode::NOT_FOUND.reason_phrase(), "Not Found");
    /// ```
    pub fn reason_phrase(&self) -> &'static str {
        match self.0 {
            100 => "Continue",
            101 => "Switching Protocols",
            200 => "OK",
            201 => "Created",
            202 => "Accepted",
            204 => "No Content",
            206 => "Partial Content",
            301 => "Moved Permanently",
            302 => "Found",
            303 => "See Other",
            304 => "Not Modified",
            307 => "Temporary Redirect",
            308 => "Permanent Redirect",
            400 => "Bad Request",
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "Not Found",
            405 => "Method Not Allowed",
            408 => "Request Timeout",
            409 => "Conflict",
            411 => "Length Required",
            413 => "Content Too Large",
            414 => "URI Too Long",
            415 => "Unsupported Media Type",
            429 => "Too Many Requests",
            431 => "Request Header Fields Too Large",
            500 => "Internal Server Error",
            501 => "Not Implemented",
            502 => "Bad Gateway",
            503 => "Service Unavailable",
            504 => "Gateway Timeout",
            505 => "HTTP Version Not Supported",
            _ => "",
        }
    }

    /// Whether a response with this status may carry a body. 1xx, 204 and
    /// 304 responses never do.
    pub fn allows_body(&self) -> bool {
        !(self.0 < 200 || self.0 == 204 || self.0 == 304)
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Represents a complete HTTP response ready to be sent to a client.
///
/// `Content-Length` does not need to be set by callers: the serializer
/// always writes the real body length and ignores any supplied value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// The HTTP status code
    pub status: StatusCode,
    /// Reason phrase for the status line
    pub reason: String,
    /// Protocol version for the status line
    pub version: Version,
    /// HTTP headers in the order they will be written
    pub headers: Headers,
    /// Response body as bytes
    pub body: Vec<u8>,
}

/// Builder for constructing HTTP responses in a fluent style.
///
/// # Example
///
/// ```
/// # use wireline::http::response::{ResponseBuilder, StatusCode};
/// let response = ResponseBuilder::new(StatusCode::OK)
///     .header("Content-Type", "application/json")
///     .body(b"{}".to_vec())
///     .build();
/// assert_eq!(response.reason, "OK");
/// ```
pub struct ResponseBuilder {
    status: StatusCode,
    reason: Option<String>,
    version: Version,
    headers: Headers,
    body: Vec<u8>,
}

impl ResponseBuilder {
    /// Creates a new response builder with the specified status code.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            reason: None,
            version: Version::Http11,
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    /// Overrides the standard reason phrase.
    pub fn reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    /// Appends a header. Repeated names are kept in order.
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    /// Sets the response body.
    pub fn body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Response {
        Response {
            status: self.status,
            reason: self
                .reason
                .unwrap_or_else(|| self.status.reason_phrase().to_string()),
            version: self.version,
            headers: self.headers,
            body: self.body,
        }
    }
}

impl Response {
    pub fn builder(status: StatusCode) -> ResponseBuilder {
        ResponseBuilder::new(status)
    }

    /// Creates a simple 200 OK response with the given body.
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(StatusCode::OK).body(body).build()
    }

    /// Creates a `text/plain` response.
    pub fn text(status: StatusCode, body: impl Into<Vec<u8>>) -> Self {
        ResponseBuilder::new(status)
            .header("Content-Type", "text/plain")
            .body(body)
            .build()
    }

    /// Creates a `text/plain` response whose body repeats the status line,
    /// e.g. `404 Not Found`.
    pub fn status_page(status: StatusCode) -> Self {
        Self::text(
            status,
            format!("{} {}", status.as_u16(), status.reason_phrase()),
        )
    }

    /// Creates a 404 Not Found response.
    pub fn not_found() -> Self {
        Self::status_page(StatusCode::NOT_FOUND)
    }

    /// Creates a 500 Internal Server Error response.
    ///
    /// The body is always generic; handler error details are never echoed.
    pub fn internal_error() -> Self {
        Self::status_page(StatusCode::INTERNAL_SERVER_ERROR)
    }

    /// Creates a 503 Service Unavailable response.
    pub fn service_unavailable() -> Self {
        Self::status_page(StatusCode::SERVICE_UNAVAILABLE)
    }

    /// Builds the error response for a parse failure, or `None` when the
    /// failure means nobody is listening.
    pub fn for_parse_error(err: &ParseError) -> Option<Self> {
        err.status().map(Self::status_page)
    }

    /// Whether the response asks for the connection to be closed.
    pub fn wants_close(&self) -> bool {
        self.headers.has_token("Connection", "close")
    }
}
