use std::fmt;

use bytes::Bytes;
use url::Url;

use crate::http::headers::{Headers, is_token};

/// HTTP request methods.
///
/// The common methods get their own variant. Any other syntactically valid
/// token is kept verbatim as an extension method. Methods are case-sensitive,
/// so `get` is an extension method, not `GET`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Method {
    /// GET - Retrieve a resource
    GET,
    /// POST - Create or submit data
    POST,
    /// PUT - Replace a resource
    PUT,
    /// DELETE - Delete a resource
    DELETE,
    /// HEAD - Like GET but without the response body
    HEAD,
    /// OPTIONS - Describe communication options
    OPTIONS,
    /// PATCH - Partial modification of a resource
    PATCH,
    /// Any other token, e.g. `PROPFIND`
    Extension(String),
}

impl Method {
    /// Parses an HTTP method from a string.
    ///
    /// Returns `None` if `s` is not a valid token (empty, or containing
    /// whitespace, control characters or separators).
    ///
    /// # Example
    ///
    /// ```
    /// # use wireline::http::request::Method;
    /// assert_eq!(Method::parse("GET"), Some(Method::GET));
    /// assert_eq!(Method::parse("get"), Some(Method::Extension("get".into())));
    /// assert_eq!(Method::parse("G ET"), None);
    /// ```
    pub fn parse(s: &str) -> Option<Self> {
        let method = match s {
            "GET" => Method::GET,
            "POST" => Method::POST,
            "PUT" => Method::PUT,
            "DELETE" => Method::DELETE,
            "HEAD" => Method::HEAD,
            "OPTIONS" => Method::OPTIONS,
            "PATCH" => Method::PATCH,
            other if is_token(other) => Method::Extension(other.to_string()),
            _ => return None,
        };
        Some(method)
    }

    pub fn as_str(&self) -> &str {
        match self {
            Method::GET => "GET",
            Method::POST => "POST",
            Method::PUT => "PUT",
            Method::DELETE => "DELETE",
            Method::HEAD => "HEAD",
            Method::OPTIONS => "OPTIONS",
            Method::PATCH => "PATCH",
            Method::Extension(s) => s,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Supported protocol versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Version {
    Http10,
    Http11,
}

impl Version {
    /// Parses the exact strings `HTTP/1.0` and `HTTP/1.1`.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "HTTP/1.0" => Some(Version::Http10),
            "HTTP/1.1" => Some(Version::Http11),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Version::Http10 => "HTTP/1.0",
            Version::Http11 => "HTTP/1.1",
        }
    }

    /// Returns the `(major, minor)` pair.
    pub fn major_minor(&self) -> (u8, u8) {
        match self {
            Version::Http10 => (1, 0),
            Version::Http11 => (1, 1),
        }
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents a parsed HTTP request from a client.
///
/// A request is built fresh for every parse attempt and handed to the
/// application handler by reference; it is dropped once the handler returns.
#[derive(Debug, Clone)]
pub struct Request {
    /// The HTTP method (GET, POST, etc.)
    pub method: Method,
    /// The raw request target, e.g. `/search?q=rust`
    pub target: String,
    /// Protocol version from the request line
    pub version: Version,
    /// Request headers in the order received
    pub headers: Headers,
    /// Request body, sized by Content-Length
    pub body: Bytes,
}

/// Builder for constructing Request objects.
pub struct RequestBuilder {
    method: Option<Method>,
    target: Option<String>,
    version: Version,
    headers: Headers,
    body: Bytes,
}

impl RequestBuilder {
    pub fn new() -> Self {
        Self {
            method: None,
            target: None,
            version: Version::Http11,
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn target(mut self, target: impl Into<String>) -> Self {
        self.target = Some(target.into());
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.version = version;
        self
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.append(key, value);
        self
    }

    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn build(self) -> Result<Request, &'static str> {
        Ok(Request {
            method: self.method.ok_or("method missing")?,
            target: self.target.ok_or("target missing")?,
            version: self.version,
            headers: self.headers,
            body: self.body,
        })
    }
}

impl Default for RequestBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl Request {
    pub fn builder() -> RequestBuilder {
        RequestBuilder::new()
    }

    /// Retrieves the first value of a header, matching the name
    /// case-insensitively.
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key)
    }

    /// The path component of an origin-form target, without the query.
    pub fn path(&self) -> &str {
        match self.target.split_once('?') {
            Some((path, _)) => path,
            None => &self.target,
        }
    }

    /// The raw query string, if the target has one.
    pub fn query(&self) -> Option<&str> {
        self.target.split_once('?').map(|(_, q)| q)
    }

    /// Resolves the target to an absolute URL.
    ///
    /// Absolute-form targets are parsed directly. Origin-form targets are
    /// resolved against the `Host` header. Returns `None` for the asterisk
    /// form, a missing `Host`, or anything the URL parser rejects.
    pub fn url(&self) -> Option<Url> {
        if self.target.starts_with('/') {
            let host = self.header("Host")?;
            let base = Url::parse(&format!("http://{}/", host)).ok()?;
            return base.join(&self.target).ok();
        }

        if self.target == "*" {
            return None;
        }

        Url::parse(&self.target).ok()
    }

    /// Determines whether the connection may stay open after the response.
    ///
    /// Only HTTP/1.1 requests are kept alive, and only if no
    /// `Connection: close` token was sent.
    pub fn keep_alive(&self) -> bool {
        self.version == Version::Http11 && !self.headers.has_token("Connection", "close")
    }
}
