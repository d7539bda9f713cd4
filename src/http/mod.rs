//! HTTP/1.1 protocol layer.
//!
//! This module implements request parsing, response serialization and the
//! per-connection state machine. It works over any `AsyncRead + AsyncWrite`
//! stream, so the same code runs against TCP sockets and in-memory pipes.
//!
//! # Architecture
//!
//! - **`reader`**: Buffered line and fixed-length reads over a stream
//! - **`headers`**: Ordered, case-insensitive header list
//! - **`request`**: Request, method and version types
//! - **`response`**: Response and status code types with a builder
//! - **`parser`**: Parses requests (and responses) with protocol limits
//! - **`writer`**: Serializes and writes responses
//! - **`handler`**: The application callback contract
//! - **`error`**: Connection-level error taxonomy
//! - **`connection`**: The request-response state machine
//!
//! # Connection State Machine
//!
//! ```text
//!        ┌──────────────────┐
//!        │ AwaitingRequest  │ ← Wait for bytes (or shutdown)
//!        └──────┬───────────┘
//!               │ Data arrived
//!               ▼
//!        ┌──────────────────┐
//!        │     Parsing      │ ─── parse error ──┐
//!        └──────┬───────────┘                   │
//!               │ Request parsed                │
//!               ▼                               │
//!        ┌──────────────────┐                   │
//!        │   Dispatching    │ ← Call handler    │
//!        └──────┬───────────┘                   │
//!               │ Response ready                │
//!               ▼                               ▼
//!        ┌──────────────────────────────────────────┐
//!        │              WritingResponse             │
//!        └──────┬───────────────────────────────────┘
//!               │ Response sent
//!               ├─ Keep-Alive → AwaitingRequest (same connection)
//!               └─ Close → Closed
//! ```
//!
//! Timeouts and transport errors skip straight to `Closed` without writing.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use tokio::net::TcpListener;
//! use tokio::sync::watch;
//! use wireline::http::connection::{Connection, ConnectionSettings};
//! use wireline::http::request::Request;
//! use wireline::http::response::Response;
//!
//! fn hello(_req: &Request) -> anyhow::Result<Response> {
//!     Ok(Response::ok("hello"))
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let listener = TcpListener::bind("127.0.0.1:8080").await?;
//!     let handler = Arc::new(hello);
//!     let (_stop, shutdown) = watch::channel(false);
//!
//!     loop {
//!         let (socket, _addr) = listener.accept().await?;
//!         let conn = Connection::new(socket, ConnectionSettings::default(), handler.clone(), shutdown.clone());
//!         tokio::spawn(async move {
//!             if let Err(e) = conn.run().await {
//!                 eprintln!("Connection error: {}", e);
//!             }
//!         });
//!     }
//! }
//! ```

pub mod connection;
pub mod error;
pub mod handler;
pub mod headers;
pub mod parser;
pub mod reader;
pub mod request;
pub mod response;
pub mod writer;

pub use error::Error;
