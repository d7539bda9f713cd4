use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::watch;

use crate::http::error::Error;
use crate::http::handler::Handler;
use crate::http::parser::{Limits, parse_request};
use crate::http::reader::{ByteReader, ReadError};
use crate::http::request::{Method, Request};
use crate::http::response::{Response, StatusCode};
use crate::http::writer::ResponseWriter;

/// Per-connection settings, created once from the server config and cloned
/// into every connection.
#[derive(Debug, Clone)]
pub struct ConnectionSettings {
    pub limits: Limits,
    /// Budget for each read operation, including waiting for the next request
    pub read_timeout: Duration,
    /// Budget for writing one whole response
    pub write_timeout: Duration,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            limits: Limits::default(),
            read_timeout: Duration::from_secs(30),
            write_timeout: Duration::from_secs(30),
        }
    }
}

enum ConnectionState {
    AwaitingRequest,
    Parsing,
    Dispatching(Request),
    Writing {
        writer: ResponseWriter,
        keep_alive: bool,
        exchange: Exchange,
    },
    Closed,
}

/// What gets logged once a response has been written.
struct Exchange {
    method: String,
    target: String,
    status: StatusCode,
    outcome: &'static str,
}

impl Exchange {
    fn log(&self, result: &Result<(), Error>) {
        match result {
            Ok(()) => tracing::info!(
                method = %self.method,
                target = %self.target,
                status = self.status.as_u16(),
                outcome = self.outcome,
                "Request served"
            ),
            Err(e) => tracing::warn!(
                method = %self.method,
                target = %self.target,
                status = self.status.as_u16(),
                outcome = self.outcome,
                write_error = %e,
                "Failed to write response"
            ),
        }
    }
}

/// Drives one client connection through its request/response cycles.
///
/// The connection owns its stream and byte reader; nothing is shared with
/// other connections except the handler and the shutdown signal. Once the
/// shutdown signal is raised the connection finishes the cycle in progress,
/// if any, and closes instead of waiting for another request.
pub struct Connection<S, H> {
    reader: ByteReader<S>,
    settings: ConnectionSettings,
    handler: Arc<H>,
    shutdown: watch::Receiver<bool>,
    state: ConnectionState,
}

impl<S, H> Connection<S, H>
where
    S: AsyncRead + AsyncWrite + Unpin,
    H: Handler,
{
    pub fn new(
        stream: S,
        settings: ConnectionSettings,
        handler: Arc<H>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        let reader = ByteReader::new(stream).with_timeout(settings.read_timeout);
        Self {
            reader,
            settings,
            handler,
            shutdown,
            state: ConnectionState::AwaitingRequest,
        }
    }

    /// Runs the connection until it closes.
    ///
    /// Returns `Ok` for an orderly close (peer hung up, `Connection: close`,
    /// protocol error answered, shutdown). Timeouts and transport errors are
    /// returned as errors; no response is attempted for them.
    pub async fn run(mut self) -> Result<(), Error> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::AwaitingRequest => {
                    self.state = self.await_request().await?;
                }

                ConnectionState::Parsing => {
                    self.state = self.parse().await?;
                }

                ConnectionState::Dispatching(request) => {
                    self.state = self.dispatch(request);
                }

                ConnectionState::Writing {
                    mut writer,
                    keep_alive,
                    exchange,
                } => {
                    let result = writer
                        .write_to_stream(self.reader.get_mut(), self.settings.write_timeout)
                        .await;
                    exchange.log(&result);
                    result?;

                    if keep_alive {
                        self.state = ConnectionState::AwaitingRequest; // go back for next request
                    }
                }

                ConnectionState::Closed => {
                    self.close().await;
                    return Ok(());
                }
            }
        }
    }

    async fn await_request(&mut self) -> Result<ConnectionState, Error> {
        if *self.shutdown.borrow() {
            return Ok(ConnectionState::Closed);
        }

        let filled = tokio::select! {
            _ = shutdown_signalled(&mut self.shutdown) => {
                tracing::debug!("Shutdown signalled while idle");
                return Ok(ConnectionState::Closed);
            }
            filled = self.reader.fill_buf() => filled,
        };

        match filled {
            Ok(0) => {
                tracing::debug!("Client closed connection");
                Ok(ConnectionState::Closed)
            }
            Ok(_) => Ok(ConnectionState::Parsing),
            Err(ReadError::Timeout(after)) => Err(Error::Timeout { op: "read", after }),
            Err(ReadError::Io(source)) => Err(Error::Io { op: "read", source }),
            Err(e) => Err(Error::Io {
                op: "read",
                source: io::Error::other(e),
            }),
        }
    }

    async fn parse(&mut self) -> Result<ConnectionState, Error> {
        let err = match parse_request(&mut self.reader, &self.settings.limits).await {
            Ok(request) => return Ok(ConnectionState::Dispatching(request)),
            Err(Error::Parse(err)) => err,
            Err(e) => return Err(e),
        };

        let Some(mut response) = Response::for_parse_error(&err) else {
            tracing::warn!(outcome = err.kind.as_str(), "Connection closed mid-request");
            return Ok(ConnectionState::Closed);
        };

        tracing::debug!(line = %err.line, "Rejecting malformed request");

        // Never keep alive after a protocol error
        response.headers.set("Connection", "close");

        Ok(ConnectionState::Writing {
            writer: ResponseWriter::new(&response),
            keep_alive: false,
            exchange: Exchange {
                method: "-".to_string(),
                target: "-".to_string(),
                status: response.status,
                outcome: err.kind.as_str(),
            },
        })
    }

    fn dispatch(&self, request: Request) -> ConnectionState {
        let handled = panic::catch_unwind(AssertUnwindSafe(|| self.handler.handle(&request)));

        let (mut response, outcome) = match handled {
            Ok(Ok(response)) => (response, "ok"),
            Ok(Err(e)) => {
                tracing::error!(
                    method = %request.method,
                    target = %request.target,
                    error = %e,
                    "Handler failed"
                );
                (Response::internal_error(), "handler_error")
            }
            Err(_) => {
                tracing::error!(
                    method = %request.method,
                    target = %request.target,
                    "Handler panicked"
                );
                (Response::internal_error(), "handler_panic")
            }
        };

        let keep_alive =
            request.keep_alive() && !response.wants_close() && !*self.shutdown.borrow();
        if !keep_alive {
            response.headers.set("Connection", "close");
        }

        let writer = if request.method == Method::HEAD {
            ResponseWriter::head(&response)
        } else {
            ResponseWriter::new(&response)
        };

        ConnectionState::Writing {
            writer,
            keep_alive,
            exchange: Exchange {
                method: request.method.to_string(),
                target: request.target,
                status: response.status,
                outcome,
            },
        }
    }

    async fn close(&mut self) {
        let timeout = self.settings.write_timeout;
        if let Ok(Err(e)) = tokio::time::timeout(timeout, self.reader.get_mut().shutdown()).await {
            tracing::debug!(error = %e, "Failed to shut down write side");
        }
    }
}

async fn shutdown_signalled(rx: &mut watch::Receiver<bool>) {
    let closed = rx.wait_for(|stop| *stop).await.is_err();
    if closed {
        // Sender gone, nobody can signal shutdown any more
        std::future::pending::<()>().await;
    }
}
