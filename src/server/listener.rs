//! Accept loop with an admission gate and supervised workers.
//!
//! Each accepted connection gets its own task holding a permit from a
//! semaphore sized by `max_connections`. When no permit is free the
//! connection is answered with a best-effort 503 and dropped, without
//! spawning anything. Worker tasks live in a `JoinSet` so they can be
//! counted, reaped, and drained on shutdown.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Semaphore, watch};
use tokio::task::{JoinError, JoinSet};
use tracing::{Instrument, info};

use crate::config::Config;
use crate::http::connection::{Connection, ConnectionSettings};
use crate::http::handler::Handler;
use crate::http::response::Response;
use crate::http::writer::serialize_response;

/// Pause after a failed accept, e.g. when out of file descriptors.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(50);

pub struct Server<H> {
    listener: TcpListener,
    connection_limit: Arc<Semaphore>,
    settings: ConnectionSettings,
    handler: Arc<H>,
    shutdown_grace: Duration,
}

impl<H: Handler> Server<H> {
    pub async fn bind(cfg: &Config, handler: H) -> anyhow::Result<Self> {
        let listener = TcpListener::bind(&cfg.listen_addr)
            .await
            .with_context(|| format!("Failed to bind {}", cfg.listen_addr))?;

        info!(
            address = %listener.local_addr()?,
            max_connections = cfg.max_connections,
            "Listening"
        );

        Ok(Self {
            listener,
            connection_limit: Arc::new(Semaphore::new(cfg.max_connections)),
            settings: cfg.connection_settings(),
            handler: Arc::new(handler),
            shutdown_grace: cfg.shutdown_grace(),
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serves connections until `shutdown` completes, then drains.
    ///
    /// On shutdown the listener is closed first, idle connections are told
    /// to close, and busy ones get `shutdown_grace` to finish their current
    /// response before being aborted.
    pub async fn run_until<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: Future<Output = ()>,
    {
        let Server {
            listener,
            connection_limit,
            settings,
            handler,
            shutdown_grace,
        } = self;

        let (stop_tx, stop_rx) = watch::channel(false);
        let mut workers = JoinSet::new();
        let mut next_id: u64 = 0;

        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => break,

                Some(done) = workers.join_next(), if !workers.is_empty() => reap(done),

                accepted = listener.accept() => {
                    let (socket, peer) = match accepted {
                        Ok(conn) => conn,
                        Err(e) => {
                            tracing::warn!(error = %e, "Failed to accept connection");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                            continue;
                        }
                    };

                    let Ok(permit) = connection_limit.clone().try_acquire_owned() else {
                        reject_overloaded(socket, peer);
                        continue;
                    };

                    next_id += 1;
                    let span = tracing::info_span!("conn", id = next_id, %peer);
                    let conn = Connection::new(socket, settings.clone(), handler.clone(), stop_rx.clone());

                    workers.spawn(
                        async move {
                            let _permit = permit;
                            tracing::debug!("Accepted connection");
                            match conn.run().await {
                                Ok(()) => tracing::debug!("Connection closed"),
                                Err(e) if e.is_timeout() => tracing::debug!(error = %e, "Connection timed out"),
                                Err(e) => tracing::warn!(error = %e, "Connection error"),
                            }
                        }
                        .instrument(span),
                    );
                }
            }
        }

        drop(listener);
        stop_tx.send_replace(true);
        info!(active = workers.len(), "Shutting down, draining connections");

        let drained = tokio::time::timeout(shutdown_grace, async {
            while let Some(done) = workers.join_next().await {
                reap(done);
            }
        })
        .await;

        if drained.is_err() {
            tracing::warn!(remaining = workers.len(), "Grace period elapsed, aborting connections");
            workers.shutdown().await;
        }

        info!("Server stopped");
        Ok(())
    }

    /// Serves connections until Ctrl-C.
    pub async fn run(self) -> anyhow::Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
            info!("Shutdown signal received");
        })
        .await
    }
}

fn reap(done: Result<(), JoinError>) {
    if let Err(e) = done {
        if e.is_panic() {
            tracing::error!("Connection worker panicked");
        }
    }
}

/// Answers with 503 without blocking the accept loop. If the socket is not
/// writable right away the client just sees the connection close.
fn reject_overloaded(socket: TcpStream, peer: SocketAddr) {
    // Closing with unread input sends a reset that can discard the 503
    let mut sink = [0u8; 4096];
    while matches!(socket.try_read(&mut sink), Ok(n) if n > 0) {}

    let mut response = Response::service_unavailable();
    response.headers.set("Connection", "close");

    let bytes = serialize_response(&response);
    if let Err(e) = socket.try_write(&bytes) {
        tracing::debug!(%peer, error = %e, "Failed to write 503");
    }

    tracing::warn!(%peer, "Connection limit reached, rejecting");
}
