//! Streamable HTTP transport.
//!
//! Serves the MCP protocol over HTTP with SSE streaming for clients that
//! reach the server across the network rather than as a child process.
//! Every session gets its own service instance over the shared pool.

use crate::db::PgEngine;
use crate::error::{DbError, DbResult};
use crate::mcp::PgService;
use crate::transport::{Transport, shutdown_signal};
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::Notify;
use tracing::{error, info, warn};

/// How long open SSE streams may hold up shutdown after the first signal.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    engine: Arc<PgEngine>,
    bind_addr: String,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        engine: Arc<PgEngine>,
        bind_addr: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            engine,
            bind_addr: bind_addr.into(),
            endpoint: endpoint.into(),
        }
    }

    /// The MCP endpoint path.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn router(&self) -> axum::Router {
        let engine = self.engine.clone();
        let service = StreamableHttpService::new(
            move || Ok(PgService::new(engine.clone())),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        // nest_service rejects the bare root path
        if self.endpoint == "/" {
            axum::Router::new().fallback_service(service)
        } else {
            axum::Router::new().nest_service(&self.endpoint, service)
        }
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let listener = TcpListener::bind(&self.bind_addr)
            .await
            .map_err(|e| DbError::connection(format!("could not bind {}: {e}", self.bind_addr)))?;
        info!(addr = %self.bind_addr, endpoint = %self.endpoint, "Serving MCP over HTTP");

        // The graceful-shutdown future consumes the first signal; the drain
        // watcher needs its own wakeup to start the countdown
        let drained = Arc::new(Notify::new());
        let trigger = drained.clone();
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            shutdown_signal().await;
            trigger.notify_one();
        });

        tokio::select! {
            result = server => match result {
                Ok(()) => info!("HTTP server stopped"),
                Err(e) => {
                    error!(error = %e, "HTTP server failed");
                    return Err(DbError::connection(format!("HTTP server: {e}")));
                }
            },
            _ = drain_deadline(drained) => {}
        }

        info!("Closing connection pool");
        self.engine.close().await;

        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

/// After the first signal, give open connections [`DRAIN_TIMEOUT`] to
/// finish. A second signal or the expired deadline abandons them.
async fn drain_deadline(drained: Arc<Notify>) {
    drained.notified().await;
    info!(
        timeout_secs = DRAIN_TIMEOUT.as_secs(),
        "Draining connections (send the signal again to force exit)"
    );

    tokio::select! {
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => {
            warn!("Drain deadline expired, abandoning open connections");
        }
        _ = shutdown_signal() => {
            warn!("Second signal received, abandoning open connections");
        }
    }
}
