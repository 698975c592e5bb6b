//! Stdio transport.
//!
//! JSON-RPC frames arrive on stdin and replies leave on stdout, the mode
//! MCP hosts use when they run the server as a child process. Nothing
//! else may write to stdout; logging goes to stderr.

use crate::db::PgEngine;
use crate::error::{DbError, DbResult};
use crate::mcp::PgService;
use crate::transport::{Transport, shutdown_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

pub struct StdioTransport {
    engine: Arc<PgEngine>,
}

impl StdioTransport {
    pub fn new(engine: Arc<PgEngine>) -> Self {
        Self { engine }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Serving MCP over stdio");

        let service = PgService::new(self.engine.clone())
            .serve(stdio())
            .await
            .map_err(|e| DbError::connection(format!("stdio transport failed to start: {e}")))?;

        let mut interrupted = false;
        tokio::select! {
            result = service.waiting() => match result {
                Ok(_reason) => info!("Client disconnected"),
                Err(e) => {
                    warn!(error = %e, "stdio session ended with an error");
                    return Err(DbError::connection(format!("stdio transport: {e}")));
                }
            },
            _ = shutdown_signal() => {
                info!("Shutting down (send the signal again to force exit)");
                interrupted = true;
            }
        }

        if interrupted {
            // A second signal must still get through while the pool drains
            tokio::spawn(async {
                shutdown_signal().await;
                warn!("Second signal received, exiting immediately");
                std::process::exit(1);
            });
        }

        info!("Closing connection pool");
        self.engine.close().await;

        if interrupted {
            // select! cannot cancel a blocked stdin read; returning here
            // would leave the process hanging on read(2)
            std::process::exit(0);
        }

        Ok(())
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_engine() -> Arc<PgEngine> {
        let pool = sqlx::postgres::PgPoolOptions::new()
            .connect_lazy("postgres://localhost/unused")
            .unwrap();
        Arc::new(PgEngine::from_parts(pool, 30_000))
    }

    #[tokio::test]
    async fn test_stdio_transport_name() {
        let transport = StdioTransport::new(test_engine());
        assert_eq!(transport.name(), "stdio");
    }
}
