//! Transports that expose the tool service.
//!
//! The same service can be reached two ways: over stdio for hosts that
//! spawn the server as a child process, and over Streamable HTTP for
//! clients connecting across the network. Both shut down on SIGINT or
//! SIGTERM and treat a repeated signal as a demand to exit now.

pub mod http;
pub mod stdio;

pub use http::HttpTransport;
pub use stdio::StdioTransport;

use crate::error::DbResult;
use std::future::Future;
use tokio::signal;
use tracing::info;

/// A way of serving the MCP protocol.
pub trait Transport: Send + Sync {
    /// Serve until the client disconnects or a shutdown signal arrives.
    fn run(&self) -> impl Future<Output = DbResult<()>> + Send;

    /// Short transport label for startup logging.
    fn name(&self) -> &'static str;
}

/// Resolve once SIGINT or SIGTERM is delivered.
pub(crate) async fn shutdown_signal() {
    let interrupt = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
