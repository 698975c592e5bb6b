//! Connection pool management for the target PostgreSQL database.
//!
//! The server talks to exactly one database. `PgEngine` wraps the pool and
//! hands out short-lived read transactions; every tool call runs inside one
//! so that `SET LOCAL statement_timeout` is scoped to the call and never
//! leaks onto a pooled connection.

use crate::config::Config;
use crate::error::{DbError, DbResult};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgConnection, PgPool, Postgres, Transaction};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Shared handle to the database pool.
#[derive(Debug, Clone)]
pub struct PgEngine {
    pool: PgPool,
    statement_timeout_ms: u64,
}

impl PgEngine {
    /// Connect and build the pool. Fails fast if the database is unreachable.
    pub async fn connect(config: &Config) -> DbResult<Self> {
        info!(
            url = %config.redacted_url(),
            pool_size = config.pool_size,
            "Connecting to PostgreSQL"
        );

        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size)
            .acquire_timeout(Duration::from_secs(config.pool_timeout))
            .test_before_acquire(true)
            .connect(&config.database_url)
            .await
            .map_err(|e| DbError::connection(format!("Failed to connect: {e}")))?;

        Ok(Self {
            pool,
            statement_timeout_ms: config.statement_timeout,
        })
    }

    /// Wrap an existing pool. Used by tests with a lazy pool.
    pub fn from_parts(pool: PgPool, statement_timeout_ms: u64) -> Self {
        Self {
            pool,
            statement_timeout_ms,
        }
    }

    /// Default statement timeout applied when a call does not override it.
    pub fn statement_timeout_ms(&self) -> u64 {
        self.statement_timeout_ms
    }

    /// Verify connectivity with a trivial query.
    pub async fn ping(&self) -> DbResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Report the server version, best effort.
    pub async fn server_version(&self) -> Option<String> {
        match sqlx::query_scalar::<_, String>("SELECT version()")
            .fetch_one(&self.pool)
            .await
        {
            Ok(version) => {
                debug!(version = %version, "Got server version");
                Some(version)
            }
            Err(e) => {
                warn!(error = %e, "Failed to get server version");
                None
            }
        }
    }

    /// Begin a read transaction with the statement timeout applied.
    ///
    /// `timeout_ms` overrides the configured default for this call only.
    pub async fn read_tx(&self, timeout_ms: Option<u64>) -> DbResult<ReadTransaction> {
        let mut tx = self.pool.begin().await?;
        let timeout = timeout_ms.unwrap_or(self.statement_timeout_ms);
        // SET LOCAL does not accept bind parameters; timeout is numeric
        sqlx::query(&format!("SET LOCAL statement_timeout = {timeout}"))
            .execute(&mut *tx)
            .await?;
        Ok(ReadTransaction { tx })
    }

    /// Close the pool and all its connections.
    pub async fn close(&self) {
        self.pool.close().await;
        info!("Connection pool closed");
    }
}

/// A transaction scoped to a single tool call.
///
/// Nothing here ever commits. Dropping the value rolls back, as does
/// [`ReadTransaction::rollback`]; the explicit call surfaces rollback errors
/// instead of swallowing them.
pub struct ReadTransaction {
    tx: Transaction<'static, Postgres>,
}

impl ReadTransaction {
    pub fn conn(&mut self) -> &mut PgConnection {
        &mut self.tx
    }

    pub async fn rollback(self) -> DbResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
