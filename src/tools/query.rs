//! Query execution tools.
//!
//! This module implements the `validate_query`, `execute_query` and
//! `explain_query` MCP tools. Write operations (INSERT, UPDATE, DELETE,
//! DDL) are blocked with clear error messages before reaching the server.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::db::engine::PgEngine;
use crate::db::params::QueryParam;
use crate::db::query::{DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryService, validate_read_only};
use crate::error::DbResult;
use crate::models::{
    ExecuteQueryOutput, ExplainFormat, ExplainQueryOutput, ValidateQueryOutput,
};

fn default_row_limit() -> u32 {
    DEFAULT_ROW_LIMIT
}

/// Input for the validate_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ValidateQueryInput {
    /// SQL query to check against the read-only rules
    pub sql: String,
}

/// Input for the execute_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteQueryInput {
    /// SQL SELECT query. Use $1, $2, etc. for parameters.
    pub sql: String,
    /// Parameter values matching $1, $2, etc.
    #[serde(default)]
    pub params: Option<Vec<QueryParam>>,
    /// Maximum rows to return (1-10000). Default: 1000
    #[serde(default = "default_row_limit")]
    pub limit: u32,
    /// Query timeout in milliseconds. Default: server statement timeout
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Input for the explain_query tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExplainQueryInput {
    /// SQL query to explain
    pub sql: String,
    /// Parameter values for accurate estimates
    #[serde(default)]
    pub params: Option<Vec<QueryParam>>,
    /// Actually execute the query for real timings. Default: false
    #[serde(default)]
    pub analyze: bool,
    /// Output format (text, json, yaml). Default: text
    #[serde(default)]
    pub format: ExplainFormat,
    /// Include additional plan detail. Default: false
    #[serde(default)]
    pub verbose: bool,
    /// Include buffer statistics (requires analyze). Default: false
    #[serde(default)]
    pub buffers: bool,
}

/// Handlers for query execution tools.
pub struct QueryTools {
    engine: Arc<PgEngine>,
}

impl QueryTools {
    pub fn new(engine: Arc<PgEngine>) -> Self {
        Self { engine }
    }

    /// Check a query against the read-only rules without executing it.
    /// Rejection is a successful response here, not an error envelope.
    pub fn validate_query(&self, input: ValidateQueryInput) -> ValidateQueryOutput {
        match validate_read_only(&input.sql) {
            Ok(()) => ValidateQueryOutput::ok(),
            Err(err) => ValidateQueryOutput::rejected(&err),
        }
    }

    pub async fn execute_query(&self, input: ExecuteQueryInput) -> DbResult<ExecuteQueryOutput> {
        let limit = input.limit.clamp(1, MAX_ROW_LIMIT);
        let params = input.params.unwrap_or_default();

        let result = QueryService::execute(
            &self.engine,
            &input.sql,
            &params,
            limit,
            input.timeout_ms,
        )
        .await?;

        info!(
            rows = result.row_count,
            has_more = result.has_more,
            execution_time_ms = result.execution_time_ms,
            query_hash = %result.query_hash,
            "Executed query"
        );
        Ok(result)
    }

    pub async fn explain_query(&self, input: ExplainQueryInput) -> DbResult<ExplainQueryOutput> {
        let params = input.params.unwrap_or_default();

        let result = QueryService::explain(
            &self.engine,
            &input.sql,
            &params,
            input.analyze,
            input.format,
            input.verbose,
            input.buffers,
        )
        .await?;

        info!(format = ?input.format, analyze = input.analyze, "Explained query");
        Ok(result)
    }
}
