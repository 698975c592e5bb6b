//! The MCP-facing service.
//!
//! This module defines the PgService struct with all nine tools exposed
//! via the MCP protocol using the rmcp framework's macros. Failures are
//! returned as a structured error envelope inside the tool result, never
//! as protocol-level errors, so an agent can read the code and suggestion
//! and decide what to call next.

use crate::db::PgEngine;
use crate::models::{
    DescribeTableOutput, ExecuteQueryOutput, ExplainQueryOutput, FindJoinPathOutput,
    GetForeignKeysOutput, GetSampleRowsOutput, ListSchemasOutput, ListTablesOutput, ToolError,
    ToolReply, ValidateQueryOutput,
};
use crate::tools::query::{ExecuteQueryInput, ExplainQueryInput, QueryTools, ValidateQueryInput};
use crate::tools::relationships::{FindJoinPathInput, GetForeignKeysInput, RelationshipTools};
use crate::tools::schema::{
    DescribeTableInput, GetSampleRowsInput, ListSchemasInput, ListTablesInput, SchemaTools,
};
use rmcp::Json;
use rmcp::{
    ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tracing::warn;

#[derive(Clone)]
pub struct PgService {
    /// Shared pool handle for all database operations
    engine: Arc<PgEngine>,
    /// Dispatch table generated by the tool_router macro
    tool_router: ToolRouter<Self>,
}

impl PgService {
    pub fn new(engine: Arc<PgEngine>) -> Self {
        Self {
            engine,
            tool_router: Self::tool_router(),
        }
    }

    fn schema_tools(&self) -> SchemaTools {
        SchemaTools::new(self.engine.clone())
    }

    fn relationship_tools(&self) -> RelationshipTools {
        RelationshipTools::new(self.engine.clone())
    }

    fn query_tools(&self) -> QueryTools {
        QueryTools::new(self.engine.clone())
    }
}

/// Wrap a handler result in the reply envelope, echoing the relevant
/// input fields on failure.
fn reply<T: Serialize>(
    tool_name: &str,
    result: crate::error::DbResult<T>,
    context: serde_json::Value,
) -> Json<ToolReply<T>> {
    match result {
        Ok(value) => Json(ToolReply::Ok(value)),
        Err(err) => {
            warn!(tool = tool_name, error = %err, "Tool call failed");
            Json(ToolReply::Err(ToolError::from_db_error(
                tool_name,
                &err,
                Some(context),
            )))
        }
    }
}

#[tool_router]
impl PgService {
    #[tool(
        description = "List all database schemas.\nReturns names, owners, descriptions, and table counts for non-system schemas.\nUse this as the first step to explore an unknown database."
    )]
    async fn list_schemas(
        &self,
        Parameters(input): Parameters<ListSchemasInput>,
    ) -> Json<ToolReply<ListSchemasOutput>> {
        let context = json!({ "include_system": input.include_system });
        reply(
            "list_schemas",
            self.schema_tools().list_schemas(input).await,
            context,
        )
    }

    #[tool(
        description = "List all tables in a schema.\nReturns tables and optionally views with row counts, sizes, and column counts.\nSupports LIKE filtering via name_pattern (e.g. 'user%')."
    )]
    async fn list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Json<ToolReply<ListTablesOutput>> {
        let context = json!({ "schema_name": input.schema_name });
        reply(
            "list_tables",
            self.schema_tools().list_tables(input).await,
            context,
        )
    }

    #[tool(
        description = "Get detailed structure of a table.\nReturns all columns with types, nullability, defaults, and foreign key references,\nplus indexes and constraints."
    )]
    async fn describe_table(
        &self,
        Parameters(input): Parameters<DescribeTableInput>,
    ) -> Json<ToolReply<DescribeTableOutput>> {
        let context = json!({
            "table_name": input.table_name,
            "schema_name": input.schema_name,
        });
        reply(
            "describe_table",
            self.schema_tools().describe_table(input).await,
            context,
        )
    }

    #[tool(
        description = "Get sample rows from a table.\nRetrieves example rows to understand actual data patterns and formats.\nSupports column projection, a WHERE filter, and randomized selection."
    )]
    async fn get_sample_rows(
        &self,
        Parameters(input): Parameters<GetSampleRowsInput>,
    ) -> Json<ToolReply<GetSampleRowsOutput>> {
        let context = json!({
            "table_name": input.table_name,
            "schema_name": input.schema_name,
        });
        reply(
            "get_sample_rows",
            self.schema_tools().get_sample_rows(input).await,
            context,
        )
    }

    #[tool(
        description = "Get foreign key relationships for a table.\nReturns outgoing (this table references others) and incoming\n(other tables reference this one) foreign keys."
    )]
    async fn get_foreign_keys(
        &self,
        Parameters(input): Parameters<GetForeignKeysInput>,
    ) -> Json<ToolReply<GetForeignKeysOutput>> {
        let context = json!({
            "table_name": input.table_name,
            "schema_name": input.schema_name,
        });
        reply(
            "get_foreign_keys",
            self.relationship_tools().get_foreign_keys(input).await,
            context,
        )
    }

    #[tool(
        description = "Find join paths between two tables.\nDiscovers paths via foreign key relationships, shortest first,\nand returns a SQL example for each path."
    )]
    async fn find_join_path(
        &self,
        Parameters(input): Parameters<FindJoinPathInput>,
    ) -> Json<ToolReply<FindJoinPathOutput>> {
        let context = json!({
            "from_table": input.from_table,
            "to_table": input.to_table,
            "from_schema": input.from_schema,
            "to_schema": input.to_schema,
        });
        reply(
            "find_join_path",
            self.relationship_tools().find_join_path(input).await,
            context,
        )
    }

    #[tool(
        description = "Check whether a SQL query passes the read-only rules without executing it.\nReturns valid=true, or valid=false with the rejection reason."
    )]
    async fn validate_query(
        &self,
        Parameters(input): Parameters<ValidateQueryInput>,
    ) -> Json<ValidateQueryOutput> {
        Json(self.query_tools().validate_query(input))
    }

    #[tool(
        description = "Execute a read-only SQL query.\nOnly SELECT and WITH...SELECT are allowed; use $1, $2, etc. for parameters.\nResults are capped by limit (default 1000, max 10000)."
    )]
    async fn execute_query(
        &self,
        Parameters(input): Parameters<ExecuteQueryInput>,
    ) -> Json<ToolReply<ExecuteQueryOutput>> {
        let context = json!({ "sql": input.sql, "params": input.params });
        reply(
            "execute_query",
            self.query_tools().execute_query(input).await,
            context,
        )
    }

    #[tool(
        description = "Get the execution plan for a query.\nSet analyze=true for real timings (the query runs, inside a transaction\nthat is always rolled back). Formats: text, json, yaml."
    )]
    async fn explain_query(
        &self,
        Parameters(input): Parameters<ExplainQueryInput>,
    ) -> Json<ToolReply<ExplainQueryOutput>> {
        let context = json!({ "sql": input.sql, "params": input.params });
        reply(
            "explain_query",
            self.query_tools().explain_query(input).await,
            context,
        )
    }
}

#[tool_handler]
impl ServerHandler for PgService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "pg-mcp-server".to_owned(),
                title: Some("PostgreSQL MCP Server".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Read-only PostgreSQL tools for schema discovery and querying.\n\
                \n\
                ## Workflow\n\
                1. `list_schemas` then `list_tables` to see what exists\n\
                2. `describe_table` and `get_sample_rows` to understand a table\n\
                3. `get_foreign_keys` and `find_join_path` to connect tables\n\
                4. `execute_query` to fetch data (`validate_query` to pre-check,\n\
                   `explain_query` to inspect the plan)\n\
                \n\
                ## Read-only guarantee\n\
                Every query runs in a transaction that is always rolled back.\n\
                INSERT, UPDATE, DELETE, DDL, and session statements are rejected\n\
                with WRITE_OPERATION_DENIED.\n\
                \n\
                ## Errors\n\
                Failures come back as {error: {code, message, suggestion}}.\n\
                Follow the suggestion: e.g. on TABLE_NOT_FOUND call `list_tables`,\n\
                on QUERY_TIMEOUT simplify the query or raise timeout_ms."
                    .to_string(),
            ),
        }
    }
}
