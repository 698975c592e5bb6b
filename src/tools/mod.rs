//! Tool handlers behind the MCP surface.
//!
//! This module contains all tool handlers, grouped by layer:
//! - `schema`: list_schemas, list_tables, describe_table, get_sample_rows
//! - `relationships`: get_foreign_keys, find_join_path
//! - `query`: validate_query, execute_query, explain_query

pub mod query;
pub mod relationships;
pub mod schema;

pub use query::{ExecuteQueryInput, ExplainQueryInput, QueryTools, ValidateQueryInput};
pub use relationships::{FindJoinPathInput, GetForeignKeysInput, RelationshipTools};
pub use schema::{
    DescribeTableInput, GetSampleRowsInput, ListSchemasInput, ListTablesInput, SchemaTools,
};
