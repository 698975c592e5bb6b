//! Data models for the Postgres MCP server.
//!
//! This module re-exports all tool output types and the error envelope.

pub mod relationships;
pub mod results;
pub mod schema;

pub use relationships::{
    FindJoinPathOutput, ForeignKeyRelation, GetForeignKeysOutput, JoinPath, JoinStep,
};
pub use results::{
    ErrorDetail, ExecuteQueryOutput, ExplainFormat, ExplainQueryOutput, QueryColumn, ToolError,
    ToolReply, ValidateQueryOutput,
};
pub use schema::{
    ColumnInfo, ConstraintInfo, DescribeTableOutput, ForeignKeyRef, GetSampleRowsOutput, IndexInfo,
    ListSchemasOutput, ListTablesOutput, SchemaInfo, TableInfo,
};
