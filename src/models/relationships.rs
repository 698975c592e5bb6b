//! Output models for the relationship discovery tools.

use schemars::JsonSchema;
use serde::Serialize;

/// A single foreign key relationship between two tables.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ForeignKeyRelation {
    pub constraint_name: String,
    pub from_schema: String,
    pub from_table: String,
    /// Referencing columns, ordinal order
    pub from_columns: Vec<String>,
    pub to_schema: String,
    pub to_table: String,
    pub to_columns: Vec<String>,
    pub on_update: String,
    pub on_delete: String,
}

/// Output for the get_foreign_keys tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetForeignKeysOutput {
    pub table_name: String,
    pub schema_name: String,
    /// Tables this table references (the FK column lives here)
    pub outgoing: Vec<ForeignKeyRelation>,
    /// Tables referencing this table
    pub incoming: Vec<ForeignKeyRelation>,
    pub outgoing_count: usize,
    pub incoming_count: usize,
}

/// A single hop in a join path.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct JoinStep {
    pub from_table: String,
    pub from_schema: String,
    pub from_column: String,
    pub to_table: String,
    pub to_schema: String,
    pub to_column: String,
    /// Suggested join type based on FK direction
    pub join_type: String,
    pub constraint_name: String,
}

/// A complete join path between two tables.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct JoinPath {
    pub steps: Vec<JoinStep>,
    pub depth: usize,
    /// Ready-to-edit FROM/JOIN clause for this path
    pub sql_example: String,
}

/// Output for the find_join_path tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct FindJoinPathOutput {
    pub from_table: String,
    pub to_table: String,
    /// Shortest paths first
    pub paths: Vec<JoinPath>,
    pub paths_found: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}
