//! Output models for the schema discovery tools.

use schemars::JsonSchema;
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Information about a database schema.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct SchemaInfo {
    pub name: String,
    pub owner: String,
    /// Schema comment, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub table_count: i64,
}

/// Output for the list_schemas tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListSchemasOutput {
    pub schemas: Vec<SchemaInfo>,
    pub total_count: usize,
}

/// Information about a table or view.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    pub schema_name: String,
    /// "table" or "view"
    #[serde(rename = "type")]
    pub table_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Planner estimate from pg_class.reltuples, not an exact count
    pub estimated_row_count: i64,
    /// Null for views
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_pretty: Option<String>,
    pub has_primary_key: bool,
    pub column_count: i64,
}

/// Output for the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    pub tables: Vec<TableInfo>,
    pub schema_name: String,
    pub total_count: usize,
}

/// Foreign key reference attached to a column.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ForeignKeyRef {
    pub constraint_name: String,
    pub referenced_schema: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub on_update: String,
    pub on_delete: String,
}

/// Detailed information about a table column.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: String,
    pub is_nullable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub is_primary_key: bool,
    pub is_unique: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub foreign_key: Option<ForeignKeyRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub character_maximum_length: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_precision: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub numeric_scale: Option<i32>,
}

/// Information about a table index.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    pub is_primary: bool,
    /// Access method (btree, hash, gin, ...)
    pub index_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Information about a table constraint.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ConstraintInfo {
    pub name: String,
    /// PRIMARY KEY, FOREIGN KEY, UNIQUE or CHECK
    #[serde(rename = "type")]
    pub constraint_type: String,
    pub columns: Vec<String>,
    /// Full definition, populated for CHECK constraints
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub referenced_table: Option<String>,
}

/// Output for the describe_table tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeTableOutput {
    pub table_name: String,
    pub schema_name: String,
    /// "table" or "view"
    #[serde(rename = "type")]
    pub table_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub columns: Vec<ColumnInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub indexes: Option<Vec<IndexInfo>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub constraints: Option<Vec<ConstraintInfo>>,
    pub estimated_row_count: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_pretty: Option<String>,
}

/// Output for the get_sample_rows tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GetSampleRowsOutput {
    pub table_name: String,
    pub schema_name: String,
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// Planner estimate for the full table
    pub total_table_rows: i64,
    /// Context about how the sample was taken, e.g. "randomized"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_info_renames_type_field() {
        let info = TableInfo {
            name: "users".into(),
            schema_name: "public".into(),
            table_type: "table".into(),
            description: None,
            estimated_row_count: 120,
            size_bytes: Some(8192),
            size_pretty: Some("8192 bytes".into()),
            has_primary_key: true,
            column_count: 4,
        };
        let value = serde_json::to_value(&info).unwrap();
        assert_eq!(value["type"], "table");
        assert!(value.get("table_type").is_none());
        assert!(value.get("description").is_none());
    }

    #[test]
    fn test_describe_output_omits_skipped_sections() {
        let out = DescribeTableOutput {
            table_name: "users".into(),
            schema_name: "public".into(),
            table_type: "table".into(),
            description: None,
            columns: vec![],
            indexes: None,
            constraints: None,
            estimated_row_count: 0,
            size_pretty: None,
        };
        let value = serde_json::to_value(&out).unwrap();
        assert!(value.get("indexes").is_none());
        assert!(value.get("constraints").is_none());
        assert_eq!(value["estimated_row_count"], 0);
    }
}
