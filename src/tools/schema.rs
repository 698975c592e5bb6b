//! Schema discovery tools.
//!
//! This module implements the `list_schemas`, `list_tables`,
//! `describe_table` and `get_sample_rows` MCP tools.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::db::engine::PgEngine;
use crate::db::relationships::RelationshipService;
use crate::db::schema::{RawColumn, SchemaService};
use crate::error::{DbError, DbResult, find_similar_names};
use crate::models::{
    ColumnInfo, ConstraintInfo, DescribeTableOutput, ForeignKeyRef, ForeignKeyRelation,
    GetSampleRowsOutput, ListSchemasOutput, ListTablesOutput,
};

pub(crate) fn default_schema() -> String {
    "public".to_string()
}

pub(crate) fn default_true() -> bool {
    true
}

fn default_sample_limit() -> u32 {
    5
}

/// Input for the list_schemas tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListSchemasInput {
    /// Include system schemas (pg_*, information_schema). Default: false
    #[serde(default)]
    pub include_system: bool,
}

/// Input for the list_tables tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Schema to list tables from. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Include views in the listing. Default: true
    #[serde(default = "default_true")]
    pub include_views: bool,
    /// Optional LIKE pattern to filter table names (e.g. 'user%')
    #[serde(default)]
    pub name_pattern: Option<String>,
}

/// Input for the describe_table tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DescribeTableInput {
    /// Table to describe
    pub table_name: String,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Include index information. Default: true
    #[serde(default = "default_true")]
    pub include_indexes: bool,
    /// Include constraint information. Default: true
    #[serde(default = "default_true")]
    pub include_constraints: bool,
}

/// Input for the get_sample_rows tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetSampleRowsInput {
    /// Name of the table to sample
    pub table_name: String,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
    /// Number of sample rows (1-100). Default: 5
    #[serde(default = "default_sample_limit")]
    pub limit: u32,
    /// Specific columns to include (null for all)
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Optional filter expression, without the WHERE keyword
    #[serde(default)]
    pub where_clause: Option<String>,
    /// Randomize row selection (slower on large tables). Default: false
    #[serde(default)]
    pub randomize: bool,
}

/// Handlers for schema discovery tools.
pub struct SchemaTools {
    engine: Arc<PgEngine>,
}

impl SchemaTools {
    pub fn new(engine: Arc<PgEngine>) -> Self {
        Self { engine }
    }

    pub async fn list_schemas(&self, input: ListSchemasInput) -> DbResult<ListSchemasOutput> {
        let mut tx = self.engine.read_tx(None).await?;
        let schemas = SchemaService::list_schemas(tx.conn(), input.include_system).await?;
        tx.rollback().await?;

        let total_count = schemas.len();
        info!(count = total_count, "Listed schemas");

        Ok(ListSchemasOutput {
            schemas,
            total_count,
        })
    }

    /// An unknown schema is not an error here: it simply lists no tables.
    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let mut tx = self.engine.read_tx(None).await?;
        let tables = SchemaService::list_tables(
            tx.conn(),
            &input.schema_name,
            input.include_views,
            input.name_pattern.as_deref(),
        )
        .await?;
        tx.rollback().await?;

        let total_count = tables.len();
        info!(schema = %input.schema_name, count = total_count, "Listed tables");

        Ok(ListTablesOutput {
            tables,
            schema_name: input.schema_name,
            total_count,
        })
    }

    pub async fn describe_table(
        &self,
        input: DescribeTableInput,
    ) -> DbResult<DescribeTableOutput> {
        let DescribeTableInput {
            table_name,
            schema_name,
            include_indexes,
            include_constraints,
        } = input;

        let mut tx = self.engine.read_tx(None).await?;

        if !SchemaService::table_exists(tx.conn(), &schema_name, &table_name).await? {
            let names = SchemaService::table_names(tx.conn(), &schema_name).await?;
            let similar = find_similar_names(&table_name, &names, 3);
            return Err(DbError::table_not_found(&schema_name, &table_name, similar));
        }

        let metadata = SchemaService::table_metadata(tx.conn(), &schema_name, &table_name).await?;
        let raw_columns =
            SchemaService::describe_columns(tx.conn(), &schema_name, &table_name).await?;
        let pk_columns =
            SchemaService::primary_key_columns(tx.conn(), &schema_name, &table_name).await?;
        // Constraints and outgoing FKs always load: column-level uniqueness
        // and foreign_key references are derived from them
        let constraints =
            SchemaService::describe_constraints(tx.conn(), &schema_name, &table_name).await?;
        let outgoing =
            RelationshipService::outgoing_fks(tx.conn(), &schema_name, &table_name).await?;
        let indexes = if include_indexes {
            Some(SchemaService::describe_indexes(tx.conn(), &schema_name, &table_name).await?)
        } else {
            None
        };
        tx.rollback().await?;

        let columns = assemble_columns(raw_columns, &pk_columns, &constraints, &outgoing);
        info!(
            schema = %schema_name,
            table = %table_name,
            columns = columns.len(),
            "Described table"
        );

        Ok(DescribeTableOutput {
            table_name,
            schema_name,
            table_type: metadata
                .as_ref()
                .map(|m| m.table_type.clone())
                .unwrap_or_else(|| "table".to_string()),
            description: metadata.as_ref().and_then(|m| m.description.clone()),
            columns,
            indexes,
            constraints: include_constraints.then_some(constraints),
            estimated_row_count: metadata.as_ref().map(|m| m.estimated_row_count).unwrap_or(0),
            size_pretty: metadata.map(|m| m.size_pretty),
        })
    }

    pub async fn get_sample_rows(
        &self,
        input: GetSampleRowsInput,
    ) -> DbResult<GetSampleRowsOutput> {
        let GetSampleRowsInput {
            table_name,
            schema_name,
            limit,
            columns,
            where_clause,
            randomize,
        } = input;
        let limit = limit.clamp(1, 100);
        let where_clause = where_clause.filter(|w| !w.trim().is_empty());

        let mut tx = self.engine.read_tx(None).await?;

        if !SchemaService::table_exists(tx.conn(), &schema_name, &table_name).await? {
            let names = SchemaService::table_names(tx.conn(), &schema_name).await?;
            let similar = find_similar_names(&table_name, &names, 3);
            return Err(DbError::table_not_found(&schema_name, &table_name, similar));
        }

        let metadata = SchemaService::table_metadata(tx.conn(), &schema_name, &table_name).await?;
        let total_rows = metadata.map(|m| m.estimated_row_count).unwrap_or(0);

        let sample = SchemaService::sample_rows(
            tx.conn(),
            &schema_name,
            &table_name,
            limit,
            columns.as_deref(),
            where_clause.as_deref(),
            randomize,
        )
        .await?;
        tx.rollback().await?;

        info!(
            schema = %schema_name,
            table = %table_name,
            rows = sample.row_count,
            "Sampled rows"
        );

        Ok(GetSampleRowsOutput {
            table_name,
            schema_name,
            columns: sample.columns,
            rows: sample.rows,
            row_count: sample.row_count,
            total_table_rows: total_rows.max(0),
            note: Some(sample_note(randomize, where_clause.as_deref())),
        })
    }
}

/// Pick the note explaining how the sample was selected.
fn sample_note(randomize: bool, where_clause: Option<&str>) -> String {
    if randomize {
        "Rows selected randomly".to_string()
    } else if let Some(clause) = where_clause {
        format!("Filtered by: {clause}")
    } else {
        "Showing first rows ordered by primary key".to_string()
    }
}

/// Merge raw catalog columns with primary key, uniqueness and FK data
/// into the output shape. Uniqueness reflects single-column UNIQUE
/// constraints only; composite uniqueness stays at the constraint level.
fn assemble_columns(
    raw: Vec<RawColumn>,
    pk_columns: &[String],
    constraints: &[ConstraintInfo],
    outgoing: &[ForeignKeyRelation],
) -> Vec<ColumnInfo> {
    let mut fk_map: HashMap<&str, ForeignKeyRef> = HashMap::new();
    for rel in outgoing {
        for (i, from_col) in rel.from_columns.iter().enumerate() {
            if let Some(to_col) = rel.to_columns.get(i) {
                fk_map.entry(from_col.as_str()).or_insert_with(|| ForeignKeyRef {
                    constraint_name: rel.constraint_name.clone(),
                    referenced_schema: rel.to_schema.clone(),
                    referenced_table: rel.to_table.clone(),
                    referenced_column: to_col.clone(),
                    on_update: rel.on_update.clone(),
                    on_delete: rel.on_delete.clone(),
                });
            }
        }
    }

    let unique_columns: HashSet<&str> = constraints
        .iter()
        .filter(|c| c.constraint_type == "UNIQUE" && c.columns.len() == 1)
        .map(|c| c.columns[0].as_str())
        .collect();

    raw.into_iter()
        .map(|col| {
            let is_primary_key = pk_columns.contains(&col.name);
            let is_unique = unique_columns.contains(col.name.as_str());
            let foreign_key = fk_map.get(col.name.as_str()).cloned();
            // udt_name carries the concrete type (int4, _text) where
            // data_type may only say USER-DEFINED or ARRAY
            let data_type = match col.udt_name {
                Some(udt) if !udt.is_empty() => udt,
                _ => col.data_type,
            };
            ColumnInfo {
                name: col.name,
                data_type,
                is_nullable: col.is_nullable,
                default_value: col.default_value,
                description: col.description,
                is_primary_key,
                is_unique,
                foreign_key,
                character_maximum_length: col.character_maximum_length,
                numeric_precision: col.numeric_precision,
                numeric_scale: col.numeric_scale,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_column(name: &str, data_type: &str, udt: Option<&str>) -> RawColumn {
        RawColumn {
            name: name.to_string(),
            data_type: data_type.to_string(),
            udt_name: udt.map(str::to_string),
            is_nullable: true,
            default_value: None,
            description: None,
            character_maximum_length: None,
            numeric_precision: None,
            numeric_scale: None,
        }
    }

    #[test]
    fn test_list_schemas_input_defaults() {
        let input: ListSchemasInput = serde_json::from_str("{}").unwrap();
        assert!(!input.include_system);
    }

    #[test]
    fn test_list_tables_input_defaults() {
        let input: ListTablesInput = serde_json::from_str("{}").unwrap();
        assert_eq!(input.schema_name, "public");
        assert!(input.include_views);
        assert!(input.name_pattern.is_none());
    }

    #[test]
    fn test_describe_table_input_defaults() {
        let json = r#"{"table_name": "users"}"#;
        let input: DescribeTableInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.table_name, "users");
        assert_eq!(input.schema_name, "public");
        assert!(input.include_indexes);
        assert!(input.include_constraints);
    }

    #[test]
    fn test_sample_rows_input_defaults() {
        let json = r#"{"table_name": "orders"}"#;
        let input: GetSampleRowsInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.limit, 5);
        assert!(input.columns.is_none());
        assert!(input.where_clause.is_none());
        assert!(!input.randomize);
    }

    #[test]
    fn test_sample_note_precedence() {
        assert_eq!(sample_note(true, Some("x = 1")), "Rows selected randomly");
        assert_eq!(sample_note(false, Some("x = 1")), "Filtered by: x = 1");
        assert_eq!(
            sample_note(false, None),
            "Showing first rows ordered by primary key"
        );
    }

    #[test]
    fn test_assemble_columns_marks_primary_key() {
        let raw = vec![
            raw_column("id", "integer", Some("int4")),
            raw_column("email", "character varying", Some("varchar")),
        ];
        let pk = vec!["id".to_string()];
        let columns = assemble_columns(raw, &pk, &[], &[]);
        assert!(columns[0].is_primary_key);
        assert!(!columns[1].is_primary_key);
    }

    #[test]
    fn test_assemble_columns_prefers_udt_name() {
        let raw = vec![
            raw_column("tags", "ARRAY", Some("_text")),
            raw_column("status", "USER-DEFINED", Some("order_status")),
            raw_column("plain", "text", None),
            raw_column("blank", "text", Some("")),
        ];
        let columns = assemble_columns(raw, &[], &[], &[]);
        assert_eq!(columns[0].data_type, "_text");
        assert_eq!(columns[1].data_type, "order_status");
        assert_eq!(columns[2].data_type, "text");
        assert_eq!(columns[3].data_type, "text");
    }

    #[test]
    fn test_assemble_columns_single_column_unique() {
        let raw = vec![
            raw_column("email", "text", None),
            raw_column("first_name", "text", None),
            raw_column("last_name", "text", None),
        ];
        let constraints = vec![
            ConstraintInfo {
                name: "users_email_key".to_string(),
                constraint_type: "UNIQUE".to_string(),
                columns: vec!["email".to_string()],
                definition: None,
                referenced_table: None,
            },
            // Composite unique does not mark either column
            ConstraintInfo {
                name: "users_name_key".to_string(),
                constraint_type: "UNIQUE".to_string(),
                columns: vec!["first_name".to_string(), "last_name".to_string()],
                definition: None,
                referenced_table: None,
            },
        ];
        let columns = assemble_columns(raw, &[], &constraints, &[]);
        assert!(columns[0].is_unique);
        assert!(!columns[1].is_unique);
        assert!(!columns[2].is_unique);
    }

    #[test]
    fn test_assemble_columns_foreign_key_reference() {
        let raw = vec![
            raw_column("id", "integer", Some("int4")),
            raw_column("user_id", "integer", Some("int4")),
        ];
        let outgoing = vec![ForeignKeyRelation {
            constraint_name: "orders_user_id_fkey".to_string(),
            from_schema: "public".to_string(),
            from_table: "orders".to_string(),
            from_columns: vec!["user_id".to_string()],
            to_schema: "public".to_string(),
            to_table: "users".to_string(),
            to_columns: vec!["id".to_string()],
            on_update: "NO ACTION".to_string(),
            on_delete: "CASCADE".to_string(),
        }];
        let columns = assemble_columns(raw, &[], &[], &outgoing);
        assert!(columns[0].foreign_key.is_none());
        let fk = columns[1].foreign_key.as_ref().unwrap();
        assert_eq!(fk.constraint_name, "orders_user_id_fkey");
        assert_eq!(fk.referenced_table, "users");
        assert_eq!(fk.referenced_column, "id");
        assert_eq!(fk.on_delete, "CASCADE");
    }

    #[test]
    fn test_assemble_columns_composite_fk_pairs_by_position() {
        let raw = vec![
            raw_column("tenant_id", "integer", Some("int4")),
            raw_column("region_id", "integer", Some("int4")),
        ];
        let outgoing = vec![ForeignKeyRelation {
            constraint_name: "placements_fkey".to_string(),
            from_schema: "public".to_string(),
            from_table: "placements".to_string(),
            from_columns: vec!["tenant_id".to_string(), "region_id".to_string()],
            to_schema: "public".to_string(),
            to_table: "tenants".to_string(),
            to_columns: vec!["id".to_string(), "region".to_string()],
            on_update: "NO ACTION".to_string(),
            on_delete: "NO ACTION".to_string(),
        }];
        let columns = assemble_columns(raw, &[], &[], &outgoing);
        assert_eq!(
            columns[0].foreign_key.as_ref().unwrap().referenced_column,
            "id"
        );
        assert_eq!(
            columns[1].foreign_key.as_ref().unwrap().referenced_column,
            "region"
        );
    }
}
