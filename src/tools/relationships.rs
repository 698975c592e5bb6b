//! Relationship discovery tools.
//!
//! This module implements the `get_foreign_keys` and `find_join_path`
//! MCP tools.

use std::sync::Arc;

use schemars::JsonSchema;
use serde::Deserialize;
use tracing::info;

use crate::db::engine::PgEngine;
use crate::db::relationships::{FkEdge, RelationshipService, find_paths};
use crate::error::DbResult;
use crate::models::{FindJoinPathOutput, GetForeignKeysOutput, JoinPath, JoinStep};
use crate::tools::schema::default_schema;

fn default_max_depth() -> u32 {
    4
}

/// Input for the get_foreign_keys tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct GetForeignKeysInput {
    /// Name of the table
    pub table_name: String,
    /// Schema containing the table. Default: "public"
    #[serde(default = "default_schema")]
    pub schema_name: String,
}

/// Input for the find_join_path tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct FindJoinPathInput {
    /// Starting table name
    pub from_table: String,
    /// Target table name
    pub to_table: String,
    /// Schema of the starting table. Default: "public"
    #[serde(default = "default_schema")]
    pub from_schema: String,
    /// Schema of the target table. Default: "public"
    #[serde(default = "default_schema")]
    pub to_schema: String,
    /// Maximum joins to traverse (1-6). Default: 4
    #[serde(default = "default_max_depth")]
    pub max_depth: u32,
}

/// Handlers for relationship discovery tools.
pub struct RelationshipTools {
    engine: Arc<PgEngine>,
}

impl RelationshipTools {
    pub fn new(engine: Arc<PgEngine>) -> Self {
        Self { engine }
    }

    /// A table with no foreign keys in either direction reports empty
    /// lists, including tables that do not exist.
    pub async fn get_foreign_keys(
        &self,
        input: GetForeignKeysInput,
    ) -> DbResult<GetForeignKeysOutput> {
        let mut tx = self.engine.read_tx(None).await?;
        let outgoing =
            RelationshipService::outgoing_fks(tx.conn(), &input.schema_name, &input.table_name)
                .await?;
        let incoming =
            RelationshipService::incoming_fks(tx.conn(), &input.schema_name, &input.table_name)
                .await?;
        tx.rollback().await?;

        info!(
            schema = %input.schema_name,
            table = %input.table_name,
            outgoing = outgoing.len(),
            incoming = incoming.len(),
            "Listed foreign keys"
        );

        Ok(GetForeignKeysOutput {
            table_name: input.table_name,
            schema_name: input.schema_name,
            outgoing_count: outgoing.len(),
            incoming_count: incoming.len(),
            outgoing,
            incoming,
        })
    }

    pub async fn find_join_path(&self, input: FindJoinPathInput) -> DbResult<FindJoinPathOutput> {
        let max_depth = input.max_depth.clamp(1, 6) as usize;

        let mut tx = self.engine.read_tx(None).await?;
        let edges =
            RelationshipService::fk_edges(tx.conn(), &input.from_schema, &input.to_schema).await?;
        tx.rollback().await?;

        let start = format!("{}.{}", input.from_schema, input.from_table);
        let end = format!("{}.{}", input.to_schema, input.to_table);
        let raw_paths = find_paths(&edges, &start, &end, max_depth);
        let paths = render_join_paths(&raw_paths, &input.from_schema, &input.from_table);

        info!(
            from = %start,
            to = %end,
            paths = paths.len(),
            "Searched join paths"
        );

        let paths_found = paths.len();
        Ok(FindJoinPathOutput {
            from_table: input.from_table,
            to_table: input.to_table,
            paths,
            paths_found,
            note: path_note(paths_found),
        })
    }
}

fn path_note(paths_found: usize) -> Option<String> {
    match paths_found {
        0 => Some("No path found between tables via foreign keys".to_string()),
        1 => None,
        n => Some(format!("Multiple paths found ({n}), showing all")),
    }
}

/// Turn raw edge paths into join steps plus a SQL fragment an agent can
/// paste into a query. Reversed edges get a LEFT JOIN since the far side
/// may have no matching rows.
fn render_join_paths(paths: &[Vec<FkEdge>], from_schema: &str, from_table: &str) -> Vec<JoinPath> {
    paths
        .iter()
        .map(|path| {
            let steps: Vec<JoinStep> = path.iter().map(join_step).collect();

            let mut sql_parts = vec![format!("FROM {from_schema}.{from_table}")];
            let mut prev_table = from_table.to_string();
            for step in &steps {
                sql_parts.push(format!(
                    "{} {}.{} ON {}.{} = {}.{}",
                    step.join_type,
                    step.to_schema,
                    step.to_table,
                    prev_table,
                    step.from_column,
                    step.to_table,
                    step.to_column
                ));
                prev_table = step.to_table.clone();
            }

            JoinPath {
                depth: steps.len(),
                sql_example: sql_parts.join(" "),
                steps,
            }
        })
        .collect()
}

fn join_step(edge: &FkEdge) -> JoinStep {
    let (from_schema, from_table) = split_node(&edge.from);
    let (to_schema, to_table) = split_node(&edge.to);
    JoinStep {
        from_table,
        from_schema,
        from_column: edge.from_column.clone(),
        to_table,
        to_schema,
        to_column: edge.to_column.clone(),
        join_type: if edge.reversed {
            "LEFT JOIN".to_string()
        } else {
            "INNER JOIN".to_string()
        },
        constraint_name: edge.constraint.clone(),
    }
}

fn split_node(node: &str) -> (String, String) {
    match node.split_once('.') {
        Some((schema, table)) => (schema.to_string(), table.to_string()),
        None => (String::new(), node.to_string()),
    }
}
