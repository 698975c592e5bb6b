//! Schema discovery queries against the system catalogs.
//!
//! SQL lives in the `queries` submodule as named-parameter constants; the
//! service maps rows onto the output models. Raw column rows are returned
//! as [`RawColumn`] and assembled into the tool-facing shape (primary key,
//! uniqueness and foreign key flags) by the caller, which has the
//! constraint and FK data in hand.

use crate::db::params::{NamedParams, fetch_named, fetch_optional_named};
use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::{ConstraintInfo, IndexInfo, SchemaInfo, TableInfo};
use serde_json::Value as JsonValue;
use sqlx::{PgConnection, Row};

// =============================================================================
// Catalog SQL
// =============================================================================
//
// `name`-typed catalog columns decode as strings directly; aggregated
// name arrays do not, hence the ::text[] casts.

mod queries {
    pub const LIST_SCHEMAS: &str = r#"
SELECT
    n.nspname AS name,
    pg_catalog.pg_get_userbyid(n.nspowner) AS owner,
    pg_catalog.obj_description(n.oid, 'pg_namespace') AS description,
    (SELECT count(*) FROM pg_tables WHERE schemaname = n.nspname) AS table_count
FROM pg_catalog.pg_namespace n
WHERE
    CASE WHEN :include_system THEN TRUE
    ELSE n.nspname !~ '^pg_' AND n.nspname <> 'information_schema'
    END
ORDER BY n.nspname
"#;

    pub const LIST_TABLES: &str = r#"
SELECT
    t.tablename AS name,
    t.schemaname AS schema_name,
    'table' AS type,
    pg_catalog.obj_description(c.oid, 'pg_class') AS description,
    GREATEST(c.reltuples::bigint, 0) AS estimated_row_count,
    pg_total_relation_size(c.oid) AS size_bytes,
    pg_size_pretty(pg_total_relation_size(c.oid)) AS size_pretty,
    EXISTS(SELECT 1 FROM pg_index i WHERE i.indrelid = c.oid AND i.indisprimary) AS has_primary_key,
    (SELECT count(*) FROM information_schema.columns col
     WHERE col.table_schema = t.schemaname AND col.table_name = t.tablename) AS column_count
FROM pg_tables t
JOIN pg_class c ON c.relname = t.tablename
JOIN pg_namespace n ON n.oid = c.relnamespace AND n.nspname = t.schemaname
WHERE t.schemaname = :schema_name
  AND (:name_pattern::text IS NULL OR t.tablename LIKE :name_pattern)
ORDER BY t.tablename
"#;

    pub const LIST_VIEWS: &str = r#"
SELECT
    v.viewname AS name,
    v.schemaname AS schema_name,
    'view' AS type,
    pg_catalog.obj_description(c.oid, 'pg_class') AS description,
    0::bigint AS estimated_row_count,
    NULL::bigint AS size_bytes,
    NULL::text AS size_pretty,
    FALSE AS has_primary_key,
    (SELECT count(*) FROM information_schema.columns col
     WHERE col.table_schema = v.schemaname AND col.table_name = v.viewname) AS column_count
FROM pg_views v
JOIN pg_class c ON c.relname = v.viewname
JOIN pg_namespace n ON n.oid = c.relnamespace AND n.nspname = v.schemaname
WHERE v.schemaname = :schema_name
  AND (:name_pattern::text IS NULL OR v.viewname LIKE :name_pattern)
ORDER BY v.viewname
"#;

    pub const DESCRIBE_COLUMNS: &str = r#"
SELECT
    c.column_name AS name,
    c.data_type,
    c.udt_name,
    c.is_nullable = 'YES' AS is_nullable,
    c.column_default AS default_value,
    pgd.description,
    c.character_maximum_length,
    c.numeric_precision,
    c.numeric_scale
FROM information_schema.columns c
LEFT JOIN pg_catalog.pg_statio_all_tables st
    ON c.table_schema = st.schemaname AND c.table_name = st.relname
LEFT JOIN pg_catalog.pg_description pgd
    ON pgd.objoid = st.relid AND pgd.objsubid = c.ordinal_position
WHERE c.table_schema = :schema_name AND c.table_name = :table_name
ORDER BY c.ordinal_position
"#;

    pub const DESCRIBE_INDEXES: &str = r#"
SELECT
    i.relname AS name,
    array_agg(a.attname ORDER BY array_position(ix.indkey, a.attnum))::text[] AS columns,
    ix.indisunique AS is_unique,
    ix.indisprimary AS is_primary,
    am.amname AS index_type,
    pg_catalog.obj_description(i.oid, 'pg_class') AS description
FROM pg_class t
JOIN pg_index ix ON t.oid = ix.indrelid
JOIN pg_class i ON i.oid = ix.indexrelid
JOIN pg_am am ON i.relam = am.oid
JOIN pg_namespace n ON n.oid = t.relnamespace
JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(ix.indkey)
WHERE n.nspname = :schema_name AND t.relname = :table_name
GROUP BY i.relname, ix.indisunique, ix.indisprimary, am.amname, i.oid
ORDER BY ix.indisprimary DESC, i.relname
"#;

    // CHECK constraints have no key_column_usage rows; array_remove drops
    // the NULL the left join would otherwise aggregate
    pub const DESCRIBE_CONSTRAINTS: &str = r#"
SELECT
    tc.constraint_name AS name,
    tc.constraint_type AS type,
    array_remove(array_agg(DISTINCT kcu.column_name ORDER BY kcu.column_name), NULL)::text[] AS columns,
    cc.check_clause AS definition,
    ccu.table_name AS referenced_table
FROM information_schema.table_constraints tc
LEFT JOIN information_schema.key_column_usage kcu
    ON tc.constraint_name = kcu.constraint_name AND tc.table_schema = kcu.table_schema
LEFT JOIN information_schema.check_constraints cc
    ON tc.constraint_name = cc.constraint_name AND tc.table_schema = cc.constraint_schema
LEFT JOIN information_schema.constraint_column_usage ccu
    ON tc.constraint_name = ccu.constraint_name AND tc.constraint_type = 'FOREIGN KEY'
WHERE tc.table_schema = :schema_name AND tc.table_name = :table_name
GROUP BY tc.constraint_name, tc.constraint_type, cc.check_clause, ccu.table_name
ORDER BY tc.constraint_type, tc.constraint_name
"#;

    pub const TABLE_METADATA: &str = r#"
SELECT
    c.reltuples::bigint AS estimated_row_count,
    pg_total_relation_size(c.oid) AS size_bytes,
    pg_size_pretty(pg_total_relation_size(c.oid)) AS size_pretty,
    pg_catalog.obj_description(c.oid, 'pg_class') AS description,
    CASE c.relkind
        WHEN 'r' THEN 'table'
        WHEN 'v' THEN 'view'
        WHEN 'm' THEN 'materialized view'
        ELSE 'other'
    END AS type
FROM pg_class c
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE n.nspname = :schema_name AND c.relname = :table_name
"#;

    pub const TABLE_EXISTS: &str = r#"
SELECT EXISTS(
    SELECT 1 FROM information_schema.tables
    WHERE table_schema = :schema_name AND table_name = :table_name
) AS exists
"#;

    pub const PRIMARY_KEY_COLUMNS: &str = r#"
SELECT a.attname AS column_name
FROM pg_index i
JOIN pg_attribute a ON a.attrelid = i.indrelid AND a.attnum = ANY(i.indkey)
JOIN pg_class c ON c.oid = i.indrelid
JOIN pg_namespace n ON n.oid = c.relnamespace
WHERE i.indisprimary AND n.nspname = :schema_name AND c.relname = :table_name
ORDER BY array_position(i.indkey, a.attnum)
"#;

    pub const TABLE_NAMES: &str = r#"
SELECT t.tablename AS name FROM pg_tables t WHERE t.schemaname = :schema_name
UNION ALL
SELECT v.viewname FROM pg_views v WHERE v.schemaname = :schema_name
ORDER BY 1
"#;
}

// =============================================================================
// Row Shapes
// =============================================================================

/// A column row as the catalog reports it, before assembly into the tool
/// output (primary key, unique and FK flags come from other queries).
#[derive(Debug, Clone)]
pub struct RawColumn {
    pub name: String,
    pub data_type: String,
    pub udt_name: Option<String>,
    pub is_nullable: bool,
    pub default_value: Option<String>,
    pub description: Option<String>,
    pub character_maximum_length: Option<i32>,
    pub numeric_precision: Option<i32>,
    pub numeric_scale: Option<i32>,
}

/// Table-level metadata (estimate, size, comment, kind).
#[derive(Debug, Clone)]
pub struct TableMetadata {
    pub estimated_row_count: i64,
    pub size_bytes: i64,
    pub size_pretty: String,
    pub description: Option<String>,
    pub table_type: String,
}

/// Result of a sample-row fetch.
#[derive(Debug, Clone)]
pub struct SampleRows {
    pub columns: Vec<String>,
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
}

// =============================================================================
// Service
// =============================================================================

/// Schema discovery operations. All functions run on the caller's
/// transaction so a multi-query tool call stays on one connection.
pub struct SchemaService;

impl SchemaService {
    /// List schemas, excluding `pg_*` and `information_schema` unless asked.
    pub async fn list_schemas(
        conn: &mut PgConnection,
        include_system: bool,
    ) -> DbResult<Vec<SchemaInfo>> {
        let params = NamedParams::new().with("include_system", include_system);
        let rows = fetch_named(conn, queries::LIST_SCHEMAS, &params).await?;
        rows.iter()
            .map(|row| {
                Ok(SchemaInfo {
                    name: row.try_get("name")?,
                    owner: row.try_get("owner")?,
                    description: row.try_get("description")?,
                    table_count: row.try_get("table_count")?,
                })
            })
            .collect()
    }

    /// List tables (and optionally views) in a schema, merged and sorted by
    /// name. An unknown schema yields an empty list, not an error.
    pub async fn list_tables(
        conn: &mut PgConnection,
        schema_name: &str,
        include_views: bool,
        name_pattern: Option<&str>,
    ) -> DbResult<Vec<TableInfo>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("name_pattern", name_pattern);

        let rows = fetch_named(conn, queries::LIST_TABLES, &params).await?;
        let mut tables = rows
            .iter()
            .map(table_info_from_row)
            .collect::<DbResult<Vec<_>>>()?;

        if include_views {
            let rows = fetch_named(conn, queries::LIST_VIEWS, &params).await?;
            let views = rows
                .iter()
                .map(table_info_from_row)
                .collect::<DbResult<Vec<_>>>()?;
            tables.extend(views);
        }

        tables.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(tables)
    }

    pub async fn table_exists(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<bool> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let row = fetch_optional_named(conn, queries::TABLE_EXISTS, &params).await?;
        Ok(match row {
            Some(row) => row.try_get("exists")?,
            None => false,
        })
    }

    pub async fn table_metadata(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Option<TableMetadata>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let row = fetch_optional_named(conn, queries::TABLE_METADATA, &params).await?;
        row.map(|row| {
            Ok(TableMetadata {
                estimated_row_count: row.try_get("estimated_row_count")?,
                size_bytes: row.try_get("size_bytes")?,
                size_pretty: row.try_get("size_pretty")?,
                description: row.try_get("description")?,
                table_type: row.try_get("type")?,
            })
        })
        .transpose()
    }

    pub async fn describe_columns(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<RawColumn>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::DESCRIBE_COLUMNS, &params).await?;
        rows.iter()
            .map(|row| {
                Ok(RawColumn {
                    name: row.try_get("name")?,
                    data_type: row.try_get("data_type")?,
                    udt_name: row.try_get("udt_name")?,
                    is_nullable: row.try_get("is_nullable")?,
                    default_value: row.try_get("default_value")?,
                    description: row.try_get("description")?,
                    character_maximum_length: row.try_get("character_maximum_length")?,
                    numeric_precision: row.try_get("numeric_precision")?,
                    numeric_scale: row.try_get("numeric_scale")?,
                })
            })
            .collect()
    }

    pub async fn describe_indexes(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<IndexInfo>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::DESCRIBE_INDEXES, &params).await?;
        rows.iter()
            .map(|row| {
                Ok(IndexInfo {
                    name: row.try_get("name")?,
                    columns: row.try_get("columns")?,
                    is_unique: row.try_get("is_unique")?,
                    is_primary: row.try_get("is_primary")?,
                    index_type: row.try_get("index_type")?,
                    description: row.try_get("description")?,
                })
            })
            .collect()
    }

    pub async fn describe_constraints(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<ConstraintInfo>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::DESCRIBE_CONSTRAINTS, &params).await?;
        rows.iter()
            .map(|row| {
                Ok(ConstraintInfo {
                    name: row.try_get("name")?,
                    constraint_type: row.try_get("type")?,
                    columns: row.try_get("columns")?,
                    definition: row.try_get("definition")?,
                    referenced_table: row.try_get("referenced_table")?,
                })
            })
            .collect()
    }

    pub async fn primary_key_columns(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
    ) -> DbResult<Vec<String>> {
        let params = NamedParams::new()
            .with("schema_name", schema_name)
            .with("table_name", table_name);
        let rows = fetch_named(conn, queries::PRIMARY_KEY_COLUMNS, &params).await?;
        rows.iter()
            .map(|row| Ok(row.try_get("column_name")?))
            .collect()
    }

    /// Table and view names in a schema, for similar-name suggestions.
    pub async fn table_names(
        conn: &mut PgConnection,
        schema_name: &str,
    ) -> DbResult<Vec<String>> {
        let params = NamedParams::new().with("schema_name", schema_name);
        let rows = fetch_named(conn, queries::TABLE_NAMES, &params).await?;
        rows.iter().map(|row| Ok(row.try_get("name")?)).collect()
    }

    /// Fetch sample rows, ordered by primary key unless randomized.
    pub async fn sample_rows(
        conn: &mut PgConnection,
        schema_name: &str,
        table_name: &str,
        limit: u32,
        columns: Option<&[String]>,
        where_clause: Option<&str>,
        randomize: bool,
    ) -> DbResult<SampleRows> {
        let pk_columns = if randomize {
            Vec::new()
        } else {
            Self::primary_key_columns(conn, schema_name, table_name).await?
        };

        let sql = build_sample_sql(
            schema_name,
            table_name,
            columns,
            where_clause,
            randomize,
            &pk_columns,
            limit,
        );

        let rows = fetch_named(conn, &sql, &NamedParams::new()).await?;
        let result_columns = rows
            .first()
            .map(|row| {
                row.query_columns()
                    .into_iter()
                    .map(|c| c.name)
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        let row_count = rows.len();
        let rows = rows.iter().map(|row| row.to_json_map()).collect();

        Ok(SampleRows {
            columns: result_columns,
            rows,
            row_count,
        })
    }
}

fn table_info_from_row(row: &sqlx::postgres::PgRow) -> DbResult<TableInfo> {
    Ok(TableInfo {
        name: row.try_get("name")?,
        schema_name: row.try_get("schema_name")?,
        table_type: row.try_get("type")?,
        description: row.try_get("description")?,
        estimated_row_count: row.try_get("estimated_row_count")?,
        size_bytes: row.try_get("size_bytes")?,
        size_pretty: row.try_get("size_pretty")?,
        has_primary_key: row.try_get("has_primary_key")?,
        column_count: row.try_get("column_count")?,
    })
}

/// Quote an identifier, doubling embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the sample-row SELECT. The identifiers are quoted; the WHERE
/// clause is caller text appended verbatim, which is why sample fetches
/// run inside the same never-committed transaction as everything else.
fn build_sample_sql(
    schema_name: &str,
    table_name: &str,
    columns: Option<&[String]>,
    where_clause: Option<&str>,
    randomize: bool,
    pk_columns: &[String],
    limit: u32,
) -> String {
    let col_list = match columns {
        Some(cols) if !cols.is_empty() => cols
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", "),
        _ => "*".to_string(),
    };

    let mut sql = format!(
        "SELECT {col_list} FROM {}.{}",
        quote_ident(schema_name),
        quote_ident(table_name)
    );

    if let Some(clause) = where_clause {
        sql.push_str(&format!(" WHERE {clause}"));
    }

    if randomize {
        sql.push_str(" ORDER BY RANDOM()");
    } else if !pk_columns.is_empty() {
        let pk_order = pk_columns
            .iter()
            .map(|c| quote_ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        sql.push_str(&format!(" ORDER BY {pk_order}"));
    }

    sql.push_str(&format!(" LIMIT {limit}"));
    sql
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quote_ident_plain() {
        assert_eq!(quote_ident("users"), "\"users\"");
    }

    #[test]
    fn test_quote_ident_doubles_embedded_quotes() {
        assert_eq!(quote_ident("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn test_build_sample_sql_defaults() {
        let sql = build_sample_sql("public", "users", None, None, false, &[], 5);
        assert_eq!(sql, "SELECT * FROM \"public\".\"users\" LIMIT 5");
    }

    #[test]
    fn test_build_sample_sql_orders_by_primary_key() {
        let pks = vec!["id".to_string()];
        let sql = build_sample_sql("public", "users", None, None, false, &pks, 5);
        assert_eq!(
            sql,
            "SELECT * FROM \"public\".\"users\" ORDER BY \"id\" LIMIT 5"
        );
    }

    #[test]
    fn test_build_sample_sql_randomize_wins_over_pk() {
        let pks = vec!["id".to_string()];
        let sql = build_sample_sql("public", "users", None, None, true, &pks, 3);
        assert_eq!(
            sql,
            "SELECT * FROM \"public\".\"users\" ORDER BY RANDOM() LIMIT 3"
        );
    }

    #[test]
    fn test_build_sample_sql_projection_and_filter() {
        let cols = vec!["id".to_string(), "email".to_string()];
        let sql = build_sample_sql(
            "public",
            "users",
            Some(&cols),
            Some("active = true"),
            false,
            &[],
            10,
        );
        assert_eq!(
            sql,
            "SELECT \"id\", \"email\" FROM \"public\".\"users\" WHERE active = true LIMIT 10"
        );
    }

    #[test]
    fn test_build_sample_sql_empty_projection_selects_all() {
        let cols: Vec<String> = vec![];
        let sql = build_sample_sql("public", "users", Some(&cols), None, false, &[], 5);
        assert!(sql.starts_with("SELECT * FROM"));
    }
}
