//! Database access layer.
//!
//! This module owns everything that talks to PostgreSQL:
//! - Connection pool and rollback-only transactions
//! - Named-parameter SQL compilation and binding
//! - Catalog introspection (schemas, tables, columns, constraints)
//! - Foreign key graph and join path search
//! - Validated read-only query execution
//! - Result type mappings to JSON

pub mod engine;
pub mod params;
pub mod query;
pub mod relationships;
pub mod schema;
pub mod types;

pub use engine::{PgEngine, ReadTransaction};
pub use params::{NamedParams, QueryParam, compile_named, fetch_named, fetch_optional_named};
pub use query::{
    BLOCKED_KEYWORDS, DEFAULT_ROW_LIMIT, MAX_ROW_LIMIT, QueryService, convert_params, query_hash,
    validate_read_only,
};
pub use relationships::{FkEdge, RelationshipService, find_paths};
pub use schema::{RawColumn, SampleRows, SchemaService, TableMetadata, quote_ident};
pub use types::{RowToJson, TypeCategory, categorize_type};
