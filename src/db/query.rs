//! Read-only query execution.
//!
//! Every statement goes through the same gate: a textual keyword scan plus
//! a leading-token check. The scan is deliberately conservative. It looks at
//! the whole text, including string literals and subqueries, so a blocked
//! keyword anywhere rejects the query. The transaction a query runs in is
//! always rolled back, so even a statement that slipped through could not
//! leave a mark.

use std::sync::LazyLock;
use std::time::Instant;

use regex::Regex;
use serde_json::Value as JsonValue;
use sha2::{Digest, Sha256};
use sqlx::Row;

use crate::db::engine::PgEngine;
use crate::db::params::{NamedParams, QueryParam, fetch_named};
use crate::db::types::RowToJson;
use crate::error::{DbError, DbResult, ErrorCode};
use crate::models::{ExecuteQueryOutput, ExplainFormat, ExplainQueryOutput};

/// Rows returned when the caller does not ask for a limit.
pub const DEFAULT_ROW_LIMIT: u32 = 1000;
/// Hard cap on rows per query.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// Keywords that reject a query outright, wherever they appear.
pub const BLOCKED_KEYWORDS: [&str; 24] = [
    // Data modification
    "INSERT", "UPDATE", "DELETE", "UPSERT", "MERGE",
    // Schema modification
    "CREATE", "ALTER", "DROP", "TRUNCATE", "RENAME",
    // Permissions
    "GRANT", "REVOKE",
    // Session state
    "SET", "RESET", "DISCARD",
    // Administrative
    "VACUUM", "ANALYZE", "CLUSTER", "REINDEX", "COPY",
    // Transaction control
    "BEGIN", "COMMIT", "ROLLBACK", "SAVEPOINT",
];

static BLOCKED_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let pattern = format!(r"(?i)\b({})\b", BLOCKED_KEYWORDS.join("|"));
    Regex::new(&pattern).expect("blocked keyword pattern is valid")
});

/// Reject anything that is not a plain SELECT or WITH query.
///
/// The keyword scan runs first and wins, so `SELECT 1; DROP TABLE x` and
/// writes hidden in subqueries both come back as WRITE_OPERATION_DENIED
/// rather than INVALID_SQL.
pub fn validate_read_only(sql: &str) -> DbResult<()> {
    if let Some(caps) = BLOCKED_PATTERN.captures(sql) {
        let keyword = caps[1].to_uppercase();
        return Err(DbError::validation(
            ErrorCode::WriteOperationDenied,
            format!("Query contains blocked keyword: {keyword}"),
            "This server only supports read operations (SELECT queries).",
        ));
    }

    let normalized = sql.trim().to_uppercase();
    if !(normalized.starts_with("SELECT") || normalized.starts_with("WITH")) {
        return Err(DbError::validation(
            ErrorCode::InvalidSql,
            "Query must start with SELECT or WITH",
            "Only SELECT and WITH...SELECT queries are allowed.",
        ));
    }

    Ok(())
}

/// Rewrite `$1, $2, ...` placeholders as named parameters and pair them
/// with their values. Replacement runs highest-numbered first so `$12` is
/// not clobbered by the `$1` pass.
pub fn convert_params(sql: &str, params: &[QueryParam]) -> (String, NamedParams) {
    let mut named = NamedParams::new();
    for (i, value) in params.iter().enumerate() {
        named.push(format!("param_{}", i + 1), value.clone());
    }

    let mut sql = sql.to_string();
    for i in (1..=params.len()).rev() {
        sql = sql.replace(&format!("${i}"), &format!(":param_{i}"));
    }
    (sql, named)
}

/// Short fingerprint of the statement as sent to the server, for log
/// correlation across calls.
pub fn query_hash(sql: &str) -> String {
    let digest = Sha256::digest(sql.as_bytes());
    hex::encode(digest)[..8].to_string()
}

fn round_ms(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Validated query execution against a rollback-only transaction.
pub struct QueryService;

impl QueryService {
    /// Execute a read-only query and return rows as JSON objects.
    ///
    /// A `LIMIT {limit}` clause is appended unless the text already
    /// mentions LIMIT anywhere. `has_more` is a heuristic: exactly
    /// `limit` rows back means the result was probably truncated.
    pub async fn execute(
        engine: &PgEngine,
        sql: &str,
        params: &[QueryParam],
        limit: u32,
        timeout_ms: Option<u64>,
    ) -> DbResult<ExecuteQueryOutput> {
        validate_read_only(sql)?;

        let mut sql = sql.to_string();
        if !sql.to_uppercase().contains("LIMIT") {
            sql = format!("{sql} LIMIT {limit}");
        }

        let (sql, named) = convert_params(&sql, params);

        let mut tx = engine.read_tx(timeout_ms).await?;
        let start = Instant::now();
        let rows = fetch_named(tx.conn(), &sql, &named).await?;
        let execution_time_ms = round_ms(start.elapsed().as_secs_f64() * 1000.0);
        tx.rollback().await?;

        let columns = rows
            .first()
            .map(|row| row.query_columns())
            .unwrap_or_default();
        let result_rows: Vec<_> = rows.iter().map(|row| row.to_json_map()).collect();
        let row_count = result_rows.len();
        let has_more = row_count == limit as usize;

        Ok(ExecuteQueryOutput {
            columns,
            rows: result_rows,
            row_count,
            has_more,
            execution_time_ms,
            query_hash: query_hash(&sql),
        })
    }

    /// Run EXPLAIN on a validated query and return the plan.
    ///
    /// BUFFERS only applies together with ANALYZE; ANALYZE really executes
    /// the query, which is safe here because the transaction never commits.
    /// Runs under the server-wide statement timeout.
    pub async fn explain(
        engine: &PgEngine,
        sql: &str,
        params: &[QueryParam],
        analyze: bool,
        format: ExplainFormat,
        verbose: bool,
        buffers: bool,
    ) -> DbResult<ExplainQueryOutput> {
        validate_read_only(sql)?;

        let mut options = vec![format!("FORMAT {}", format.as_sql())];
        if analyze {
            options.push("ANALYZE".to_string());
        }
        if verbose {
            options.push("VERBOSE".to_string());
        }
        if buffers && analyze {
            options.push("BUFFERS".to_string());
        }

        let explain_sql = format!("EXPLAIN ({}) {sql}", options.join(", "));
        let (explain_sql, named) = convert_params(&explain_sql, params);

        let mut tx = engine.read_tx(None).await?;
        let rows = fetch_named(tx.conn(), &explain_sql, &named).await?;
        tx.rollback().await?;

        let plan = match format {
            ExplainFormat::Json => match rows.first() {
                Some(row) => row.try_get::<JsonValue, _>(0).map_err(DbError::from)?,
                None => JsonValue::Null,
            },
            _ => {
                let lines = rows
                    .iter()
                    .map(|row| row.try_get::<String, _>(0))
                    .collect::<Result<Vec<_>, _>>()
                    .map_err(DbError::from)?;
                JsonValue::String(lines.join("\n"))
            }
        };

        Ok(ExplainQueryOutput::raw(plan, format))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_select() {
        assert!(validate_read_only("SELECT * FROM users").is_ok());
        assert!(validate_read_only("select id from users").is_ok());
        assert!(validate_read_only("  \n SELECT 1").is_ok());
    }

    #[test]
    fn test_validate_accepts_with() {
        assert!(
            validate_read_only("WITH recent AS (SELECT * FROM orders) SELECT * FROM recent")
                .is_ok()
        );
    }

    #[test]
    fn test_validate_rejects_writes_with_keyword_in_message() {
        let err = validate_read_only("DELETE FROM users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
        assert_eq!(err.to_string(), "Query contains blocked keyword: DELETE");
        assert_eq!(
            err.suggestion().as_deref(),
            Some("This server only supports read operations (SELECT queries).")
        );
    }

    #[test]
    fn test_validate_rejects_write_buried_in_subquery() {
        let err = validate_read_only("select * from (delete from users) as x").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
        assert_eq!(err.to_string(), "Query contains blocked keyword: DELETE");
    }

    #[test]
    fn test_validate_rejects_stacked_statement() {
        let err = validate_read_only("SELECT 1; DROP TABLE users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
        assert!(err.to_string().contains("DROP"));
    }

    #[test]
    fn test_validate_keyword_check_runs_before_shape_check() {
        // Not a SELECT either, but the keyword verdict wins
        let err = validate_read_only("TRUNCATE users").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
    }

    #[test]
    fn test_validate_rejects_non_select() {
        let err = validate_read_only("SHOW server_version").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSql);
        assert_eq!(err.to_string(), "Query must start with SELECT or WITH");
        assert_eq!(
            err.suggestion().as_deref(),
            Some("Only SELECT and WITH...SELECT queries are allowed.")
        );
    }

    #[test]
    fn test_validate_rejects_explain_wrapper() {
        // EXPLAIN is applied by the explain tool, not accepted as input
        let err = validate_read_only("EXPLAIN SELECT 1").unwrap_err();
        assert_eq!(err.code(), ErrorCode::InvalidSql);
    }

    #[test]
    fn test_validate_every_blocked_keyword() {
        for keyword in BLOCKED_KEYWORDS {
            let sql = format!("SELECT 1 WHERE x = {keyword}");
            let err = validate_read_only(&sql).unwrap_err();
            assert_eq!(err.code(), ErrorCode::WriteOperationDenied, "{keyword}");
        }
    }

    #[test]
    fn test_validate_matches_whole_words_only() {
        // created_at, updated_at and analyze_results embed keywords but
        // never on a word boundary
        assert!(validate_read_only("SELECT created_at, updated_at FROM audit_log").is_ok());
        assert!(validate_read_only("SELECT * FROM analyze_results").is_ok());
        assert!(validate_read_only("SELECT settings FROM app_settings").is_ok());
    }

    #[test]
    fn test_validate_scans_string_literals_too() {
        // Conservative by contract: a keyword inside a literal still rejects
        let err = validate_read_only("SELECT * FROM logs WHERE action = 'DELETE'").unwrap_err();
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
    }

    #[test]
    fn test_convert_params_empty() {
        let (sql, named) = convert_params("SELECT * FROM users", &[]);
        assert_eq!(sql, "SELECT * FROM users");
        assert!(named.is_empty());
    }

    #[test]
    fn test_convert_params_simple() {
        let (sql, named) = convert_params(
            "SELECT * FROM users WHERE id = $1 AND active = $2",
            &[QueryParam::from(42i64), QueryParam::from(true)],
        );
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE id = :param_1 AND active = :param_2"
        );
        assert_eq!(named.len(), 2);
        assert!(named.get("param_1").is_some());
        assert!(named.get("param_2").is_some());
    }

    #[test]
    fn test_convert_params_repeated_placeholder() {
        let (sql, _) = convert_params(
            "SELECT $1 WHERE $1 IS NOT NULL",
            &[QueryParam::from("x")],
        );
        assert_eq!(sql, "SELECT :param_1 WHERE :param_1 IS NOT NULL");
    }

    #[test]
    fn test_convert_params_two_digit_placeholders() {
        let params: Vec<QueryParam> = (1..=11).map(|i| QueryParam::from(i as i64)).collect();
        let (sql, named) = convert_params("SELECT $1, $10, $11", &params);
        // $11 must not be rewritten as :param_1 followed by a literal 1
        assert_eq!(sql, "SELECT :param_1, :param_10, :param_11");
        assert_eq!(named.len(), 11);
    }

    #[test]
    fn test_query_hash_shape() {
        let hash = query_hash("SELECT 1");
        assert_eq!(hash.len(), 8);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_query_hash_deterministic_and_distinct() {
        assert_eq!(query_hash("SELECT 1"), query_hash("SELECT 1"));
        assert_ne!(query_hash("SELECT 1"), query_hash("SELECT 2"));
    }

    #[test]
    fn test_round_ms() {
        assert_eq!(round_ms(1.23456), 1.23);
        assert_eq!(round_ms(1.236), 1.24);
        assert_eq!(round_ms(0.0), 0.0);
    }

    #[test]
    fn test_limits() {
        assert_eq!(DEFAULT_ROW_LIMIT, 1000);
        assert_eq!(MAX_ROW_LIMIT, 10000);
        assert_eq!(BLOCKED_KEYWORDS.len(), 24);
    }
}
