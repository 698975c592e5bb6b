//! Error types for the PostgreSQL MCP server.
//!
//! Every failure that can cross the tool boundary carries one of the stable
//! [`ErrorCode`] values plus an actionable suggestion, so an AI agent can
//! recover (list schemas, fix syntax, raise a timeout) instead of retrying
//! blindly. `DbError` is the internal error type; the tool layer converts it
//! into the serialized envelope in `models::results`.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Stable machine-readable error codes surfaced to MCP clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    SchemaNotFound,
    TableNotFound,
    ColumnNotFound,
    InvalidSql,
    WriteOperationDenied,
    QueryTimeout,
    ConnectionError,
    PermissionDenied,
    ParameterError,
    PathNotFound,
}

impl ErrorCode {
    /// Wire representation, matching the serde rename.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SchemaNotFound => "SCHEMA_NOT_FOUND",
            Self::TableNotFound => "TABLE_NOT_FOUND",
            Self::ColumnNotFound => "COLUMN_NOT_FOUND",
            Self::InvalidSql => "INVALID_SQL",
            Self::WriteOperationDenied => "WRITE_OPERATION_DENIED",
            Self::QueryTimeout => "QUERY_TIMEOUT",
            Self::ConnectionError => "CONNECTION_ERROR",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::ParameterError => "PARAMETER_ERROR",
            Self::PathNotFound => "PATH_NOT_FOUND",
        }
    }

    /// Default recovery suggestion used when an error carries no specific one.
    pub fn default_suggestion(&self) -> &'static str {
        match self {
            Self::SchemaNotFound => "List available schemas with list_schemas",
            Self::TableNotFound => "List tables in schema with list_tables",
            Self::ColumnNotFound => "Describe table to see available columns",
            Self::InvalidSql => "Review query syntax",
            Self::WriteOperationDenied => "This server only supports read operations",
            Self::QueryTimeout => "Simplify query or increase timeout",
            Self::ConnectionError => "Check database connectivity",
            Self::PermissionDenied => "Contact database administrator",
            Self::ParameterError => "Review parameter constraints",
            Self::PathNotFound => "Tables may not be related via foreign keys",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum DbError {
    /// Read-only validation rejected the statement before it reached the
    /// database (blocked keyword or bad leading token).
    #[error("{message}")]
    Validation {
        code: ErrorCode,
        message: String,
        suggestion: String,
    },

    #[error("Schema '{name}' not found")]
    SchemaNotFound { name: String, similar: Vec<String> },

    #[error("Table '{table}' does not exist in schema '{schema}'")]
    TableNotFound {
        schema: String,
        table: String,
        similar: Vec<String>,
    },

    #[error("Invalid parameter: {message}")]
    Parameter { message: String },

    /// Driver-reported error, already classified to a stable code.
    #[error("{message}")]
    Database {
        code: ErrorCode,
        message: String,
        /// e.g. "57014" for statement timeout
        sql_state: Option<String>,
    },

    #[error("Connection failed: {message}")]
    Connection { message: String },
}

impl DbError {
    /// Create a validation error (INVALID_SQL or WRITE_OPERATION_DENIED).
    pub fn validation(
        code: ErrorCode,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Validation {
            code,
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a schema-not-found error with optional close matches.
    pub fn schema_not_found(name: impl Into<String>, similar: Vec<String>) -> Self {
        Self::SchemaNotFound {
            name: name.into(),
            similar,
        }
    }

    /// Create a table-not-found error with optional close matches.
    pub fn table_not_found(
        schema: impl Into<String>,
        table: impl Into<String>,
        similar: Vec<String>,
    ) -> Self {
        Self::TableNotFound {
            schema: schema.into(),
            table: table.into(),
            similar,
        }
    }

    /// Create a parameter error.
    pub fn parameter(message: impl Into<String>) -> Self {
        Self::Parameter {
            message: message.into(),
        }
    }

    /// Create a connection error.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
        }
    }

    /// The stable code this error maps to at the tool boundary.
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { code, .. } => *code,
            Self::SchemaNotFound { .. } => ErrorCode::SchemaNotFound,
            Self::TableNotFound { .. } => ErrorCode::TableNotFound,
            Self::Parameter { .. } => ErrorCode::ParameterError,
            Self::Database { code, .. } => *code,
            Self::Connection { .. } => ErrorCode::ConnectionError,
        }
    }

    /// Error-specific suggestion, if one exists. Callers fall back to
    /// [`ErrorCode::default_suggestion`] when this returns `None`.
    pub fn suggestion(&self) -> Option<String> {
        match self {
            Self::Validation { suggestion, .. } => Some(suggestion.clone()),
            Self::SchemaNotFound { similar, .. } | Self::TableNotFound { similar, .. } => {
                if similar.is_empty() {
                    None
                } else {
                    Some(format!("Did you mean: {}?", similar.join(", ")))
                }
            }
            _ => None,
        }
    }
}

/// Classify an error message when the driver gives no SQLSTATE.
///
/// The substring table is part of the external contract: timeout beats
/// permission beats syntax, everything else is a connectivity problem.
pub fn classify_message(message: &str) -> ErrorCode {
    let lower = message.to_lowercase();
    if lower.contains("timeout") {
        ErrorCode::QueryTimeout
    } else if lower.contains("permission") || lower.contains("denied") {
        ErrorCode::PermissionDenied
    } else if lower.contains("syntax") {
        ErrorCode::InvalidSql
    } else {
        ErrorCode::ConnectionError
    }
}

/// Classify a PostgreSQL SQLSTATE to a stable code, when the state is one
/// the agent can act on. Returns `None` for states the substring fallback
/// should handle.
fn classify_sql_state(state: &str) -> Option<ErrorCode> {
    match state {
        // query_canceled: raised by statement_timeout
        "57014" => Some(ErrorCode::QueryTimeout),
        "42501" => Some(ErrorCode::PermissionDenied),
        "42601" => Some(ErrorCode::InvalidSql),
        "42P01" => Some(ErrorCode::TableNotFound),
        "42703" => Some(ErrorCode::ColumnNotFound),
        "3F000" => Some(ErrorCode::SchemaNotFound),
        _ => None,
    }
}

/// Convert sqlx errors to DbError, classifying by SQLSTATE where available
/// and by message text otherwise.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let message = db_err.message().to_string();
                let sql_state = db_err.code().map(|c| c.to_string());
                let code = sql_state
                    .as_deref()
                    .and_then(classify_sql_state)
                    .unwrap_or_else(|| classify_message(&message));
                DbError::Database {
                    code,
                    message,
                    sql_state,
                }
            }
            sqlx::Error::PoolTimedOut => {
                DbError::connection("Timed out acquiring a connection from the pool")
            }
            sqlx::Error::PoolClosed => DbError::connection("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::connection(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::connection(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::connection(format!("Protocol error: {}", msg)),
            sqlx::Error::Configuration(msg) => DbError::connection(msg.to_string()),
            other => {
                let message = other.to_string();
                let code = classify_message(&message);
                DbError::Database {
                    code,
                    message,
                    sql_state: None,
                }
            }
        }
    }
}

/// Shorthand for fallible database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Edit distance between two strings, two-row dynamic programming.
fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.iter().enumerate() {
        let mut curr = Vec::with_capacity(b.len() + 1);
        curr.push(i + 1);
        for (j, cb) in b.iter().enumerate() {
            let substitution = prev[j] + usize::from(ca != cb);
            curr.push(substitution.min(prev[j + 1] + 1).min(curr[j] + 1));
        }
        prev = curr;
    }
    prev[b.len()]
}

/// Find candidate names close to `name` for "did you mean" suggestions.
///
/// Case-insensitive edit distance; at most `max_results` names within
/// distance 3, closest first. The sort is stable, so equally-close
/// candidates keep their input order.
pub fn find_similar_names(name: &str, candidates: &[String], max_results: usize) -> Vec<String> {
    let target = name.to_lowercase();
    let mut scored: Vec<(&String, usize)> = candidates
        .iter()
        .map(|c| (c, levenshtein(&target, &c.to_lowercase())))
        .collect();
    scored.sort_by_key(|(_, distance)| *distance);
    scored
        .into_iter()
        .take(max_results)
        .filter(|(_, distance)| *distance <= 3)
        .map(|(c, _)| c.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_wire_names() {
        assert_eq!(ErrorCode::SchemaNotFound.as_str(), "SCHEMA_NOT_FOUND");
        assert_eq!(
            ErrorCode::WriteOperationDenied.as_str(),
            "WRITE_OPERATION_DENIED"
        );
        assert_eq!(ErrorCode::PathNotFound.as_str(), "PATH_NOT_FOUND");
    }

    #[test]
    fn test_error_code_serializes_to_wire_name() {
        let json = serde_json::to_string(&ErrorCode::InvalidSql).unwrap();
        assert_eq!(json, "\"INVALID_SQL\"");
    }

    #[test]
    fn test_every_code_has_a_default_suggestion() {
        let codes = [
            ErrorCode::SchemaNotFound,
            ErrorCode::TableNotFound,
            ErrorCode::ColumnNotFound,
            ErrorCode::InvalidSql,
            ErrorCode::WriteOperationDenied,
            ErrorCode::QueryTimeout,
            ErrorCode::ConnectionError,
            ErrorCode::PermissionDenied,
            ErrorCode::ParameterError,
            ErrorCode::PathNotFound,
        ];
        for code in codes {
            assert!(!code.default_suggestion().is_empty(), "{code} missing");
        }
    }

    #[test]
    fn test_validation_error_keeps_its_code() {
        let err = DbError::validation(
            ErrorCode::WriteOperationDenied,
            "Query contains blocked keyword: DELETE",
            "This server only supports read operations (SELECT queries).",
        );
        assert_eq!(err.code(), ErrorCode::WriteOperationDenied);
        assert!(err.to_string().contains("DELETE"));
        assert!(err.suggestion().unwrap().contains("read operations"));
    }

    #[test]
    fn test_table_not_found_display() {
        let err = DbError::table_not_found("public", "userz", vec!["users".to_string()]);
        assert_eq!(
            err.to_string(),
            "Table 'userz' does not exist in schema 'public'"
        );
        assert_eq!(err.suggestion(), Some("Did you mean: users?".to_string()));
    }

    #[test]
    fn test_table_not_found_without_matches_has_no_suggestion() {
        let err = DbError::table_not_found("public", "zzz", vec![]);
        assert_eq!(err.suggestion(), None);
        assert_eq!(err.code(), ErrorCode::TableNotFound);
    }

    #[test]
    fn test_classify_message_timeout_wins() {
        assert_eq!(
            classify_message("canceling statement due to statement timeout"),
            ErrorCode::QueryTimeout
        );
        // timeout beats permission when both appear
        assert_eq!(
            classify_message("timeout waiting for permission"),
            ErrorCode::QueryTimeout
        );
    }

    #[test]
    fn test_classify_message_permission() {
        assert_eq!(
            classify_message("permission denied for table users"),
            ErrorCode::PermissionDenied
        );
        assert_eq!(
            classify_message("access DENIED"),
            ErrorCode::PermissionDenied
        );
    }

    #[test]
    fn test_classify_message_syntax() {
        assert_eq!(
            classify_message("syntax error at or near \"FORM\""),
            ErrorCode::InvalidSql
        );
    }

    #[test]
    fn test_classify_message_fallback_is_connection() {
        assert_eq!(
            classify_message("something unexpected"),
            ErrorCode::ConnectionError
        );
    }

    #[test]
    fn test_classify_sql_state() {
        assert_eq!(classify_sql_state("57014"), Some(ErrorCode::QueryTimeout));
        assert_eq!(
            classify_sql_state("42501"),
            Some(ErrorCode::PermissionDenied)
        );
        assert_eq!(classify_sql_state("42601"), Some(ErrorCode::InvalidSql));
        assert_eq!(classify_sql_state("42P01"), Some(ErrorCode::TableNotFound));
        assert_eq!(classify_sql_state("42703"), Some(ErrorCode::ColumnNotFound));
        assert_eq!(classify_sql_state("3F000"), Some(ErrorCode::SchemaNotFound));
        assert_eq!(classify_sql_state("23505"), None);
    }

    #[test]
    fn test_pool_timeout_is_connection_error() {
        let err: DbError = sqlx::Error::PoolTimedOut.into();
        assert_eq!(err.code(), ErrorCode::ConnectionError);
    }

    #[test]
    fn test_levenshtein_basics() {
        assert_eq!(levenshtein("", ""), 0);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("abc", "abc"), 0);
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("users", "user"), 1);
    }

    #[test]
    fn test_find_similar_names_sorts_by_distance() {
        let candidates = vec![
            "uservv".to_string(),
            "users".to_string(),
            "user_roles".to_string(),
        ];
        let similar = find_similar_names("user", &candidates, 3);
        // users (1) before uservv (2); user_roles (6) filtered out
        assert_eq!(similar, vec!["users".to_string(), "uservv".to_string()]);
    }

    #[test]
    fn test_find_similar_names_is_case_insensitive() {
        let candidates = vec!["Users".to_string()];
        assert_eq!(
            find_similar_names("users", &candidates, 3),
            vec!["Users".to_string()]
        );
    }

    #[test]
    fn test_find_similar_names_caps_results() {
        let candidates = vec![
            "user1".to_string(),
            "user2".to_string(),
            "user3".to_string(),
            "user4".to_string(),
        ];
        assert_eq!(find_similar_names("user", &candidates, 3).len(), 3);
    }

    #[test]
    fn test_find_similar_names_filters_distant() {
        let candidates = vec!["completely_different".to_string()];
        assert!(find_similar_names("users", &candidates, 3).is_empty());
    }

    #[test]
    fn test_find_similar_names_stable_ties() {
        let candidates = vec!["usera".to_string(), "userb".to_string()];
        assert_eq!(
            find_similar_names("users", &candidates, 3),
            vec!["usera".to_string(), "userb".to_string()]
        );
    }
}
