//! Named parameter binding for database queries.
//!
//! Queries in this crate are written with `:name` placeholders. At execution
//! time [`compile_named`] rewrites them to the positional `$n` form the wire
//! protocol expects, and the helpers here bind [`QueryParam`] values in slot
//! order. Named slots keep catalog queries readable and let user-supplied
//! positional parameters flow through the same path once they are rewritten
//! to `:param_N` names.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::postgres::{PgArguments, PgRow};
use sqlx::types::Json;
use sqlx::{PgConnection, Postgres};

/// A single bind value.
///
/// Untagged so JSON inputs map naturally: numbers become `Int` or `Float`,
/// arrays and objects fall through to `Json`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Json(JsonValue),
}

impl From<&str> for QueryParam {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<String> for QueryParam {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<i64> for QueryParam {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for QueryParam {
    fn from(v: i32) -> Self {
        Self::Int(v as i64)
    }
}

impl From<bool> for QueryParam {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<Option<String>> for QueryParam {
    fn from(v: Option<String>) -> Self {
        v.map(Self::String).unwrap_or(Self::Null)
    }
}

impl From<Option<&str>> for QueryParam {
    fn from(v: Option<&str>) -> Self {
        v.map(Self::from).unwrap_or(Self::Null)
    }
}

/// An ordered set of named bind values.
#[derive(Debug, Clone, Default)]
pub struct NamedParams {
    entries: Vec<(String, QueryParam)>,
}

impl NamedParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<QueryParam>) {
        self.entries.push((name.into(), value.into()));
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<QueryParam>) -> Self {
        self.push(name, value);
        self
    }

    pub fn get(&self, name: &str) -> Option<&QueryParam> {
        self.entries
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Rewrite `:name` placeholders to positional `$n` form.
///
/// Returns the rewritten SQL and the slot names in first-use order. A name
/// that appears more than once reuses its original position. Placeholders
/// inside single-quoted strings and double-quoted identifiers are left
/// alone, as are `::type` casts. Slot names are ASCII identifiers; all
/// other text, multi-byte characters included, passes through verbatim.
pub fn compile_named(sql: &str) -> (String, Vec<String>) {
    let mut out = String::with_capacity(sql.len());
    let mut names: Vec<String> = Vec::new();
    let mut in_single = false;
    let mut in_double = false;
    let mut chars = sql.chars().peekable();

    while let Some(c) = chars.next() {
        if in_single {
            out.push(c);
            if c == '\'' {
                // '' escapes a quote inside the string
                if chars.peek() == Some(&'\'') {
                    out.push('\'');
                    chars.next();
                    continue;
                }
                in_single = false;
            }
            continue;
        }
        if in_double {
            out.push(c);
            if c == '"' {
                in_double = false;
            }
            continue;
        }
        match c {
            '\'' => {
                in_single = true;
                out.push('\'');
            }
            '"' => {
                in_double = true;
                out.push('"');
            }
            ':' => {
                // a cast, copy both colons through
                if chars.peek() == Some(&':') {
                    out.push_str("::");
                    chars.next();
                    continue;
                }
                let mut name = String::new();
                while let Some(&next) = chars.peek() {
                    if is_ident_char(next, name.is_empty()) {
                        name.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if name.is_empty() {
                    out.push(':');
                    continue;
                }
                let pos = match names.iter().position(|n| *n == name) {
                    Some(p) => p + 1,
                    None => {
                        names.push(name);
                        names.len()
                    }
                };
                out.push('$');
                out.push_str(&pos.to_string());
            }
            _ => out.push(c),
        }
    }

    (out, names)
}

fn is_ident_char(c: char, first: bool) -> bool {
    c.is_ascii_alphabetic() || c == '_' || (!first && c.is_ascii_digit())
}

/// Attach one value to the query bind list.
fn bind_param<'q>(
    query: sqlx::query::Query<'q, Postgres, PgArguments>,
    param: &'q QueryParam,
) -> sqlx::query::Query<'q, Postgres, PgArguments> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
        QueryParam::Json(v) => query.bind(Json(v)),
    }
}

/// Compile a named query, bind its parameters and fetch all rows.
pub async fn fetch_named(
    conn: &mut PgConnection,
    sql: &str,
    params: &NamedParams,
) -> DbResult<Vec<PgRow>> {
    let (compiled, order) = compile_named(sql);
    let mut query = sqlx::query(&compiled);
    for name in &order {
        let param = params
            .get(name)
            .ok_or_else(|| DbError::parameter(format!("no value bound for parameter '{name}'")))?;
        query = bind_param(query, param);
    }
    Ok(query.fetch_all(&mut *conn).await?)
}

/// Like [`fetch_named`] but for queries returning at most one row.
pub async fn fetch_optional_named(
    conn: &mut PgConnection,
    sql: &str,
    params: &NamedParams,
) -> DbResult<Option<PgRow>> {
    let (compiled, order) = compile_named(sql);
    let mut query = sqlx::query(&compiled);
    for name in &order {
        let param = params
            .get(name)
            .ok_or_else(|| DbError::parameter(format!("no value bound for parameter '{name}'")))?;
        query = bind_param(query, param);
    }
    Ok(query.fetch_optional(&mut *conn).await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_named_basic() {
        let (sql, names) = compile_named("SELECT * FROM t WHERE a = :a AND b = :b");
        assert_eq!(sql, "SELECT * FROM t WHERE a = $1 AND b = $2");
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_compile_named_reuses_position() {
        let (sql, names) = compile_named("SELECT :x WHERE :x > :y");
        assert_eq!(sql, "SELECT $1 WHERE $1 > $2");
        assert_eq!(names, vec!["x", "y"]);
    }

    #[test]
    fn test_compile_named_skips_casts() {
        let (sql, names) = compile_named("SELECT '5'::int, :val::text");
        assert_eq!(sql, "SELECT '5'::int, $1::text");
        assert_eq!(names, vec!["val"]);
    }

    #[test]
    fn test_compile_named_skips_string_literals() {
        let (sql, names) = compile_named("SELECT ':not_a_param', :real");
        assert_eq!(sql, "SELECT ':not_a_param', $1");
        assert_eq!(names, vec!["real"]);
    }

    #[test]
    fn test_compile_named_skips_escaped_quotes() {
        let (sql, names) = compile_named("SELECT 'it''s :x here', :y");
        assert_eq!(sql, "SELECT 'it''s :x here', $1");
        assert_eq!(names, vec!["y"]);
    }

    #[test]
    fn test_compile_named_skips_quoted_identifiers() {
        let (sql, names) = compile_named("SELECT \":col\" FROM t WHERE v = :v");
        assert_eq!(sql, "SELECT \":col\" FROM t WHERE v = $1");
        assert_eq!(names, vec!["v"]);
    }

    #[test]
    fn test_compile_named_ignores_bare_colon() {
        let (sql, names) = compile_named("SELECT arr[1:3]");
        assert_eq!(sql, "SELECT arr[1:3]");
        assert!(names.is_empty());
    }

    #[test]
    fn test_compile_named_numbered_names() {
        let (sql, names) = compile_named("SELECT :param_1, :param_2, :param_10");
        assert_eq!(sql, "SELECT $1, $2, $3");
        assert_eq!(names, vec!["param_1", "param_2", "param_10"]);
    }

    #[test]
    fn test_compile_named_preserves_multibyte_literals() {
        let input = "SELECT * FROM t WHERE name = '张三' AND city = 'café'";
        let (sql, names) = compile_named(input);
        assert_eq!(sql, input);
        assert!(names.is_empty());
    }

    #[test]
    fn test_compile_named_multibyte_around_placeholder() {
        let (sql, names) = compile_named("SELECT \"имя\" FROM t WHERE v = :v AND note = 'über'");
        assert_eq!(sql, "SELECT \"имя\" FROM t WHERE v = $1 AND note = 'über'");
        assert_eq!(names, vec!["v"]);
    }

    #[test]
    fn test_compile_named_ignores_non_ascii_after_colon() {
        // only ASCII identifiers name a slot; anything else passes through
        let (sql, names) = compile_named("SELECT ':x', :имя, arr[2:3]");
        assert_eq!(sql, "SELECT ':x', :имя, arr[2:3]");
        assert!(names.is_empty());
    }

    #[test]
    fn test_query_param_from_json_untagged() {
        let p: QueryParam = serde_json::from_str("42").unwrap();
        assert!(matches!(p, QueryParam::Int(42)));

        let p: QueryParam = serde_json::from_str("4.5").unwrap();
        assert!(matches!(p, QueryParam::Float(f) if f == 4.5));

        let p: QueryParam = serde_json::from_str("true").unwrap();
        assert!(matches!(p, QueryParam::Bool(true)));

        let p: QueryParam = serde_json::from_str("\"abc\"").unwrap();
        assert!(matches!(p, QueryParam::String(s) if s == "abc"));

        let p: QueryParam = serde_json::from_str("null").unwrap();
        assert!(matches!(p, QueryParam::Null));

        let p: QueryParam = serde_json::from_str("[1, 2]").unwrap();
        assert!(matches!(p, QueryParam::Json(_)));
    }

    #[test]
    fn test_named_params_lookup() {
        let params = NamedParams::new()
            .with("schema", "public")
            .with("limit", 5i64);
        assert_eq!(params.len(), 2);
        assert!(matches!(
            params.get("schema"),
            Some(QueryParam::String(s)) if s == "public"
        ));
        assert!(params.get("missing").is_none());
    }

    #[test]
    fn test_named_params_optional_binding() {
        let params = NamedParams::new().with("pattern", None::<String>);
        assert!(matches!(params.get("pattern"), Some(QueryParam::Null)));
    }
}
