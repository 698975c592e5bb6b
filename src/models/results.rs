//! Query execution outputs and the structured error envelope.
//!
//! Every tool returns either its typed success output or [`ToolError`];
//! [`ToolReply`] is that union, serialized untagged so the client sees one
//! plain object either way.

use crate::error::{DbError, ErrorCode};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Metadata about a result column.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct QueryColumn {
    pub name: String,
    /// Type name as reported by the driver (e.g. "int4", "text")
    pub data_type: String,
}

/// Output for the execute_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteQueryOutput {
    pub columns: Vec<QueryColumn>,
    /// Result rows as column name → value maps, in result order
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    pub row_count: usize,
    /// Whether results were truncated by the row limit
    pub has_more: bool,
    pub execution_time_ms: f64,
    /// 8-hex-char fingerprint of the executed SQL, for log correlation
    pub query_hash: String,
}

/// Plan output format for explain_query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ExplainFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl ExplainFormat {
    /// Spelling used inside the EXPLAIN options list.
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Text => "TEXT",
            Self::Json => "JSON",
            Self::Yaml => "YAML",
        }
    }
}

/// Output for the explain_query tool.
///
/// The plan is returned raw: a structured value for json format, a single
/// newline-joined string otherwise. The optional fields exist for clients
/// that post-process plans; this server does not populate them.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExplainQueryOutput {
    pub plan: JsonValue,
    pub format: ExplainFormat,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_cost: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub estimated_rows: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub actual_time_ms: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warnings: Option<Vec<String>>,
}

impl ExplainQueryOutput {
    /// Wrap a raw plan value for the given format.
    pub fn raw(plan: JsonValue, format: ExplainFormat) -> Self {
        Self {
            plan,
            format,
            estimated_cost: None,
            estimated_rows: None,
            actual_time_ms: None,
            warnings: None,
        }
    }
}

/// Output for the validate_query tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ValidateQueryOutput {
    pub valid: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorDetail>,
}

impl ValidateQueryOutput {
    pub fn ok() -> Self {
        Self {
            valid: true,
            error: None,
        }
    }

    pub fn rejected(err: &DbError) -> Self {
        Self {
            valid: false,
            error: Some(ErrorDetail::from_db_error(err)),
        }
    }
}

/// Detailed error information inside the envelope.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ErrorDetail {
    /// Machine-readable error code
    pub code: ErrorCode,
    /// Human-readable error message
    pub message: String,
    /// Actionable suggestion to resolve the error
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    /// Additional context for debugging
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context: Option<JsonValue>,
}

impl ErrorDetail {
    /// Build a detail from an internal error, filling in the code's default
    /// suggestion when the error carries none.
    pub fn from_db_error(err: &DbError) -> Self {
        let code = err.code();
        Self {
            code,
            message: err.to_string(),
            suggestion: Some(
                err.suggestion()
                    .unwrap_or_else(|| code.default_suggestion().to_string()),
            ),
            context: None,
        }
    }
}

/// Standard error envelope for tool failures.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ToolError {
    pub error: ErrorDetail,
    pub tool_name: String,
    /// Echo of the input that produced the failure
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_received: Option<JsonValue>,
}

impl ToolError {
    /// Create an envelope with the code's default suggestion.
    pub fn new(code: ErrorCode, message: impl Into<String>, tool_name: impl Into<String>) -> Self {
        Self {
            error: ErrorDetail {
                code,
                message: message.into(),
                suggestion: Some(code.default_suggestion().to_string()),
                context: None,
            },
            tool_name: tool_name.into(),
            input_received: None,
        }
    }

    /// Create an envelope from an internal error, echoing the tool input.
    pub fn from_db_error(tool_name: &str, err: &DbError, input: Option<JsonValue>) -> Self {
        Self {
            error: ErrorDetail::from_db_error(err),
            tool_name: tool_name.to_string(),
            input_received: input,
        }
    }

    /// Replace the default suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.error.suggestion = Some(suggestion.into());
        self
    }

    /// Attach debugging context.
    pub fn with_context(mut self, context: JsonValue) -> Self {
        self.error.context = Some(context);
        self
    }

    /// Attach the echoed input.
    pub fn with_input(mut self, input: JsonValue) -> Self {
        self.input_received = Some(input);
        self
    }
}

/// A tool result: the typed output on success, the error envelope on
/// failure. Untagged, so the wire shape is one object or the other.
// rmcp requires outputSchema to have root type "object"; both variants
// serialize as objects, so declare that alongside the untagged anyOf.
#[derive(Debug, Clone, Serialize, JsonSchema)]
#[serde(untagged)]
#[schemars(extend("type" = "object"))]
pub enum ToolReply<T> {
    Ok(T),
    Err(ToolError),
}

impl<T> From<ToolError> for ToolReply<T> {
    fn from(err: ToolError) -> Self {
        Self::Err(err)
    }
}
