//! PostgreSQL MCP Server Library
//!
//! This library provides MCP (Model Context Protocol) tools for AI agents
//! to explore and query a PostgreSQL database. All access is read-only:
//! queries are validated textually and executed inside transactions that
//! are always rolled back.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::{DbError, DbResult, ErrorCode};
pub use mcp::PgService;
