//! Wiring between the MCP protocol and the tool handlers.

pub mod service;

pub use service::PgService;
