//! MCP tool handlers.

pub mod get_current_time;
