//! `get_current_time` MCP tool handler.
//!
//! No input parameters; side-effect-free aside from reading the system
//! clock. Cannot fail.

use chrono::{SecondsFormat, Utc};
use rmcp::handler::server::tool::ToolCallContext;
use rmcp::model::{CallToolResult, Content};
use tracing::debug;

use crate::mcp::handler::ClockServer;

/// Current UTC wall-clock time as an ISO 8601 / RFC 3339 string with
/// microsecond precision and an explicit `+00:00` offset.
#[must_use]
pub fn current_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, false)
}

/// Handle the `get_current_time` tool call.
///
/// Arguments are ignored: the tool takes no parameters.
///
/// # Errors
///
/// Never fails; the signature matches the tool router contract.
pub async fn handle(
    context: ToolCallContext<'_, ClockServer>,
) -> Result<CallToolResult, rmcp::ErrorData> {
    if let Some(ref args) = context.arguments {
        if !args.is_empty() {
            debug!(count = args.len(), "ignoring unexpected tool arguments");
        }
    }

    let now = current_timestamp();
    Ok(CallToolResult::success(vec![Content::text(now)]))
}
