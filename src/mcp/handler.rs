//! MCP server handler, shared application state, and tool router.

use std::future::Future;
use std::sync::Arc;

use rmcp::handler::server::{
    tool::{ToolCallContext, ToolRoute, ToolRouter},
    ServerHandler,
};
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Implementation, ListToolsResult, PaginatedRequestParam,
    ProtocolVersion, ServerCapabilities, ServerInfo, Tool,
};
use rmcp::service::{RequestContext, RoleServer};
use tracing::info_span;

use crate::config::ServerConfig;

/// Shared application state accessible by all MCP tool handlers.
pub struct AppState {
    /// Runtime configuration.
    pub config: Arc<ServerConfig>,
}

/// MCP server implementation exposing the demo tool surface.
///
/// One instance is created per session; all instances share [`AppState`].
#[derive(Clone)]
pub struct ClockServer {
    _state: Arc<AppState>,
}

impl ClockServer {
    /// Create a new MCP server bound to shared application state.
    #[must_use]
    pub fn new(state: Arc<AppState>) -> Self {
        Self { _state: state }
    }

    fn tool_router() -> ToolRouter<Self> {
        let mut router = ToolRouter::new();

        // get_current_time is the only registered tool; unknown names fall
        // through to the router's own not-found error.
        for tool in Self::all_tools() {
            router.add_route(ToolRoute::new_dyn(tool, |context| {
                Box::pin(crate::mcp::tools::get_current_time::handle(context))
            }));
        }

        router
    }

    /// Convert a `serde_json::Value::Object` into the `Arc<Map>` expected by `Tool`.
    fn schema(value: serde_json::Value) -> Arc<serde_json::Map<String, serde_json::Value>> {
        match value {
            serde_json::Value::Object(map) => Arc::new(map),
            _ => Arc::new(serde_json::Map::default()),
        }
    }

    /// Tool descriptors registered once at startup; immutable thereafter.
    pub(crate) fn all_tools() -> Vec<Tool> {
        vec![Tool {
            name: "get_current_time".into(),
            description: Some(
                "Return the current server time as an ISO 8601 string (UTC).".into(),
            ),
            input_schema: Self::schema(serde_json::json!({
                "type": "object",
                "properties": {}
            })),
            output_schema: None,
            annotations: None,
            title: None,
            icons: None,
            meta: None,
        }]
    }
}

impl ServerHandler for ClockServer {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2024_11_05,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "Demo server exposing a single get_current_time tool.".into(),
            ),
        }
    }

    fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<CallToolResult, rmcp::ErrorData>> + Send + '_ {
        let router = Self::tool_router();
        let _span = info_span!("call_tool", tool = %request.name).entered();

        async move {
            router
                .call(ToolCallContext::new(self, request, context))
                .await
        }
    }

    fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> impl Future<Output = Result<ListToolsResult, rmcp::ErrorData>> + Send + '_ {
        let tools = Self::all_tools();

        std::future::ready(Ok(ListToolsResult::with_all_items(tools)))
    }
}
