//! Gateway MCP Handler
//!
//! Lists the discovered tools under their prefixed names and forwards
//! `tools/call` to the backend call proxy.

use std::sync::Arc;

use rmcp::{
    model::*,
    service::RequestContext,
    ErrorData as McpError, RoleServer, ServerHandler,
};
use serde_json::Value;
use tracing::{debug, info, warn};

use mcpadapter_core::branding;

use crate::error::ProxyError;
use crate::pool::ToolEntry;
use crate::server::GatewayServices;

#[derive(Clone)]
pub struct AdapterGatewayHandler {
    pub services: Arc<GatewayServices>,
}

impl AdapterGatewayHandler {
    pub fn new(services: Arc<GatewayServices>) -> Self {
        Self { services }
    }

    async fn ensure_catalog(&self) {
        if let Some(report) = self
            .services
            .discovery
            .ensure_discovered(&self.services.tools)
            .await
        {
            debug!(
                "On-demand discovery found {} tools",
                report.total_tools
            );
        }
    }
}

/// Backends publish only tool names, so every tool takes an open object
fn open_input_schema() -> Arc<serde_json::Map<String, Value>> {
    let mut schema = serde_json::Map::new();
    schema.insert("type".to_string(), Value::String("object".to_string()));
    schema.insert("additionalProperties".to_string(), Value::Bool(true));
    Arc::new(schema)
}

fn to_mcp_tool(entry: ToolEntry, schema: &Arc<serde_json::Map<String, Value>>) -> Tool {
    Tool::new(entry.external_name, entry.description, Arc::clone(schema))
}

impl ServerHandler for AdapterGatewayHandler {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: Default::default(),
            capabilities: ServerCapabilities::builder()
                .enable_tools_with(ToolsCapability {
                    list_changed: Some(false),
                })
                .build(),
            server_info: Implementation {
                name: branding::DISPLAY_NAME.to_string(),
                version: branding::VERSION.to_string(),
                ..Default::default()
            },
            instructions: Some(branding::DESCRIPTION.to_string()),
        }
    }

    async fn list_tools(
        &self,
        _params: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        self.ensure_catalog().await;

        let schema = open_input_schema();
        let tools: Vec<Tool> = self
            .services
            .tools
            .list()
            .into_iter()
            .map(|entry| to_mcp_tool(entry, &schema))
            .collect();

        debug!(count = tools.len(), "list_tools");
        Ok(ListToolsResult::with_all_items(tools))
    }

    async fn call_tool(
        &self,
        params: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        info!(tool = %params.name, "call_tool");
        self.ensure_catalog().await;

        let arguments = params
            .arguments
            .map(Value::Object)
            .unwrap_or_else(|| Value::Object(Default::default()));

        match self
            .services
            .proxy
            .call_tool(params.name.as_ref(), arguments)
            .await
        {
            Ok(reply) => Ok(CallToolResult::success(vec![Content::text(
                reply.into_text(),
            )])),
            Err(e @ ProxyError::ToolNotFound { .. }) => {
                warn!(tool = %params.name, "unknown tool");
                Err(McpError::invalid_params(e.to_string(), None))
            }
            Err(e) => {
                warn!(tool = %params.name, kind = ?e.kind(), "tool call failed: {}", e);
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }
}
