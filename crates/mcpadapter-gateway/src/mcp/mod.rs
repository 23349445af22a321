//! MCP server side of the gateway
//!
//! - `handler`: rmcp `ServerHandler` exposing the aggregated tool catalog
//! - `auth_middleware`: bearer-token gate in front of the protocol routes

pub mod auth_middleware;
pub mod handler;

pub use auth_middleware::mcp_auth_middleware;
pub use handler::AdapterGatewayHandler;
