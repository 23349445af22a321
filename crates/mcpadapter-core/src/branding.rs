//! Centralized product constants
//!
//! Every user-facing name and protocol constant comes from this module so the
//! gateway, its handshake and its HTTP surface agree on them.

/// Display name reported by `/info` and the MCP `serverInfo`
pub const DISPLAY_NAME: &str = "MCP Adapter";

/// Client name sent to backends during the `initialize` handshake
pub const CLIENT_NAME: &str = "mcp-gateway";

/// Gateway version (shared by all workspace crates)
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for the gateway HTTP listener
pub const DEFAULT_GATEWAY_PORT: u16 = 8000;

/// Default location of the backend server list
pub const DEFAULT_SERVERS_FILE: &str = "servers.json";

/// Log file prefix used by the rolling file appender
pub const LOG_PREFIX: &str = "mcp-adapter";

/// Short description used by `/info`
pub const DESCRIPTION: &str = "Aggregates tools from multiple backend MCP servers";
