//! MCP Adapter Gateway
//!
//! MCP proxy server that provides:
//! - A bounded session pool per backend URL with notify-on-release waiting
//! - Tool discovery and prefixed-name routing (`hello_greet` → `hello` / `greet`)
//! - A backend-call proxy that always returns a session to its pool
//! - An authenticated Streamable HTTP front door (rmcp) plus introspection routes

pub mod auth;
pub mod error;
pub mod logging;
pub mod mcp;
pub mod pool;
pub mod server;

pub use auth::{AuthGate, StaticTokenGate};
pub use error::{DiscoveryError, ErrorKind, PoolError, ProxyError};
pub use server::{GatewayConfig, GatewayServer, GatewayServices};

pub use pool::{
    // Sessions
    BackendSession, PoolRegistry, PoolSnapshot, SessionInfo, SessionLease, SessionPool,
    SessionStatus,
    // Proxy
    BackendCallProxy, BackendReply, ReplyEnvelope,
    // Tools
    DiscoveryReport, ToolDiscovery, ToolEntry, ToolRegistry,
};

pub use mcp::AdapterGatewayHandler;
