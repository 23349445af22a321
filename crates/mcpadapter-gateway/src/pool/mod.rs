//! Backend pool - session management and tool routing
//!
//! - **SessionPool**: Bounded set of initialized sessions for one backend URL
//! - **PoolRegistry**: One pool per backend URL, created on first use
//! - **ToolRegistry / ToolDiscovery**: External tool name → backend + native name
//! - **BackendCallProxy**: Resolve, acquire, call, release
//! - **transport / envelope**: rmcp client sessions over Streamable HTTP and reply decoding

mod envelope;
mod features;
mod registry;
mod routing;
mod session;
mod session_pool;
pub mod transport;

pub use envelope::{BackendReply, ReplyEnvelope};
pub use features::{BackendDiscovery, DiscoveryReport, ToolDiscovery, ToolEntry, ToolRegistry};
pub use registry::PoolRegistry;
pub use routing::BackendCallProxy;
pub use session::{BackendSession, SessionInfo, SessionStatus};
pub use session_pool::{PoolSnapshot, SessionLease, SessionPool};
