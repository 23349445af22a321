//! Tool catalog: registry of externally visible tools and their discovery

mod discovery;
mod registry;

pub use discovery::{BackendDiscovery, DiscoveryReport, ToolDiscovery};
pub use registry::{ToolEntry, ToolRegistry};
