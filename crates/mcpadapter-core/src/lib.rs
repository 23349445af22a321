//! # MCP Adapter Core Library
//!
//! Domain types and configuration shared by the gateway and the server binary.
//!
//! ## Modules
//!
//! - `branding` - Product name, version and protocol constants
//! - `domain` - Backend definitions (id + base URL)
//! - `config` - `servers.json`, pool tuning and environment settings

pub mod branding;
pub mod config;
pub mod domain;

pub use config::{ConfigError, GatewaySettings, PoolSettings, ServersConfig};
pub use domain::{BackendDefinition, BackendEntry};
