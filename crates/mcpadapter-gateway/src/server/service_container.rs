//! Service container - the gateway's owned registries and services

use std::sync::Arc;

use mcpadapter_core::{BackendDefinition, PoolSettings};

use crate::auth::AuthGate;
use crate::pool::{BackendCallProxy, PoolRegistry, ToolDiscovery, ToolRegistry};

/// Shared by the protocol handler, the HTTP handlers and the auth middleware
#[derive(Clone)]
pub struct GatewayServices {
    pub backends: Arc<Vec<BackendDefinition>>,
    pub tools: Arc<ToolRegistry>,
    pub pools: Arc<PoolRegistry>,
    pub discovery: Arc<ToolDiscovery>,
    pub proxy: Arc<BackendCallProxy>,
    pub auth_gate: Arc<dyn AuthGate>,
}

impl GatewayServices {
    pub fn initialize(
        backends: Vec<BackendDefinition>,
        pool_settings: PoolSettings,
        auth_gate: Arc<dyn AuthGate>,
    ) -> Self {
        let tools = Arc::new(ToolRegistry::new());
        let pools = Arc::new(PoolRegistry::new(pool_settings));
        let proxy = Arc::new(BackendCallProxy::new(
            Arc::clone(&tools),
            Arc::clone(&pools),
        ));
        let discovery = Arc::new(ToolDiscovery::new(backends.clone()));

        Self {
            backends: Arc::new(backends),
            tools,
            pools,
            discovery,
            proxy,
            auth_gate,
        }
    }

    pub fn backend_ids(&self) -> Vec<String> {
        self.backends.iter().map(|b| b.id.clone()).collect()
    }

    /// Refresh the tool catalog from every backend
    pub async fn discover_tools(&self) -> crate::pool::DiscoveryReport {
        self.discovery.discover_all(&self.tools).await
    }

    pub async fn shutdown(&self) {
        self.pools.shutdown_all().await;
    }
}
