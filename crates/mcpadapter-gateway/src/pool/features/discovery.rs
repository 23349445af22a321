//! Tool discovery via each backend's `GET /info`
//!
//! ```json
//! { "available_tools": ["greet", "farewell"] }
//! ```
//!
//! A backend that cannot be reached or answers with garbage contributes zero
//! tools; discovery itself never fails.

use std::time::Duration;

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use mcpadapter_core::BackendDefinition;

use super::registry::{ToolEntry, ToolRegistry};
use crate::error::DiscoveryError;

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Deserialize)]
struct InfoPayload {
    #[serde(default)]
    available_tools: Vec<Value>,
}

/// Per-backend discovery outcome
#[derive(Debug, Clone, Serialize)]
pub struct BackendDiscovery {
    pub backend_id: String,
    pub url: String,
    pub tools: Vec<String>,
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryReport {
    pub backends: Vec<BackendDiscovery>,
    pub total_tools: usize,
}

impl DiscoveryReport {
    pub fn failed_backends(&self) -> impl Iterator<Item = &BackendDiscovery> {
        self.backends.iter().filter(|b| b.error.is_some())
    }
}

pub struct ToolDiscovery {
    http: reqwest::Client,
    backends: Vec<BackendDefinition>,
    timeout: Duration,
    /// Serializes discovery runs so concurrent first requests discover once
    refresh: Mutex<()>,
}

impl ToolDiscovery {
    pub fn new(backends: Vec<BackendDefinition>) -> Self {
        Self {
            http: reqwest::Client::new(),
            backends,
            timeout: DISCOVERY_TIMEOUT,
            refresh: Mutex::new(()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn backends(&self) -> &[BackendDefinition] {
        &self.backends
    }

    /// Native tool names advertised by one backend
    pub async fn fetch_tools(
        &self,
        backend: &BackendDefinition,
    ) -> Result<Vec<String>, DiscoveryError> {
        let response = self
            .http
            .get(backend.info_url())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| DiscoveryError::Request(e.to_string()))?;
        let payload: InfoPayload =
            serde_json::from_str(&body).map_err(|e| DiscoveryError::Malformed(e.to_string()))?;

        let mut names = Vec::with_capacity(payload.available_tools.len());
        for tool in payload.available_tools {
            match tool {
                Value::String(name) if !name.is_empty() => names.push(name),
                other => warn!(
                    "[ToolDiscovery] Skipping non-string tool entry from {}: {}",
                    backend.id, other
                ),
            }
        }
        Ok(names)
    }

    async fn discover_backend(&self, backend: &BackendDefinition) -> BackendDiscovery {
        match self.fetch_tools(backend).await {
            Ok(tools) => {
                debug!(
                    "[ToolDiscovery] {} advertises {} tools: {:?}",
                    backend.id,
                    tools.len(),
                    tools
                );
                BackendDiscovery {
                    backend_id: backend.id.clone(),
                    url: backend.url.clone(),
                    tools,
                    error: None,
                }
            }
            Err(e) => {
                warn!(
                    "[ToolDiscovery] Could not discover tools from {} ({}): {}",
                    backend.id, backend.url, e
                );
                BackendDiscovery {
                    backend_id: backend.id.clone(),
                    url: backend.url.clone(),
                    tools: Vec::new(),
                    error: Some(e.to_string()),
                }
            }
        }
    }

    async fn run(&self, registry: &ToolRegistry) -> DiscoveryReport {
        let outcomes = join_all(self.backends.iter().map(|b| self.discover_backend(b))).await;

        let entries: Vec<ToolEntry> = self
            .backends
            .iter()
            .zip(&outcomes)
            .flat_map(|(backend, outcome)| {
                outcome
                    .tools
                    .iter()
                    .map(move |native| ToolEntry::for_backend(backend, native))
            })
            .collect();

        registry.replace_all(entries);
        let total_tools = registry.len();
        info!(
            "[ToolDiscovery] Discovered {} tools from {} backends",
            total_tools,
            self.backends.len()
        );

        DiscoveryReport {
            backends: outcomes,
            total_tools,
        }
    }

    /// Query every backend concurrently and replace the registry contents
    pub async fn discover_all(&self, registry: &ToolRegistry) -> DiscoveryReport {
        let _guard = self.refresh.lock().await;
        self.run(registry).await
    }

    /// Discover only if the registry is still empty; `None` when nothing ran
    pub async fn ensure_discovered(&self, registry: &ToolRegistry) -> Option<DiscoveryReport> {
        if !registry.is_empty() || self.backends.is_empty() {
            return None;
        }
        let _guard = self.refresh.lock().await;
        if !registry.is_empty() {
            return None;
        }
        Some(self.run(registry).await)
    }
}
