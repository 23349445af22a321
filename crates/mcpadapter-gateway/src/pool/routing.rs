//! Backend call proxy - resolve, acquire, call, release

use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::envelope::BackendReply;
use super::features::ToolRegistry;
use super::registry::PoolRegistry;
use super::transport;
use crate::error::ProxyError;

/// Routes external tool calls to pooled backend sessions
///
/// The lease taken for a call is released on every exit path, including
/// cancellation of the calling future.
pub struct BackendCallProxy {
    tools: Arc<ToolRegistry>,
    pools: Arc<PoolRegistry>,
    call_timeout: Duration,
}

impl BackendCallProxy {
    pub fn new(tools: Arc<ToolRegistry>, pools: Arc<PoolRegistry>) -> Self {
        let call_timeout = pools.settings().call_timeout();
        Self {
            tools,
            pools,
            call_timeout,
        }
    }

    pub fn with_call_timeout(mut self, timeout: Duration) -> Self {
        self.call_timeout = timeout;
        self
    }

    /// Call a tool by its external (prefixed) name
    pub async fn call_tool(
        &self,
        external_name: &str,
        arguments: Value,
    ) -> Result<BackendReply, ProxyError> {
        let entry = self.tools.resolve(external_name)?;
        debug!(
            "[Proxy] {} → {} on {}",
            external_name, entry.native_name, entry.backend_url
        );
        self.call_backend_tool(&entry.backend_url, &entry.native_name, arguments)
            .await
    }

    /// Call a native tool on a backend through its session pool
    pub async fn call_backend_tool(
        &self,
        backend_url: &str,
        native_name: &str,
        arguments: Value,
    ) -> Result<BackendReply, ProxyError> {
        let request_id = format!("req-{}", Uuid::new_v4().simple());
        let pool = self.pools.get_pool(backend_url);

        let lease = pool.acquire(&request_id).await?;
        info!(
            "[Proxy] Request {} calling {} via session {}",
            request_id,
            native_name,
            lease.session_id()
        );

        let outcome = transport::call_tool(&lease, native_name, arguments, self.call_timeout).await;
        lease.release();

        if let Err(e) = &outcome {
            warn!(
                "[Proxy] Request {} to {} failed: {}",
                request_id, backend_url, e
            );
        }
        outcome
    }
}
