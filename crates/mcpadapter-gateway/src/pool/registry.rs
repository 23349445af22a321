//! One session pool per backend URL

use std::sync::Arc;

use dashmap::DashMap;
use futures::future::join_all;
use tracing::info;

use mcpadapter_core::PoolSettings;

use super::session_pool::{PoolSnapshot, SessionPool};

/// Lazily created pools keyed by normalized backend URL
///
/// `get_pool` is safe to race: the shard lock around `entry` guarantees the
/// pool for a URL is constructed exactly once.
pub struct PoolRegistry {
    pools: DashMap<String, Arc<SessionPool>>,
    settings: PoolSettings,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            pools: DashMap::new(),
            settings,
        }
    }

    pub fn settings(&self) -> &PoolSettings {
        &self.settings
    }

    pub fn get_pool(&self, backend_url: &str) -> Arc<SessionPool> {
        let key = backend_url.trim_end_matches('/');
        if let Some(pool) = self.pools.get(key) {
            return Arc::clone(pool.value());
        }

        let pool = self
            .pools
            .entry(key.to_string())
            .or_insert_with(|| {
                info!(
                    "[PoolRegistry] Creating session pool for {} (max {} sessions)",
                    key, self.settings.max_sessions
                );
                Arc::new(SessionPool::new(key, self.settings.clone()))
            });
        Arc::clone(pool.value())
    }

    /// Existing pool only; never creates one
    pub fn get(&self, backend_url: &str) -> Option<Arc<SessionPool>> {
        self.pools
            .get(backend_url.trim_end_matches('/'))
            .map(|p| Arc::clone(p.value()))
    }

    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }

    /// Snapshots ordered by backend URL
    pub fn snapshots(&self) -> Vec<PoolSnapshot> {
        let mut snapshots: Vec<PoolSnapshot> =
            self.pools.iter().map(|p| p.value().snapshot()).collect();
        snapshots.sort_by(|a, b| a.backend_url.cmp(&b.backend_url));
        snapshots
    }

    pub async fn shutdown_all(&self) {
        let pools: Vec<Arc<SessionPool>> =
            self.pools.iter().map(|p| Arc::clone(p.value())).collect();
        info!("[PoolRegistry] Shutting down {} session pools", pools.len());
        join_all(pools.iter().map(|pool| pool.shutdown())).await;
    }
}
