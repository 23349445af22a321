//! Public introspection endpoints

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::{extract::State, response::Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use mcpadapter_core::branding;

use super::GatewayServices;
use crate::pool::{PoolSnapshot, SessionInfo};

#[derive(Clone)]
pub struct AppState {
    pub services: Arc<GatewayServices>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: DateTime<Utc>,
    pub version: &'static str,
    pub servers: usize,
    pub tools: usize,
    pub session_pools: usize,
}

pub async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    debug!("[Gateway] Health check");
    let services = &state.services;
    Json(HealthResponse {
        status: "healthy",
        timestamp: Utc::now(),
        version: branding::VERSION,
        servers: services.backends.len(),
        tools: services.tools.len(),
        session_pools: services.pools.len(),
    })
}

/// Per-pool counters shown by `/info`
#[derive(Debug, Serialize)]
pub struct PoolStats {
    pub total_sessions: usize,
    pub available_sessions: usize,
    pub busy_sessions: usize,
    pub failed_sessions: usize,
    pub max_sessions: usize,
    pub session_timeout: u64,
}

impl From<&PoolSnapshot> for PoolStats {
    fn from(snapshot: &PoolSnapshot) -> Self {
        Self {
            total_sessions: snapshot.total_sessions,
            available_sessions: snapshot.available_sessions,
            busy_sessions: snapshot.busy_sessions,
            failed_sessions: snapshot.failed_sessions,
            max_sessions: snapshot.max_sessions,
            session_timeout: snapshot.idle_timeout_secs,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct InfoResponse {
    pub name: &'static str,
    pub version: &'static str,
    pub description: &'static str,
    pub connected_servers: Vec<String>,
    pub available_tools: Vec<String>,
    pub tool_count: usize,
    pub server_count: usize,
    pub session_pools: BTreeMap<String, PoolStats>,
    pub concurrent_sessions_enabled: bool,
}

pub async fn info(State(state): State<AppState>) -> Json<InfoResponse> {
    let services = &state.services;
    services.discovery.ensure_discovered(&services.tools).await;

    let available_tools = services.tools.names();
    let session_pools = services
        .pools
        .snapshots()
        .iter()
        .map(|s| (s.backend_url.clone(), PoolStats::from(s)))
        .collect();

    Json(InfoResponse {
        name: branding::DISPLAY_NAME,
        version: branding::VERSION,
        description: branding::DESCRIPTION,
        connected_servers: services.backend_ids(),
        tool_count: available_tools.len(),
        available_tools,
        server_count: services.backends.len(),
        session_pools,
        concurrent_sessions_enabled: true,
    })
}

/// Pool limits shown by `/sessions`
#[derive(Debug, Serialize)]
pub struct PoolConfig {
    pub max_sessions: usize,
    pub session_timeout: u64,
    pub allow_overflow: bool,
}

#[derive(Debug, Serialize)]
pub struct PoolCounters {
    pub total_sessions: usize,
    pub available_sessions: usize,
    pub busy_sessions: usize,
    pub failed_sessions: usize,
    pub initializing_sessions: usize,
    pub emergency_sessions: usize,
    pub cleanup_task_running: bool,
}

/// One pool in `/sessions`
#[derive(Debug, Serialize)]
pub struct PoolDetail {
    pub pool_config: PoolConfig,
    pub pool_stats: PoolCounters,
    pub sessions: Vec<SessionInfo>,
}

impl From<PoolSnapshot> for PoolDetail {
    fn from(snapshot: PoolSnapshot) -> Self {
        Self {
            pool_config: PoolConfig {
                max_sessions: snapshot.max_sessions,
                session_timeout: snapshot.idle_timeout_secs,
                allow_overflow: snapshot.allow_overflow,
            },
            pool_stats: PoolCounters {
                total_sessions: snapshot.total_sessions,
                available_sessions: snapshot.available_sessions,
                busy_sessions: snapshot.busy_sessions,
                failed_sessions: snapshot.failed_sessions,
                initializing_sessions: snapshot.initializing_sessions,
                emergency_sessions: snapshot.emergency_sessions,
                cleanup_task_running: snapshot.sweep_running,
            },
            sessions: snapshot.sessions,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionsResponse {
    pub timestamp: DateTime<Utc>,
    pub concurrent_sessions_enabled: bool,
    pub session_pools: BTreeMap<String, PoolDetail>,
}

pub async fn sessions(State(state): State<AppState>) -> Json<SessionsResponse> {
    let session_pools = state
        .services
        .pools
        .snapshots()
        .into_iter()
        .map(|s| (s.backend_url.clone(), PoolDetail::from(s)))
        .collect();

    Json(SessionsResponse {
        timestamp: Utc::now(),
        concurrent_sessions_enabled: true,
        session_pools,
    })
}
