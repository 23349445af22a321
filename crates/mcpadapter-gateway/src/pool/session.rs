//! A single initialized conversation with a backend

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::time::Instant;

use rmcp::{Peer, RoleClient};

use super::transport::{self, BackendClient};

/// Session lifecycle
///
/// `Initializing → Busy ⇄ Available`, and any state may move to `Failed`.
/// A fresh session is always handed to the request that opened it.
/// A failed session never recovers; the sweep removes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Initializing,
    Available,
    Busy,
    Failed,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Initializing, Busy)
                | (Available, Busy)
                | (Busy, Available)
                | (Initializing | Available | Busy, Failed)
        )
    }
}

/// Backend session owned by a `SessionPool`
pub struct BackendSession {
    id: String,
    backend_url: String,
    client: BackendClient,
    status: SessionStatus,
    emergency: bool,
    created_at: DateTime<Utc>,
    created: Instant,
    last_used_at: DateTime<Utc>,
    last_used: Instant,
    current_request_id: Option<String>,
}

impl BackendSession {
    pub(crate) fn initializing(
        local_id: String,
        backend_url: &str,
        client: BackendClient,
        emergency: bool,
    ) -> Self {
        let now = Utc::now();
        let instant = Instant::now();
        Self {
            id: local_id,
            backend_url: backend_url.to_string(),
            client,
            status: SessionStatus::Initializing,
            emergency,
            created_at: now,
            created: instant,
            last_used_at: now,
            last_used: instant,
            current_request_id: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn status(&self) -> SessionStatus {
        self.status
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub fn current_request_id(&self) -> Option<&str> {
        self.current_request_id.as_deref()
    }

    pub(crate) fn peer(&self) -> &Peer<RoleClient> {
        self.client.peer()
    }

    /// Key the session by the id the backend issued; rmcp echoes it on every request
    pub(crate) fn adopt_server_id(&mut self, id: String) {
        self.id = id;
    }

    pub fn idle_for(&self) -> Duration {
        self.last_used.elapsed()
    }

    pub fn age(&self) -> Duration {
        self.created.elapsed()
    }

    fn transition(&mut self, next: SessionStatus) -> bool {
        if !self.status.can_transition_to(next) {
            return false;
        }
        self.status = next;
        true
    }

    fn touch(&mut self) {
        self.last_used = Instant::now();
        self.last_used_at = Utc::now();
    }

    pub(crate) fn mark_busy(&mut self, request_id: &str) -> bool {
        if !self.transition(SessionStatus::Busy) {
            return false;
        }
        self.current_request_id = Some(request_id.to_string());
        self.touch();
        true
    }

    pub(crate) fn mark_available(&mut self) -> bool {
        if !self.transition(SessionStatus::Available) {
            return false;
        }
        self.current_request_id = None;
        self.touch();
        true
    }

    pub(crate) fn mark_failed(&mut self) {
        self.transition(SessionStatus::Failed);
        self.current_request_id = None;
    }

    /// Available and unused for longer than `idle_timeout`
    pub fn is_expired(&self, idle_timeout: Duration) -> bool {
        self.status == SessionStatus::Available && self.idle_for() > idle_timeout
    }

    /// Stop the client; a backend-issued session is deleted on the way out
    pub(crate) async fn close(self) {
        transport::terminate(self.client, &self.id).await;
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            session_id: self.id.clone(),
            status: self.status,
            emergency: self.emergency,
            created_at: self.created_at,
            last_used: self.last_used_at,
            age_seconds: self.age().as_secs_f64(),
            idle_seconds: self.idle_for().as_secs_f64(),
            current_request_id: self.current_request_id.clone(),
        }
    }
}

impl fmt::Debug for BackendSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackendSession")
            .field("id", &self.id)
            .field("backend_url", &self.backend_url)
            .field("status", &self.status)
            .field("emergency", &self.emergency)
            .finish()
    }
}

/// Serializable view of a session
#[derive(Debug, Clone, Serialize)]
pub struct SessionInfo {
    pub session_id: String,
    pub status: SessionStatus,
    pub emergency: bool,
    pub created_at: DateTime<Utc>,
    pub last_used: DateTime<Utc>,
    pub age_seconds: f64,
    pub idle_seconds: f64,
    pub current_request_id: Option<String>,
}
