//! Bounded session pool for one backend URL
//!
//! All bookkeeping lives behind a single mutex that is never held across an
//! await. Handshakes run outside the lock against a reserved slot, so the
//! cap (`sessions + handshakes in flight <= max_sessions`) holds under any
//! interleaving. Callers that find the pool saturated wait on a `Notify`
//! that every release and every freed slot signals.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use rmcp::{Peer, RoleClient};
use serde::Serialize;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use mcpadapter_core::PoolSettings;

use super::session::{BackendSession, SessionInfo, SessionStatus};
use super::transport;
use crate::error::PoolError;

struct PoolState {
    sessions: HashMap<String, BackendSession>,
    /// Handshakes in flight; they count against the cap
    initializing: usize,
}

enum Slot {
    Claimed(SessionLease),
    Reserved(Reservation),
    Saturated,
    Closed,
}

/// A reserved slot for a session being created; frees itself on drop
struct Reservation {
    pool: Arc<SessionPool>,
}

impl Drop for Reservation {
    fn drop(&mut self) {
        {
            let mut state = self.pool.state.lock();
            state.initializing = state.initializing.saturating_sub(1);
        }
        self.pool.released.notify_waiters();
    }
}

/// Outcome of inserting a freshly initialized session
enum Admission {
    Admitted(SessionLease),
    Rejected(BackendSession, PoolError),
}

pub struct SessionPool {
    backend_url: String,
    settings: PoolSettings,
    state: Mutex<PoolState>,
    released: Notify,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl SessionPool {
    pub fn new(backend_url: &str, settings: PoolSettings) -> Self {
        let backend_url = backend_url.trim_end_matches('/').to_string();
        Self {
            backend_url,
            settings,
            state: Mutex::new(PoolState {
                sessions: HashMap::new(),
                initializing: 0,
            }),
            released: Notify::new(),
            sweeper: Mutex::new(None),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn backend_url(&self) -> &str {
        &self.backend_url
    }

    pub fn session_count(&self) -> usize {
        self.state.lock().sessions.len()
    }

    pub fn status_of(&self, session_id: &str) -> Option<SessionStatus> {
        self.state
            .lock()
            .sessions
            .get(session_id)
            .map(BackendSession::status)
    }

    /// Exclusive use of one initialized session
    ///
    /// Prefers an available session, then a new one while under the cap, then
    /// waits for a release. When the wait times out an emergency session is
    /// created beyond the cap if overflow is allowed.
    pub async fn acquire(self: &Arc<Self>, request_id: &str) -> Result<SessionLease, PoolError> {
        let slot = self.claim_or_reserve(request_id);
        if let Some(outcome) = self.settle(slot, request_id).await {
            return outcome;
        }

        let wait_timeout = self.settings.wait_timeout();
        warn!(
            "[SessionPool] All {} sessions for {} busy, request {} waiting up to {:?}",
            self.settings.max_sessions, self.backend_url, request_id, wait_timeout
        );

        let deadline = Instant::now() + wait_timeout;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not lost
            notified.as_mut().enable();

            let slot = self.claim_or_reserve(request_id);
            if let Some(outcome) = self.settle(slot, request_id).await {
                return outcome;
            }

            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                break;
            }
        }

        if !self.settings.allow_overflow {
            warn!(
                "[SessionPool] Request {} gave up on {} after {:?}",
                request_id, self.backend_url, wait_timeout
            );
            return Err(PoolError::Exhausted {
                url: self.backend_url.clone(),
                waited: wait_timeout,
            });
        }

        warn!(
            "[SessionPool] Wait timed out for {}, creating emergency session for request {}",
            self.backend_url, request_id
        );
        let reservation = self.reserve_overflow();
        self.open_session(reservation, request_id, true).await
    }

    /// `None` when the pool is saturated and the caller has to wait
    async fn settle(
        self: &Arc<Self>,
        slot: Slot,
        request_id: &str,
    ) -> Option<Result<SessionLease, PoolError>> {
        match slot {
            Slot::Claimed(lease) => {
                debug!(
                    "[SessionPool] Reusing session {} for request {}",
                    lease.session_id(),
                    request_id
                );
                Some(Ok(lease))
            }
            Slot::Reserved(reservation) => {
                Some(self.open_session(reservation, request_id, false).await)
            }
            Slot::Closed => Some(Err(PoolError::ShutDown(self.backend_url.clone()))),
            Slot::Saturated => None,
        }
    }

    fn claim_or_reserve(self: &Arc<Self>, request_id: &str) -> Slot {
        if self.shutdown.is_cancelled() {
            return Slot::Closed;
        }

        let mut state = self.state.lock();
        if let Some(session) = state
            .sessions
            .values_mut()
            .find(|s| s.status() == SessionStatus::Available)
        {
            session.mark_busy(request_id);
            return Slot::Claimed(SessionLease::new(Arc::clone(self), session, request_id));
        }

        if state.sessions.len() + state.initializing < self.settings.max_sessions {
            state.initializing += 1;
            return Slot::Reserved(Reservation {
                pool: Arc::clone(self),
            });
        }

        Slot::Saturated
    }

    fn reserve_overflow(self: &Arc<Self>) -> Reservation {
        self.state.lock().initializing += 1;
        Reservation {
            pool: Arc::clone(self),
        }
    }

    fn local_session_id(&self) -> String {
        let host: String = self
            .backend_url
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
            .collect();
        format!("gateway-{}-{}", host, Uuid::new_v4().simple())
    }

    /// Handshake outside the lock, then admit the session as busy
    async fn open_session(
        self: &Arc<Self>,
        reservation: Reservation,
        request_id: &str,
        emergency: bool,
    ) -> Result<SessionLease, PoolError> {
        let timeout = self.settings.handshake_timeout();
        let connection = match transport::connect(&self.backend_url, timeout).await {
            Ok(connection) => connection,
            Err(reason) => {
                warn!(
                    "[SessionPool] Handshake with {} failed: {}",
                    self.backend_url, reason
                );
                return Err(PoolError::Handshake {
                    url: self.backend_url.clone(),
                    reason,
                });
            }
        };

        let local_id = self.local_session_id();
        let mut session = BackendSession::initializing(
            local_id.clone(),
            &self.backend_url,
            connection.client,
            emergency,
        );
        match connection.server_session_id {
            Some(server_id) => session.adopt_server_id(server_id),
            None => debug!(
                "[SessionPool] {} issued no session id, using {}",
                self.backend_url, local_id
            ),
        }

        let admission = self.admit(session, request_id);
        drop(reservation);

        match admission {
            Admission::Admitted(lease) => {
                info!(
                    "[SessionPool] Created {}session {} for {} (request {})",
                    if emergency { "emergency " } else { "" },
                    lease.session_id(),
                    self.backend_url,
                    request_id
                );
                self.ensure_sweeper();
                Ok(lease)
            }
            Admission::Rejected(session, err) => {
                session.close().await;
                Err(err)
            }
        }
    }

    fn admit(self: &Arc<Self>, mut session: BackendSession, request_id: &str) -> Admission {
        let mut state = self.state.lock();

        if self.shutdown.is_cancelled() {
            return Admission::Rejected(session, PoolError::ShutDown(self.backend_url.clone()));
        }
        if state.sessions.contains_key(session.id()) {
            let reason = format!("backend reissued live session id {}", session.id());
            return Admission::Rejected(
                session,
                PoolError::Handshake {
                    url: self.backend_url.clone(),
                    reason,
                },
            );
        }

        session.mark_busy(request_id);
        let lease = SessionLease::new(Arc::clone(self), &session, request_id);
        state.sessions.insert(session.id().to_string(), session);
        Admission::Admitted(lease)
    }

    /// Return a busy session to the available set; unknown ids are ignored
    pub fn release(&self, session_id: &str) {
        let released = {
            let mut state = self.state.lock();
            state
                .sessions
                .get_mut(session_id)
                .map(BackendSession::mark_available)
                .unwrap_or(false)
        };

        if released {
            debug!("[SessionPool] Released session {}", session_id);
            self.released.notify_waiters();
        } else {
            debug!(
                "[SessionPool] Ignoring release of unknown or idle session {}",
                session_id
            );
        }
    }

    fn ensure_sweeper(self: &Arc<Self>) {
        let mut sweeper = self.sweeper.lock();
        if self.shutdown.is_cancelled() || sweeper.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        debug!(
            "[SessionPool] Starting expiry sweep for {} every {:?}",
            self.backend_url,
            self.settings.sweep_interval()
        );
        *sweeper = Some(tokio::spawn(sweep_loop(
            Arc::downgrade(self),
            self.shutdown.clone(),
            self.settings.sweep_interval(),
        )));
    }

    /// Remove failed sessions and available sessions idle past the timeout
    pub async fn sweep_expired(&self) -> usize {
        let idle_timeout = self.settings.idle_timeout();
        let expired: Vec<BackendSession> = {
            let mut state = self.state.lock();
            let ids: Vec<String> = state
                .sessions
                .iter()
                .filter(|(_, s)| {
                    s.status() == SessionStatus::Failed || s.is_expired(idle_timeout)
                })
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter()
                .filter_map(|id| state.sessions.remove(id))
                .collect()
        };

        let removed = expired.len();
        if removed > 0 {
            for session in &expired {
                debug!(
                    "[SessionPool] Expiring session {} ({:?}, idle {:?})",
                    session.id(),
                    session.status(),
                    session.idle_for()
                );
            }
            join_all(expired.into_iter().map(BackendSession::close)).await;
            self.released.notify_waiters();
        }
        removed
    }

    /// Stop the sweep and terminate every session; later acquires fail
    pub async fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }

        let sessions: Vec<BackendSession> = {
            let mut state = self.state.lock();
            state.sessions.drain().map(|(_, s)| s).collect()
        };
        self.released.notify_waiters();

        info!(
            "[SessionPool] Shutting down pool for {} ({} sessions)",
            self.backend_url,
            sessions.len()
        );
        join_all(sessions.into_iter().map(BackendSession::close)).await;
    }

    pub fn snapshot(&self) -> PoolSnapshot {
        let sweep_running = self
            .sweeper
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished());

        let state = self.state.lock();
        let count = |status: SessionStatus| {
            state
                .sessions
                .values()
                .filter(|s| s.status() == status)
                .count()
        };

        let mut sessions: Vec<SessionInfo> =
            state.sessions.values().map(BackendSession::info).collect();
        sessions.sort_by(|a, b| a.created_at.cmp(&b.created_at));

        PoolSnapshot {
            backend_url: self.backend_url.clone(),
            max_sessions: self.settings.max_sessions,
            idle_timeout_secs: self.settings.idle_timeout_secs,
            allow_overflow: self.settings.allow_overflow,
            total_sessions: state.sessions.len(),
            available_sessions: count(SessionStatus::Available),
            busy_sessions: count(SessionStatus::Busy),
            failed_sessions: count(SessionStatus::Failed),
            initializing_sessions: state.initializing,
            emergency_sessions: state.sessions.values().filter(|s| s.is_emergency()).count(),
            sweep_running,
            sessions,
        }
    }

    #[cfg(test)]
    pub(crate) async fn seed_available(&self, count: usize) -> Vec<String> {
        let mut ids = Vec::with_capacity(count);
        for _ in 0..count {
            let id = self.local_session_id();
            let mut session = BackendSession::initializing(
                id.clone(),
                &self.backend_url,
                transport::testing::in_memory_client().await,
                false,
            );
            session.mark_busy("seed");
            session.mark_available();
            self.state.lock().sessions.insert(id.clone(), session);
            ids.push(id);
        }
        ids
    }

    #[cfg(test)]
    pub(crate) fn fail_session(&self, session_id: &str) {
        if let Some(session) = self.state.lock().sessions.get_mut(session_id) {
            session.mark_failed();
        }
    }
}

impl Drop for SessionPool {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

async fn sweep_loop(pool: Weak<SessionPool>, shutdown: CancellationToken, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let Some(pool) = pool.upgrade() else {
            break;
        };
        let removed = pool.sweep_expired().await;
        if removed > 0 {
            info!(
                "[SessionPool] Swept {} expired sessions from {}",
                removed,
                pool.backend_url()
            );
        }
    }

    debug!("[SessionPool] Expiry sweep stopped");
}

/// Exclusive hold on a busy session; returned to the pool on drop
pub struct SessionLease {
    pool: Arc<SessionPool>,
    session_id: String,
    peer: Peer<RoleClient>,
    request_id: String,
    emergency: bool,
    released: bool,
}

impl SessionLease {
    fn new(pool: Arc<SessionPool>, session: &BackendSession, request_id: &str) -> Self {
        Self {
            pool,
            session_id: session.id().to_string(),
            peer: session.peer().clone(),
            request_id: request_id.to_string(),
            emergency: session.is_emergency(),
            released: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn backend_url(&self) -> &str {
        self.pool.backend_url()
    }

    pub fn is_emergency(&self) -> bool {
        self.emergency
    }

    pub(crate) fn peer(&self) -> &Peer<RoleClient> {
        &self.peer
    }

    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if !self.released {
            self.released = true;
            self.pool.release(&self.session_id);
        }
    }
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl fmt::Debug for SessionLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionLease")
            .field("session_id", &self.session_id)
            .field("backend_url", &self.pool.backend_url())
            .field("request_id", &self.request_id)
            .field("emergency", &self.emergency)
            .finish()
    }
}

/// Serializable pool statistics
#[derive(Debug, Clone, Serialize)]
pub struct PoolSnapshot {
    pub backend_url: String,
    pub max_sessions: usize,
    pub idle_timeout_secs: u64,
    pub allow_overflow: bool,
    pub total_sessions: usize,
    pub available_sessions: usize,
    pub busy_sessions: usize,
    pub failed_sessions: usize,
    pub initializing_sessions: usize,
    pub emergency_sessions: usize,
    pub sweep_running: bool,
    pub sessions: Vec<SessionInfo>,
}
