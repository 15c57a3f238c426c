// src/sessions/registry.rs
//! Tracks every known plugin session and enforces the connect rules:
//! one live connection per id, resumption within the grace period, and
//! expiry of sessions that stay disconnected too long.

use crate::models::{SessionId, SessionState, TrackType};
use crate::sessions::{NotificationTransport, PluginSession};
use crate::Error;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// What `connect` produced: the session handle, whether it resumed an
/// earlier incarnation, and the epoch its drain loop should bind to.
pub struct ConnectOutcome {
    pub session: Arc<PluginSession>,
    pub resumed: bool,
    pub epoch: u64,
}

impl std::fmt::Debug for ConnectOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectOutcome")
            .field("session", &self.session.id)
            .field("resumed", &self.resumed)
            .field("epoch", &self.epoch)
            .finish()
    }
}

pub struct SessionRegistry {
    sessions: DashMap<SessionId, Arc<PluginSession>>,
    grace_period: Duration,
}

impl SessionRegistry {
    pub fn new(grace_period: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            grace_period,
        }
    }

    /// Admit a connection under `id`. A second connection while the first
    /// is live is rejected; a reconnect within the grace period resumes
    /// the old session and its queue; past the grace period the old state
    /// is discarded and a fresh session takes its place.
    pub fn connect(
        &self,
        id: SessionId,
        capabilities: HashSet<TrackType>,
        transport: Arc<dyn NotificationTransport>,
    ) -> Result<ConnectOutcome, Error> {
        match self.sessions.entry(id.clone()) {
            Entry::Occupied(mut occ) => {
                let existing = occ.get().clone();
                match existing.state() {
                    SessionState::Active | SessionState::Connecting => {
                        Err(Error::DuplicateSession(id.0))
                    }
                    SessionState::Disconnected if self.within_grace(&existing) => {
                        let epoch = existing.activate(capabilities, transport);
                        info!("session {id} resumed with {} pending", existing.pending_len());
                        Ok(ConnectOutcome {
                            session: existing,
                            resumed: true,
                            epoch,
                        })
                    }
                    SessionState::Disconnected => {
                        let dropped = existing.pending_len();
                        if dropped > 0 {
                            warn!("session {id} grace expired; dropping {dropped} notifications");
                        }
                        let fresh = Arc::new(PluginSession::new(id.clone()));
                        let epoch = fresh.activate(capabilities, transport);
                        occ.insert(fresh.clone());
                        Ok(ConnectOutcome {
                            session: fresh,
                            resumed: false,
                            epoch,
                        })
                    }
                }
            }
            Entry::Vacant(vac) => {
                let session = Arc::new(PluginSession::new(id.clone()));
                let epoch = session.activate(capabilities, transport);
                vac.insert(session.clone());
                info!("session {id} connected");
                Ok(ConnectOutcome {
                    session,
                    resumed: false,
                    epoch,
                })
            }
        }
    }

    pub fn heartbeat(&self, id: &SessionId) -> Result<(), Error> {
        match self.sessions.get(id) {
            Some(session) => {
                session.mark_heartbeat();
                Ok(())
            }
            None => Err(Error::UnknownSession(id.0.clone())),
        }
    }

    /// Mark a session disconnected, starting its grace clock. The queue
    /// is kept for a possible resume.
    pub fn disconnect(&self, id: &SessionId) {
        if let Some(session) = self.sessions.get(id) {
            session.mark_disconnected(Utc::now());
            info!("session {id} disconnected");
        }
    }

    /// Drop sessions that have sat disconnected past the grace period.
    /// Returns how many were removed.
    pub fn expire(&self) -> usize {
        let expired: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                entry.value().state() == SessionState::Disconnected
                    && !self.within_grace(entry.value())
            })
            .map(|entry| entry.key().clone())
            .collect();

        let mut removed = 0;
        for id in expired {
            if let Some((_, session)) = self.sessions.remove(&id) {
                let dropped = session.pending_len();
                info!("session {id} expired; {dropped} queued notifications dropped");
                removed += 1;
            }
        }
        removed
    }

    /// Disconnect active sessions whose last heartbeat is older than
    /// `timeout`. They enter the normal grace window.
    pub fn disconnect_stale(&self, timeout: Duration) -> usize {
        let now = Utc::now();
        let stale: Vec<SessionId> = self
            .sessions
            .iter()
            .filter(|entry| {
                let s = entry.value();
                s.state() == SessionState::Active
                    && (now - s.last_heartbeat())
                        .to_std()
                        .map_or(false, |age| age > timeout)
            })
            .map(|entry| entry.key().clone())
            .collect();

        for id in &stale {
            warn!("session {id} missed heartbeats; marking disconnected");
            self.disconnect(id);
        }
        stale.len()
    }

    /// Sessions that should be offered a file of the given track type:
    /// capability must match and the session must be active or still
    /// within its grace window. Connecting sessions are skipped.
    pub fn list_interested(&self, track_type: TrackType) -> Vec<Arc<PluginSession>> {
        self.sessions
            .iter()
            .filter(|entry| {
                let s = entry.value();
                s.has_capability(track_type)
                    && match s.state() {
                        SessionState::Active => true,
                        SessionState::Disconnected => self.within_grace(s),
                        SessionState::Connecting => false,
                    }
            })
            .map(|entry| entry.value().clone())
            .collect()
    }

    pub fn get(&self, id: &SessionId) -> Option<Arc<PluginSession>> {
        self.sessions.get(id).map(|entry| entry.value().clone())
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    pub fn active_count(&self) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state() == SessionState::Active)
            .count()
    }

    fn within_grace(&self, session: &PluginSession) -> bool {
        session.disconnected_at().map_or(true, |t| {
            (Utc::now() - t)
                .to_std()
                .map_or(true, |age| age <= self.grace_period)
        })
    }
}
