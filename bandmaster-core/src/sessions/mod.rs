// src/sessions/mod.rs
//! Plugin session tracking.
//!
//! A [`PluginSession`] survives transport loss: its notification queue
//! lives in the session, not the connection, so a reconnect within the
//! grace period resumes delivery where it left off.

pub mod registry;
pub mod transport;

pub use registry::{ConnectOutcome, SessionRegistry};
pub use transport::{FileNotification, NotificationTransport};

use crate::models::{FileId, SessionId, SessionState, TrackType};
use chrono::{DateTime, Utc};
use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

struct SessionInner {
    capabilities: HashSet<TrackType>,
    state: SessionState,
    last_heartbeat: DateTime<Utc>,
    disconnected_at: Option<DateTime<Utc>>,
    pending: VecDeque<FileId>,
    queued: HashSet<FileId>,
    transport: Option<Arc<dyn NotificationTransport>>,
}

pub struct PluginSession {
    pub id: SessionId,
    pub connected_at: DateTime<Utc>,
    /// Bumped on every (re)activation. A drain loop records the epoch it
    /// was spawned for and exits once the session moves past it.
    epoch: AtomicU64,
    inner: Mutex<SessionInner>,
    wakeup: Notify,
}

impl PluginSession {
    pub(crate) fn new(id: SessionId) -> Self {
        Self {
            id,
            connected_at: Utc::now(),
            epoch: AtomicU64::new(0),
            inner: Mutex::new(SessionInner {
                capabilities: HashSet::new(),
                state: SessionState::Connecting,
                last_heartbeat: Utc::now(),
                disconnected_at: None,
                pending: VecDeque::new(),
                queued: HashSet::new(),
                transport: None,
            }),
            wakeup: Notify::new(),
        }
    }

    /// Move the session to `Active` with a fresh transport and capability
    /// set, returning the new epoch. On resume the declared capabilities
    /// replace the old set entirely.
    pub(crate) fn activate(
        &self,
        capabilities: HashSet<TrackType>,
        transport: Arc<dyn NotificationTransport>,
    ) -> u64 {
        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        {
            let mut inner = self.inner.lock().unwrap();
            inner.capabilities = capabilities;
            inner.state = SessionState::Active;
            inner.last_heartbeat = Utc::now();
            inner.disconnected_at = None;
            inner.transport = Some(transport);
        }
        self.wakeup.notify_one();
        epoch
    }

    pub(crate) fn mark_disconnected(&self, now: DateTime<Utc>) {
        {
            let mut inner = self.inner.lock().unwrap();
            inner.state = SessionState::Disconnected;
            inner.disconnected_at = Some(now);
            inner.transport = None;
        }
        // Wake any drain loop so it notices the state change.
        self.wakeup.notify_one();
    }

    pub(crate) fn mark_heartbeat(&self) {
        self.inner.lock().unwrap().last_heartbeat = Utc::now();
    }

    /// Queue a notification for this session. Returns false if the file
    /// has already been queued here, which keeps redispatch idempotent.
    pub fn enqueue(&self, file_id: FileId) -> bool {
        let inserted = {
            let mut inner = self.inner.lock().unwrap();
            if !inner.queued.insert(file_id.clone()) {
                false
            } else {
                inner.pending.push_back(file_id);
                true
            }
        };
        if inserted {
            self.wakeup.notify_one();
        }
        inserted
    }

    /// The next undelivered notification, without removing it. The head
    /// stays put until `confirm_delivered` so a failed send retries.
    pub fn peek_pending(&self) -> Option<FileId> {
        self.inner.lock().unwrap().pending.front().cloned()
    }

    /// Pop the head of the queue, but only if it still matches `file_id`.
    /// The id leaves the queued set too, so a delivered file may be
    /// offered again later; it is only barred while it sits in the queue.
    pub fn confirm_delivered(&self, file_id: &FileId) {
        let mut inner = self.inner.lock().unwrap();
        if inner.pending.front() == Some(file_id) {
            inner.pending.pop_front();
            inner.queued.remove(file_id);
        }
    }

    pub fn pending_snapshot(&self) -> Vec<FileId> {
        self.inner.lock().unwrap().pending.iter().cloned().collect()
    }

    pub fn pending_len(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    pub fn transport(&self) -> Option<Arc<dyn NotificationTransport>> {
        self.inner.lock().unwrap().transport.clone()
    }

    pub fn state(&self) -> SessionState {
        self.inner.lock().unwrap().state
    }

    pub fn capabilities(&self) -> HashSet<TrackType> {
        self.inner.lock().unwrap().capabilities.clone()
    }

    pub fn has_capability(&self, track_type: TrackType) -> bool {
        self.inner.lock().unwrap().capabilities.contains(&track_type)
    }

    pub fn last_heartbeat(&self) -> DateTime<Utc> {
        self.inner.lock().unwrap().last_heartbeat
    }

    pub fn disconnected_at(&self) -> Option<DateTime<Utc>> {
        self.inner.lock().unwrap().disconnected_at
    }

    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Park until new work arrives or the session state changes.
    pub async fn wait_for_work(&self) {
        self.wakeup.notified().await;
    }
}
