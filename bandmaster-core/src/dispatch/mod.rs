// src/dispatch/mod.rs
//! Routes newly registered files into session queues and drains those
//! queues over each session's transport.
//!
//! Delivery is at-least-once: the queue head is only popped after the
//! transport reports a successful send, so a crash or failed send means
//! the same notification goes out again.
//!
//! Only sessions known at registration time are considered. A session
//! that connects later receives no backlog; it is expected to query the
//! file registry directly to catch up.

use crate::files::FileAddedListener;
use crate::models::GeneratedFile;
use crate::sessions::{FileNotification, PluginSession, SessionRegistry};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

pub struct NotificationDispatcher {
    sessions: Arc<SessionRegistry>,
}

impl NotificationDispatcher {
    pub fn new(sessions: Arc<SessionRegistry>) -> Self {
        Self { sessions }
    }

    /// Enqueue `file` on every session whose capabilities cover its
    /// track type. Sessions that already queued this file are skipped.
    pub fn dispatch(&self, file: &GeneratedFile) {
        for session in self.sessions.list_interested(file.track_type) {
            if session.enqueue(file.id.clone()) {
                debug!("queued {} for session {}", file.id, session.id);
            }
        }
    }
}

#[async_trait]
impl FileAddedListener for NotificationDispatcher {
    async fn on_file_added(&self, file: &GeneratedFile) {
        self.dispatch(file);
    }
}

/// Drive one session's queue for the lifetime of one connection.
///
/// Sends strictly in FIFO order. The loop exits when the session is
/// reactivated under a newer epoch, leaves the `Active` state, loses its
/// transport, or the bus shuts down.
pub fn spawn_drain_task(
    session: Arc<PluginSession>,
    epoch: u64,
    mut shutdown_rx: watch::Receiver<bool>,
    retry_delay: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            if session.epoch() != epoch
                || session.state() != crate::models::SessionState::Active
            {
                break;
            }
            let Some(transport) = session.transport() else {
                break;
            };

            match session.peek_pending() {
                Some(file_id) => {
                    let notification = FileNotification {
                        file_id: file_id.clone(),
                    };
                    match transport.send(notification).await {
                        Ok(()) => {
                            session.confirm_delivered(&file_id);
                            debug!("delivered {file_id} to session {}", session.id);
                        }
                        Err(e) => {
                            warn!(
                                "send to session {} failed ({e}); will retry",
                                session.id
                            );
                            tokio::select! {
                                _ = tokio::time::sleep(retry_delay) => {}
                                _ = shutdown_rx.changed() => {
                                    if *shutdown_rx.borrow() {
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                None => {
                    tokio::select! {
                        _ = session.wait_for_work() => {}
                        _ = shutdown_rx.changed() => {
                            if *shutdown_rx.borrow() {
                                break;
                            }
                        }
                    }
                }
            }
        }
        debug!("drain task for session {} (epoch {epoch}) exiting", session.id);
    })
}
