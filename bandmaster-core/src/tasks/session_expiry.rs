// src/tasks/session_expiry.rs
//! Periodic sweep over the session registry: expire sessions whose
//! grace period ran out and disconnect active ones that stopped
//! heartbeating.

use crate::sessions::SessionRegistry;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

pub fn spawn_session_expiry_task(
    sessions: Arc<SessionRegistry>,
    interval: Duration,
    heartbeat_timeout: Option<Duration>,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(timeout) = heartbeat_timeout {
                        let stale = sessions.disconnect_stale(timeout);
                        if stale > 0 {
                            info!("disconnected {stale} stale sessions");
                        }
                    }
                    let expired = sessions.expire();
                    if expired > 0 {
                        info!("expired {expired} sessions");
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("session expiry task exiting");
    })
}
