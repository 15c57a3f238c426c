// src/eventbus/mod.rs
//! A simple multi-subscriber event bus with shutdown support.
//!
//! Events are broadcast to every subscriber over bounded channels, so a
//! slow subscriber applies backpressure rather than losing events.

pub mod meta_logger;

use crate::models::{FailureReason, FileId, GeneratedFile, RequestId, SessionId};
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, watch};

/// Everything the orchestrator announces on the bus.
#[derive(Debug, Clone)]
pub enum OrchestratorEvent {
    FileAdded {
        file: GeneratedFile,
    },
    FileRemoved {
        id: FileId,
    },
    RequestCompleted {
        id: RequestId,
        files: Vec<FileId>,
        warnings: Vec<String>,
    },
    RequestFailed {
        id: RequestId,
        reason: FailureReason,
    },
    SessionConnected {
        id: SessionId,
        resumed: bool,
    },
    SessionDisconnected {
        id: SessionId,
    },
    /// Periodic heartbeat published by the server main loop.
    Tick,
}

impl OrchestratorEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            OrchestratorEvent::FileAdded { .. } => "file_added",
            OrchestratorEvent::FileRemoved { .. } => "file_removed",
            OrchestratorEvent::RequestCompleted { .. } => "request_completed",
            OrchestratorEvent::RequestFailed { .. } => "request_failed",
            OrchestratorEvent::SessionConnected { .. } => "session_connected",
            OrchestratorEvent::SessionDisconnected { .. } => "session_disconnected",
            OrchestratorEvent::Tick => "tick",
        }
    }
}

const DEFAULT_BUFFER_SIZE: usize = 1024;

#[derive(Clone)]
pub struct EventBus {
    subscribers: Arc<Mutex<Vec<mpsc::Sender<OrchestratorEvent>>>>,
    shutdown_tx: watch::Sender<bool>,
    /// Clone this to watch for shutdown in spawned tasks.
    pub shutdown_rx: watch::Receiver<bool>,
}

impl EventBus {
    pub fn new() -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        Self {
            subscribers: Arc::new(Mutex::new(Vec::new())),
            shutdown_tx,
            shutdown_rx,
        }
    }

    /// Register a new subscriber and return its receiving end.
    pub fn subscribe(&self, buffer_size: Option<usize>) -> mpsc::Receiver<OrchestratorEvent> {
        let size = buffer_size.unwrap_or(DEFAULT_BUFFER_SIZE);
        let (tx, rx) = mpsc::channel(size);
        self.subscribers.lock().unwrap().push(tx);
        rx
    }

    /// Broadcast an event to all subscribers. Waits if a subscriber's
    /// buffer is full; subscribers whose receiver is gone are dropped
    /// from the list.
    pub async fn publish(&self, event: OrchestratorEvent) {
        if self.is_shutdown() {
            return;
        }
        let senders: Vec<_> = self.subscribers.lock().unwrap().clone();
        let mut any_closed = false;
        for tx in senders {
            if tx.send(event.clone()).await.is_err() {
                any_closed = true;
            }
        }
        if any_closed {
            self.subscribers.lock().unwrap().retain(|tx| !tx.is_closed());
        }
    }

    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(true);
    }

    pub fn is_shutdown(&self) -> bool {
        *self.shutdown_rx.borrow()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::SessionId;

    #[tokio::test]
    async fn subscribers_receive_events() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe(None);
        let mut rx2 = bus.subscribe(None);

        bus.publish(OrchestratorEvent::SessionConnected {
            id: SessionId("plug-1".into()),
            resumed: false,
        })
        .await;

        for rx in [&mut rx1, &mut rx2] {
            match rx.recv().await {
                Some(OrchestratorEvent::SessionConnected { id, resumed }) => {
                    assert_eq!(id.0, "plug-1");
                    assert!(!resumed);
                }
                other => panic!("unexpected event: {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn publish_applies_backpressure_without_dropping() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe(Some(1));

        let bus2 = bus.clone();
        let publisher = tokio::spawn(async move {
            for _ in 0..3 {
                bus2.publish(OrchestratorEvent::Tick).await;
            }
        });

        let mut seen = 0;
        while seen < 3 {
            assert!(matches!(rx.recv().await, Some(OrchestratorEvent::Tick)));
            seen += 1;
        }
        publisher.await.unwrap();
    }

    #[tokio::test]
    async fn dropped_subscribers_are_pruned_on_publish() {
        let bus = EventBus::new();
        let rx = bus.subscribe(None);
        drop(rx);
        bus.publish(OrchestratorEvent::Tick).await;
        assert!(bus.subscribers.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn shutdown_flag_is_sticky() {
        let bus = EventBus::new();
        assert!(!bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());
        bus.shutdown();
        assert!(bus.is_shutdown());
    }
}
