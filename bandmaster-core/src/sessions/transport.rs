// src/sessions/transport.rs
use crate::models::FileId;
use crate::Error;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// The payload pushed to a plugin when a file it cares about is ready.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileNotification {
    pub file_id: FileId,
}

/// Outbound channel to one connected plugin. An `Ok` return means the
/// notification was handed to the wire; delivery is confirmed only then.
#[async_trait]
pub trait NotificationTransport: Send + Sync {
    async fn send(&self, notification: FileNotification) -> Result<(), Error>;
}
