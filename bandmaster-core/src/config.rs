// src/config.rs
use std::path::PathBuf;
use std::time::Duration;

/// Tunables for the orchestrator. Defaults match what the server binary
/// ships with; embedders can override any field.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Per-track ceiling on a single generator call.
    pub generator_timeout: Duration,
    /// How long a disconnected session keeps its queue before expiry.
    pub session_grace_period: Duration,
    /// Active sessions silent longer than this get marked disconnected.
    /// `None` disables heartbeat policing.
    pub heartbeat_timeout: Option<Duration>,
    /// Age past which generated files are swept from disk and registry.
    pub file_retention: Duration,
    pub cleanup_interval: Duration,
    pub expiry_interval: Duration,
    /// Backoff between redelivery attempts after a failed notification send.
    pub drain_retry_delay: Duration,
    pub files_dir: PathBuf,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            generator_timeout: Duration::from_secs(30),
            session_grace_period: Duration::from_secs(120),
            heartbeat_timeout: Some(Duration::from_secs(60)),
            file_retention: Duration::from_secs(24 * 3600),
            cleanup_interval: Duration::from_secs(3600),
            expiry_interval: Duration::from_secs(10),
            drain_retry_delay: Duration::from_millis(500),
            files_dir: PathBuf::from("generated_files"),
        }
    }
}
