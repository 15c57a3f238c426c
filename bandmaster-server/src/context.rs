// src/context.rs
//! Shared server state: wires the registries, coordinator, dispatcher,
//! and event bus together.

use bandmaster_core::dispatch::NotificationDispatcher;
use bandmaster_core::eventbus::EventBus;
use bandmaster_core::files::FileRegistry;
use bandmaster_core::generation::{GenerationCoordinator, TrackGenerator};
use bandmaster_core::sessions::SessionRegistry;
use bandmaster_core::{Error, OrchestratorConfig};
use std::sync::Arc;
use std::time::Instant;

pub struct ServerContext {
    pub config: OrchestratorConfig,
    pub event_bus: Arc<EventBus>,
    pub files: Arc<FileRegistry>,
    pub sessions: Arc<SessionRegistry>,
    pub coordinator: GenerationCoordinator,
    pub backend_configured: bool,
    pub started_at: Instant,
}

impl ServerContext {
    pub fn new(
        config: OrchestratorConfig,
        generator: Arc<dyn TrackGenerator>,
        backend_configured: bool,
    ) -> Result<Arc<Self>, Error> {
        std::fs::create_dir_all(&config.files_dir)?;

        let event_bus = Arc::new(EventBus::new());
        let sessions = Arc::new(SessionRegistry::new(config.session_grace_period));

        let mut files = FileRegistry::new();
        files.set_event_bus(event_bus.clone());
        let files = Arc::new(files);
        files.add_listener(Arc::new(NotificationDispatcher::new(sessions.clone())));

        let mut coordinator = GenerationCoordinator::new(
            files.clone(),
            generator,
            config.files_dir.clone(),
            config.generator_timeout,
        );
        coordinator.set_event_bus(event_bus.clone());

        Ok(Arc::new(Self {
            config,
            event_bus,
            files,
            sessions,
            coordinator,
            backend_configured,
            started_at: Instant::now(),
        }))
    }
}
