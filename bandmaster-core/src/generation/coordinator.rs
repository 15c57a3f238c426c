// src/generation/coordinator.rs
//! Accepts generation requests, fans them out per track, and records
//! the outcome. Any track producing a file makes the request a success;
//! per-track problems surface as warnings on the completed state.

use crate::eventbus::{EventBus, OrchestratorEvent};
use crate::files::FileRegistry;
use crate::generation::TrackGenerator;
use crate::models::{
    FailureReason, FileId, GeneratedFile, GenerationParams, GenerationRequest, RequestId,
    RequestState, TrackType,
};
use crate::Error;
use chrono::Utc;
use dashmap::DashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

#[derive(Clone)]
pub struct GenerationCoordinator {
    requests: Arc<DashMap<RequestId, GenerationRequest>>,
    files: Arc<FileRegistry>,
    generator: Arc<dyn TrackGenerator>,
    output_dir: PathBuf,
    generator_timeout: Duration,
    event_bus: Option<Arc<EventBus>>,
    file_seq: Arc<AtomicU64>,
}

impl GenerationCoordinator {
    pub fn new(
        files: Arc<FileRegistry>,
        generator: Arc<dyn TrackGenerator>,
        output_dir: PathBuf,
        generator_timeout: Duration,
    ) -> Self {
        Self {
            requests: Arc::new(DashMap::new()),
            files,
            generator,
            output_dir,
            generator_timeout,
            event_bus: None,
            file_seq: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn set_event_bus(&mut self, event_bus: Arc<EventBus>) {
        self.event_bus = Some(event_bus);
    }

    /// Validate and admit a request. Returns immediately with the new
    /// request id; generation runs on a spawned task.
    pub fn submit(&self, params: GenerationParams) -> Result<RequestId, Error> {
        if params.chords.is_empty() {
            return Err(Error::InvalidRequest("chord progression is empty".into()));
        }
        if params.tempo == 0 {
            return Err(Error::InvalidRequest("tempo must be positive".into()));
        }
        if params.track_types.is_empty() {
            return Err(Error::InvalidRequest("no track types requested".into()));
        }

        let id = RequestId::new();
        self.requests.insert(
            id,
            GenerationRequest {
                id,
                params: params.clone(),
                state: RequestState::Pending,
                submitted_at: Utc::now(),
            },
        );
        self.set_state(&id, RequestState::InProgress);
        info!("request {id} accepted for {} tracks", params.track_types.len());

        let coordinator = self.clone();
        tokio::spawn(async move {
            coordinator.run(id, params).await;
        });
        Ok(id)
    }

    pub fn status(&self, id: &RequestId) -> Option<GenerationRequest> {
        self.requests.get(id).map(|entry| entry.value().clone())
    }

    pub fn request_count(&self) -> usize {
        self.requests.len()
    }

    async fn run(&self, id: RequestId, params: GenerationParams) {
        let mut produced: Vec<FileId> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut timeouts = 0usize;
        let mut failures = 0usize;

        for &track_type in &params.track_types {
            match tokio::time::timeout(
                self.generator_timeout,
                self.generator.generate(track_type, &params),
            )
            .await
            {
                Ok(Ok(bytes)) => match self.store_track(&id, track_type, &params, bytes).await {
                    Ok(file_id) => produced.push(file_id),
                    Err(e) => {
                        error!("request {id}: failed to store {track_type} track: {e}");
                        warnings.push(format!("{track_type}: {e}"));
                        failures += 1;
                    }
                },
                Ok(Err(e)) => {
                    warn!("request {id}: generator failed for {track_type}: {e}");
                    warnings.push(format!("{track_type}: {e}"));
                    failures += 1;
                }
                Err(_) => {
                    warn!(
                        "request {id}: generator timed out for {track_type} after {:?}",
                        self.generator_timeout
                    );
                    warnings.push(format!(
                        "{track_type}: timed out after {:?}",
                        self.generator_timeout
                    ));
                    timeouts += 1;
                }
            }
        }

        if produced.is_empty() {
            let reason = if timeouts > 0 && failures == 0 {
                FailureReason::GeneratorTimeout
            } else {
                FailureReason::GeneratorUnavailable
            };
            self.set_state(&id, RequestState::Failed { reason });
            if let Some(bus) = &self.event_bus {
                bus.publish(OrchestratorEvent::RequestFailed { id, reason })
                    .await;
            }
        } else {
            self.set_state(
                &id,
                RequestState::Completed {
                    files: produced.clone(),
                    warnings: warnings.clone(),
                },
            );
            info!(
                "request {id} completed with {} files, {} warnings",
                produced.len(),
                warnings.len()
            );
            if let Some(bus) = &self.event_bus {
                bus.publish(OrchestratorEvent::RequestCompleted {
                    id,
                    files: produced,
                    warnings,
                })
                .await;
            }
        }
    }

    async fn store_track(
        &self,
        request_id: &RequestId,
        track_type: TrackType,
        params: &GenerationParams,
        bytes: Vec<u8>,
    ) -> Result<FileId, Error> {
        let seq = self.file_seq.fetch_add(1, Ordering::SeqCst);
        let filename = format!(
            "{}_{}bpm_{}_{}chords_{:04}.mid",
            track_type,
            params.tempo,
            params.key,
            params.chords.len(),
            seq,
        );
        let path = self.output_dir.join(&filename);
        tokio::fs::write(&path, &bytes).await?;

        let file = GeneratedFile {
            id: FileId(filename),
            track_type,
            tempo: params.tempo,
            key: params.key.clone(),
            chord_count: params.chords.len(),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
            request_id: *request_id,
        };
        self.files.register(file).await
    }

    fn set_state(&self, id: &RequestId, state: RequestState) {
        if let Some(mut entry) = self.requests.get_mut(id) {
            entry.state = state;
        }
    }
}
