// src/eventbus/meta_logger.rs
//! Bus subscriber that writes a `.meta.json` sidecar for every file
//! added to the registry, so the output directory is self-describing.

use crate::eventbus::{EventBus, OrchestratorEvent};
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tracing::{debug, error};

pub fn spawn_meta_logger_task(event_bus: &EventBus, output_dir: PathBuf) -> JoinHandle<()> {
    let mut rx = event_bus.subscribe(None);
    let mut shutdown_rx = event_bus.shutdown_rx.clone();

    tokio::spawn(async move {
        loop {
            tokio::select! {
                biased;

                maybe_event = rx.recv() => {
                    match maybe_event {
                        Some(event) => write_sidecar(&output_dir, &event).await,
                        None => break,
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        // Flush anything still buffered before exiting.
        while let Ok(event) = rx.try_recv() {
            write_sidecar(&output_dir, &event).await;
        }
        debug!("meta logger task exiting");
    })
}

async fn write_sidecar(output_dir: &std::path::Path, event: &OrchestratorEvent) {
    let OrchestratorEvent::FileAdded { file } = event else {
        return;
    };
    let path = output_dir.join(format!("{}.meta.json", file.id));
    match serde_json::to_vec_pretty(file) {
        Ok(bytes) => {
            if let Err(e) = tokio::fs::write(&path, bytes).await {
                error!("failed to write sidecar {}: {e}", path.display());
            }
        }
        Err(e) => error!("failed to serialize metadata for {}: {e}", file.id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FileId, GeneratedFile, RequestId, TrackType};
    use chrono::Utc;

    #[tokio::test]
    async fn writes_sidecar_for_file_added() {
        let dir = tempfile::tempdir().unwrap();
        let bus = EventBus::new();
        let handle = spawn_meta_logger_task(&bus, dir.path().to_path_buf());

        let file = GeneratedFile {
            id: FileId("bass_120bpm_C_4chords_0001.mid".into()),
            track_type: TrackType::Bass,
            tempo: 120,
            key: "C".into(),
            chord_count: 4,
            size_bytes: 64,
            created_at: Utc::now(),
            request_id: RequestId::new(),
        };
        bus.publish(OrchestratorEvent::FileAdded { file: file.clone() })
            .await;

        bus.shutdown();
        handle.await.unwrap();

        let sidecar = dir
            .path()
            .join("bass_120bpm_C_4chords_0001.mid.meta.json");
        let data = tokio::fs::read(&sidecar).await.unwrap();
        let parsed: GeneratedFile = serde_json::from_slice(&data).unwrap();
        assert_eq!(parsed.id, file.id);
        assert_eq!(parsed.tempo, 120);
    }
}
