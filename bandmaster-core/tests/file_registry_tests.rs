// tests/file_registry_tests.rs

use async_trait::async_trait;
use bandmaster_core::files::{FileAddedListener, FileRegistry};
use bandmaster_core::models::{FileId, GeneratedFile, RequestId, TrackType};
use bandmaster_core::Error;
use chrono::{Duration, Utc};
use std::sync::{Arc, Mutex};

fn file(name: &str, track_type: TrackType, age_secs: i64) -> GeneratedFile {
    GeneratedFile {
        id: FileId(name.to_string()),
        track_type,
        tempo: 120,
        key: "C".into(),
        chord_count: 4,
        size_bytes: 42,
        created_at: Utc::now() - Duration::seconds(age_secs),
        request_id: RequestId::new(),
    }
}

struct RecordingListener {
    seen: Mutex<Vec<FileId>>,
}

#[async_trait]
impl FileAddedListener for RecordingListener {
    async fn on_file_added(&self, file: &GeneratedFile) {
        self.seen.lock().unwrap().push(file.id.clone());
    }
}

#[tokio::test]
async fn register_rejects_duplicate_filenames() {
    let registry = FileRegistry::new();
    registry
        .register(file("a.mid", TrackType::Bass, 0))
        .await
        .unwrap();

    let err = registry
        .register(file("a.mid", TrackType::Drums, 0))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateFile(name) if name == "a.mid"));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn listener_fires_once_per_successful_registration() {
    let registry = FileRegistry::new();
    let listener = Arc::new(RecordingListener {
        seen: Mutex::new(Vec::new()),
    });
    registry.add_listener(listener.clone());

    registry
        .register(file("a.mid", TrackType::Bass, 0))
        .await
        .unwrap();
    // Duplicate registration must not re-fire the listener.
    let _ = registry.register(file("a.mid", TrackType::Bass, 0)).await;
    registry
        .register(file("b.mid", TrackType::Keys, 0))
        .await
        .unwrap();

    let seen = listener.seen.lock().unwrap();
    assert_eq!(seen.len(), 2);
    assert_eq!(seen[0].0, "a.mid");
    assert_eq!(seen[1].0, "b.mid");
}

#[tokio::test]
async fn list_is_sorted_and_filtered() {
    let registry = FileRegistry::new();
    registry
        .register(file("newer.mid", TrackType::Bass, 10))
        .await
        .unwrap();
    registry
        .register(file("oldest.mid", TrackType::Drums, 100))
        .await
        .unwrap();
    registry
        .register(file("newest.mid", TrackType::Bass, 1))
        .await
        .unwrap();

    let all = registry.list(None, None);
    let names: Vec<_> = all.iter().map(|f| f.id.0.as_str()).collect();
    assert_eq!(names, ["oldest.mid", "newer.mid", "newest.mid"]);

    let bass_only = registry.list(Some(TrackType::Bass), None);
    assert_eq!(bass_only.len(), 2);
    assert!(bass_only.iter().all(|f| f.track_type == TrackType::Bass));

    let recent = registry.list(None, Some(Utc::now() - Duration::seconds(50)));
    assert_eq!(recent.len(), 2);
}

#[tokio::test]
async fn remove_then_missing() {
    let registry = FileRegistry::new();
    registry
        .register(file("a.mid", TrackType::Melody, 0))
        .await
        .unwrap();

    let removed = registry.remove(&FileId("a.mid".into())).await.unwrap();
    assert_eq!(removed.id.0, "a.mid");
    assert!(registry.is_empty());

    let err = registry.remove(&FileId("a.mid".into())).await.unwrap_err();
    assert!(matches!(err, Error::NotFound(_)));
}
