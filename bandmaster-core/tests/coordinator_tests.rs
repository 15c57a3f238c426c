// tests/coordinator_tests.rs

use async_trait::async_trait;
use bandmaster_core::files::FileRegistry;
use bandmaster_core::generation::{GenerationCoordinator, TrackGenerator};
use bandmaster_core::models::{
    ChordEvent, FailureReason, GenerationParams, RequestId, RequestState, TrackType,
};
use bandmaster_core::Error;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Generator that fails for a chosen set of track types and can be slowed
/// down to trip the coordinator's timeout.
struct ScriptedGenerator {
    fail: Vec<TrackType>,
    delay: Option<Duration>,
}

impl ScriptedGenerator {
    fn ok() -> Self {
        Self {
            fail: Vec::new(),
            delay: None,
        }
    }

    fn failing(fail: Vec<TrackType>) -> Self {
        Self { fail, delay: None }
    }

    fn slow(delay: Duration) -> Self {
        Self {
            fail: Vec::new(),
            delay: Some(delay),
        }
    }
}

#[async_trait]
impl TrackGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        track_type: TrackType,
        _params: &GenerationParams,
    ) -> Result<Vec<u8>, Error> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.contains(&track_type) {
            return Err(Error::GeneratorUnavailable(format!(
                "no model for {track_type}"
            )));
        }
        Ok(vec![0x4D, 0x54, 0x68, 0x64])
    }
}

fn params(track_types: &[TrackType]) -> GenerationParams {
    let chords = ["C", "Am", "F", "G"]
        .iter()
        .enumerate()
        .map(|(i, c)| ChordEvent {
            chord: c.to_string(),
            start_beat: i as f64 * 4.0,
            duration: 4.0,
        })
        .collect();
    GenerationParams {
        chords,
        tempo: 120,
        key: "C".into(),
        duration_beats: 16.0,
        track_types: track_types.to_vec(),
        session_id: None,
    }
}

fn coordinator(generator: Arc<dyn TrackGenerator>, timeout: Duration) -> (GenerationCoordinator, TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let files = Arc::new(FileRegistry::new());
    let coordinator =
        GenerationCoordinator::new(files, generator, dir.path().to_path_buf(), timeout);
    (coordinator, dir)
}

async fn wait_terminal(coordinator: &GenerationCoordinator, id: &RequestId) -> RequestState {
    for _ in 0..100 {
        if let Some(request) = coordinator.status(id) {
            if request.state.is_terminal() {
                return request.state;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("request {id} never reached a terminal state");
}

#[tokio::test]
async fn empty_chords_rejected_synchronously() {
    let (coordinator, _dir) =
        coordinator(Arc::new(ScriptedGenerator::ok()), Duration::from_secs(5));
    let mut p = params(&[TrackType::Bass]);
    p.chords.clear();
    let err = coordinator.submit(p).unwrap_err();
    assert!(matches!(err, Error::InvalidRequest(_)));
    assert_eq!(coordinator.request_count(), 0);
}

#[tokio::test]
async fn zero_tempo_rejected() {
    let (coordinator, _dir) =
        coordinator(Arc::new(ScriptedGenerator::ok()), Duration::from_secs(5));
    let mut p = params(&[TrackType::Bass]);
    p.tempo = 0;
    assert!(matches!(
        coordinator.submit(p),
        Err(Error::InvalidRequest(_))
    ));
}

#[tokio::test]
async fn completes_with_one_file_per_track() {
    let (coordinator, dir) =
        coordinator(Arc::new(ScriptedGenerator::ok()), Duration::from_secs(5));
    let id = coordinator
        .submit(params(&[TrackType::Bass, TrackType::Drums]))
        .unwrap();

    match wait_terminal(&coordinator, &id).await {
        RequestState::Completed { files, warnings } => {
            assert_eq!(files.len(), 2);
            assert!(warnings.is_empty());
            for file_id in &files {
                assert!(dir.path().join(&file_id.0).exists());
            }
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn resubmission_yields_fresh_filenames() {
    let (coordinator, _dir) =
        coordinator(Arc::new(ScriptedGenerator::ok()), Duration::from_secs(5));

    let first = coordinator.submit(params(&[TrackType::Bass])).unwrap();
    let second = coordinator.submit(params(&[TrackType::Bass])).unwrap();

    let files_of = |state: RequestState| match state {
        RequestState::Completed { files, .. } => files,
        other => panic!("expected completion, got {other:?}"),
    };
    let a = files_of(wait_terminal(&coordinator, &first).await);
    let b = files_of(wait_terminal(&coordinator, &second).await);
    assert_ne!(a[0], b[0]);
}

#[tokio::test]
async fn partial_failure_completes_with_warnings() {
    let generator = ScriptedGenerator::failing(vec![TrackType::Drums]);
    let (coordinator, _dir) = coordinator(Arc::new(generator), Duration::from_secs(5));
    let id = coordinator
        .submit(params(&[TrackType::Bass, TrackType::Drums]))
        .unwrap();

    match wait_terminal(&coordinator, &id).await {
        RequestState::Completed { files, warnings } => {
            assert_eq!(files.len(), 1);
            assert_eq!(warnings.len(), 1);
            assert!(warnings[0].contains("drums"));
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn total_failure_is_generator_unavailable() {
    let generator = ScriptedGenerator::failing(vec![TrackType::Bass, TrackType::Drums]);
    let (coordinator, _dir) = coordinator(Arc::new(generator), Duration::from_secs(5));
    let id = coordinator
        .submit(params(&[TrackType::Bass, TrackType::Drums]))
        .unwrap();

    match wait_terminal(&coordinator, &id).await {
        RequestState::Failed { reason } => {
            assert_eq!(reason, FailureReason::GeneratorUnavailable);
        }
        other => panic!("expected failure, got {other:?}"),
    }
}

#[tokio::test]
async fn slow_generator_times_out() {
    let generator = ScriptedGenerator::slow(Duration::from_millis(300));
    let (coordinator, _dir) = coordinator(Arc::new(generator), Duration::from_millis(50));
    let id = coordinator.submit(params(&[TrackType::Bass])).unwrap();

    match wait_terminal(&coordinator, &id).await {
        RequestState::Failed { reason } => {
            assert_eq!(reason, FailureReason::GeneratorTimeout);
        }
        other => panic!("expected timeout failure, got {other:?}"),
    }
}
