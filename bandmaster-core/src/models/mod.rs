// src/models/mod.rs
//! Shared domain types for the orchestrator: track kinds, chord input,
//! generated file records, and request lifecycle state.

use crate::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The instrument role a generated track fills.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackType {
    Bass,
    Drums,
    Keys,
    Melody,
}

impl TrackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TrackType::Bass => "bass",
            TrackType::Drums => "drums",
            TrackType::Keys => "keys",
            TrackType::Melody => "melody",
        }
    }
}

impl fmt::Display for TrackType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TrackType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "bass" => Ok(TrackType::Bass),
            "drums" => Ok(TrackType::Drums),
            "keys" => Ok(TrackType::Keys),
            "melody" => Ok(TrackType::Melody),
            other => Err(Error::Parse(format!("unknown track type '{other}'"))),
        }
    }
}

/// One chord in the progression a request is generated against.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChordEvent {
    pub chord: String,
    #[serde(alias = "start_time")]
    pub start_beat: f64,
    pub duration: f64,
}

/// Registry-wide unique identifier for a generated file. This doubles as
/// the on-disk filename.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub String);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RequestId(pub Uuid);

impl RequestId {
    pub fn new() -> Self {
        RequestId(Uuid::new_v4())
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Caller-supplied identity for a plugin session. Reusing the same id
/// across reconnects is what makes queue resumption work.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything the generator needs to produce one batch of tracks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationParams {
    pub chords: Vec<ChordEvent>,
    pub tempo: u32,
    pub key: String,
    #[serde(default = "default_duration_beats")]
    pub duration_beats: f64,
    pub track_types: Vec<TrackType>,
    #[serde(default)]
    pub session_id: Option<SessionId>,
}

fn default_duration_beats() -> f64 {
    32.0
}

/// A file that made it into the registry. Immutable once registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedFile {
    pub id: FileId,
    pub track_type: TrackType,
    pub tempo: u32,
    pub key: String,
    pub chord_count: usize,
    pub size_bytes: u64,
    pub created_at: DateTime<Utc>,
    pub request_id: RequestId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    GeneratorUnavailable,
    GeneratorTimeout,
}

/// Lifecycle of a generation request. Terminal states keep their payload
/// so late status polls see the full outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RequestState {
    Pending,
    InProgress,
    Completed {
        files: Vec<FileId>,
        warnings: Vec<String>,
    },
    Failed {
        reason: FailureReason,
    },
}

impl RequestState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestState::Completed { .. } | RequestState::Failed { .. }
        )
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub id: RequestId,
    pub params: GenerationParams,
    #[serde(flatten)]
    pub state: RequestState,
    pub submitted_at: DateTime<Utc>,
}

/// Connection state of a plugin session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Connecting,
    Active,
    Disconnected,
}
