// src/generation/generator.rs
//! Track generation backends.
//!
//! `HttpBackendGenerator` talks to a real model server over HTTP.
//! `MockGenerator` produces small valid MIDI files and exists so the
//! orchestrator runs end to end without a backend.

use crate::models::{ChordEvent, GenerationParams, TrackType};
use crate::Error;
use async_trait::async_trait;
use serde::Serialize;
use std::time::Duration;

#[async_trait]
pub trait TrackGenerator: Send + Sync {
    /// Produce the raw file bytes for one track.
    async fn generate(
        &self,
        track_type: TrackType,
        params: &GenerationParams,
    ) -> Result<Vec<u8>, Error>;
}

pub struct HttpBackendGenerator {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct BackendRequest<'a> {
    track_type: TrackType,
    chords: &'a [ChordEvent],
    tempo: u32,
    key: &'a str,
    duration: f64,
}

impl HttpBackendGenerator {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl TrackGenerator for HttpBackendGenerator {
    async fn generate(
        &self,
        track_type: TrackType,
        params: &GenerationParams,
    ) -> Result<Vec<u8>, Error> {
        let url = format!("{}/api/generate_track", self.base_url);
        let body = BackendRequest {
            track_type,
            chords: &params.chords,
            tempo: params.tempo,
            key: &params.key,
            duration: params.duration_beats,
        };
        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::GeneratorUnavailable(e.to_string()))?
            .error_for_status()
            .map_err(|e| Error::GeneratorUnavailable(e.to_string()))?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| Error::GeneratorUnavailable(e.to_string()))?;
        Ok(bytes.to_vec())
    }
}

/// Generates a minimal two-track MIDI file per request. An optional
/// delay simulates backend latency.
pub struct MockGenerator {
    delay: Option<Duration>,
}

impl MockGenerator {
    pub fn new() -> Self {
        Self { delay: None }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay: Some(delay) }
    }

    fn stub_midi(track_type: TrackType) -> Vec<u8> {
        // Header: format 1, two tracks, 480 ticks per quarter note.
        let mut bytes = vec![
            0x4D, 0x54, 0x68, 0x64, 0x00, 0x00, 0x00, 0x06, 0x00, 0x01, 0x00, 0x02, 0x01, 0xE0,
        ];
        // Drums go on channel 10.
        let (status, note) = match track_type {
            TrackType::Bass => (0x90u8, 0x24u8),
            TrackType::Drums => (0x99, 0x24),
            TrackType::Keys => (0x90, 0x3C),
            TrackType::Melody => (0x90, 0x40),
        };
        let track_data = [
            0x00, status, note, 0x64,
            0x60, 0x80 | (status & 0x0F), note, 0x00,
            0x00, 0xFF, 0x2F, 0x00,
        ];
        bytes.extend_from_slice(&[0x4D, 0x54, 0x72, 0x6B]);
        bytes.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
        bytes.extend_from_slice(&track_data);
        bytes
    }
}

impl Default for MockGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TrackGenerator for MockGenerator {
    async fn generate(
        &self,
        track_type: TrackType,
        _params: &GenerationParams,
    ) -> Result<Vec<u8>, Error> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Ok(Self::stub_midi(track_type))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stub_midi_has_valid_header_and_track() {
        let bytes = MockGenerator::stub_midi(TrackType::Keys);
        assert_eq!(&bytes[0..4], b"MThd");
        assert_eq!(&bytes[14..18], b"MTrk");
        assert_eq!(&bytes[bytes.len() - 3..], &[0xFF, 0x2F, 0x00]);
    }

    #[test]
    fn drums_use_channel_ten() {
        let bytes = MockGenerator::stub_midi(TrackType::Drums);
        // First event status byte follows the MTrk length field.
        assert_eq!(bytes[23], 0x99);
    }
}
