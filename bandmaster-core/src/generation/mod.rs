// src/generation/mod.rs
pub mod coordinator;
pub mod generator;

pub use coordinator::GenerationCoordinator;
pub use generator::{HttpBackendGenerator, MockGenerator, TrackGenerator};
