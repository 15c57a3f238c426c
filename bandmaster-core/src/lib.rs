// src/lib.rs

pub mod config;
pub mod dispatch;
pub mod error;
pub mod eventbus;
pub mod files;
pub mod generation;
pub mod models;
pub mod sessions;
pub mod tasks;

pub use config::OrchestratorConfig;
pub use error::Error;
