// src/files/mod.rs
pub mod registry;

pub use registry::{FileAddedListener, FileRegistry};
