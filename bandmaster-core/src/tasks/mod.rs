// src/tasks/mod.rs
pub mod file_cleanup;
pub mod session_expiry;

pub use file_cleanup::spawn_file_cleanup_task;
pub use session_expiry::spawn_session_expiry_task;
