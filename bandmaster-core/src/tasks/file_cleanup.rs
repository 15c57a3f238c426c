// src/tasks/file_cleanup.rs
//! Sweeps generated files past their retention age off disk and out of
//! the registry, along with their metadata sidecars.

use crate::files::FileRegistry;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub fn spawn_file_cleanup_task(
    files: Arc<FileRegistry>,
    output_dir: PathBuf,
    retention: Duration,
    interval: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let removed = cleanup_once(&files, &output_dir, retention).await;
                    if removed > 0 {
                        info!("cleaned up {removed} expired files");
                    }
                }
                Ok(_) = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }
        debug!("file cleanup task exiting");
    })
}

/// Remove all files older than `retention`. Returns how many registry
/// entries were dropped.
pub async fn cleanup_once(
    files: &FileRegistry,
    output_dir: &Path,
    retention: Duration,
) -> usize {
    let retention = match chrono::Duration::from_std(retention) {
        Ok(d) => d,
        Err(_) => return 0,
    };
    let cutoff = chrono::Utc::now() - retention;

    let expired: Vec<_> = files
        .list(None, None)
        .into_iter()
        .filter(|f| f.created_at < cutoff)
        .collect();

    let mut removed = 0;
    for file in expired {
        if let Err(e) = files.remove(&file.id).await {
            warn!("could not remove {} from registry: {e}", file.id);
            continue;
        }
        removed += 1;

        let path = output_dir.join(&file.id.0);
        if let Err(e) = tokio::fs::remove_file(&path).await {
            warn!("could not delete {}: {e}", path.display());
        }
        let sidecar = output_dir.join(format!("{}.meta.json", file.id));
        // Sidecars are best-effort; absence is normal.
        let _ = tokio::fs::remove_file(&sidecar).await;
    }
    removed
}
