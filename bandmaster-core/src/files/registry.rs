// src/files/registry.rs
//! In-memory catalog of generated files.
//!
//! Registration is the single point where a file becomes visible: the
//! record is inserted, listeners run, then the bus hears about it. The
//! listeners run before `register` returns, so by the time a caller sees
//! the new `FileId` every listener has already considered the file.

use crate::eventbus::{EventBus, OrchestratorEvent};
use crate::models::{FileId, GeneratedFile, TrackType};
use crate::Error;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

/// Hook invoked after each successful registration, in the order the
/// listeners were added.
#[async_trait]
pub trait FileAddedListener: Send + Sync {
    async fn on_file_added(&self, file: &GeneratedFile);
}

pub struct FileRegistry {
    files: Mutex<HashMap<FileId, GeneratedFile>>,
    listeners: RwLock<Vec<Arc<dyn FileAddedListener>>>,
    event_bus: Option<Arc<EventBus>>,
}

impl FileRegistry {
    pub fn new() -> Self {
        Self {
            files: Mutex::new(HashMap::new()),
            listeners: RwLock::new(Vec::new()),
            event_bus: None,
        }
    }

    pub fn set_event_bus(&mut self, event_bus: Arc<EventBus>) {
        self.event_bus = Some(event_bus);
    }

    pub fn add_listener(&self, listener: Arc<dyn FileAddedListener>) {
        self.listeners.write().unwrap().push(listener);
    }

    /// Add a file to the registry. Fails if the id is already taken;
    /// on success the file is immutable from then on.
    pub async fn register(&self, file: GeneratedFile) -> Result<FileId, Error> {
        let id = file.id.clone();
        {
            let mut files = self.files.lock().unwrap();
            if files.contains_key(&id) {
                return Err(Error::DuplicateFile(id.0));
            }
            files.insert(id.clone(), file.clone());
        }

        let listeners: Vec<_> = self.listeners.read().unwrap().clone();
        for listener in listeners {
            listener.on_file_added(&file).await;
        }

        if let Some(bus) = &self.event_bus {
            bus.publish(OrchestratorEvent::FileAdded { file }).await;
        }
        Ok(id)
    }

    pub fn get(&self, id: &FileId) -> Option<GeneratedFile> {
        self.files.lock().unwrap().get(id).cloned()
    }

    /// List files, optionally filtered, ordered oldest first with the id
    /// breaking ties.
    pub fn list(
        &self,
        track_type: Option<TrackType>,
        since: Option<DateTime<Utc>>,
    ) -> Vec<GeneratedFile> {
        let files = self.files.lock().unwrap();
        let mut out: Vec<GeneratedFile> = files
            .values()
            .filter(|f| track_type.is_none_or(|t| f.track_type == t))
            .filter(|f| since.is_none_or(|s| f.created_at >= s))
            .cloned()
            .collect();
        out.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.id.0.cmp(&b.id.0))
        });
        out
    }

    pub async fn remove(&self, id: &FileId) -> Result<GeneratedFile, Error> {
        let removed = self
            .files
            .lock()
            .unwrap()
            .remove(id)
            .ok_or_else(|| Error::NotFound(id.0.clone()))?;

        if let Some(bus) = &self.event_bus {
            bus.publish(OrchestratorEvent::FileRemoved { id: id.clone() })
                .await;
        }
        Ok(removed)
    }

    pub fn len(&self) -> usize {
        self.files.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.lock().unwrap().is_empty()
    }
}

impl Default for FileRegistry {
    fn default() -> Self {
        Self::new()
    }
}
