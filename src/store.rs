//! Structured per-project records.
//!
//! Each project has exactly one document under `{root}/documents/`, holding
//! the asset registry plus provenance fields. The record is authoritative
//! for reads; a disk mirror (`registry.json` inside the project directory)
//! is written alongside it and used to rebuild the record after a crash
//! between the two writes — see [`crate::registry::RegistryService`].

use crate::error::PlanliftError;
use crate::manifest::SavedAsset;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// The structured record for one project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectDocument {
    pub project_id: String,
    /// The job this project was promoted from, if any.
    pub job_id: Option<String>,
    /// The source document reference of that job.
    pub source: Option<String>,
    pub dpi: u32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Promoted assets, in promotion order.
    pub saved: Vec<SavedAsset>,
}

impl ProjectDocument {
    pub fn new(project_id: impl Into<String>, dpi: u32) -> Self {
        let now = Utc::now();
        ProjectDocument {
            project_id: project_id.into(),
            job_id: None,
            source: None,
            dpi,
            created_at: now,
            updated_at: now,
            saved: Vec::new(),
        }
    }

    pub fn total_saved(&self) -> usize {
        self.saved.len()
    }

    pub fn find_asset(&self, filename: &str) -> Option<&SavedAsset> {
        self.saved.iter().find(|a| a.filename == filename)
    }

    pub fn find_asset_mut(&mut self, filename: &str) -> Option<&mut SavedAsset> {
        self.saved.iter_mut().find(|a| a.filename == filename)
    }
}

/// CRUD over project documents. Stateless; every call goes to disk, which
/// keeps concurrent writers simple (last writer wins, whole-record).
#[derive(Debug, Clone)]
pub struct ProjectStore {
    storage: Storage,
}

impl ProjectStore {
    pub fn new(storage: Storage) -> Self {
        ProjectStore { storage }
    }

    pub fn get(&self, project_id: &str) -> Result<Option<ProjectDocument>, PlanliftError> {
        let path = self.storage.document_path(project_id);
        if !path.exists() {
            return Ok(None);
        }
        Storage::read_json(&path).map(Some)
    }

    /// Write the document, stamping `updated_at`.
    pub fn upsert(&self, doc: &mut ProjectDocument) -> Result<(), PlanliftError> {
        doc.updated_at = Utc::now();
        let path = self.storage.document_path(&doc.project_id);
        Storage::write_json(&path, doc)?;
        debug!(project_id = %doc.project_id, saved = doc.saved.len(), "Project document written");
        Ok(())
    }

    pub fn delete(&self, project_id: &str) -> Result<(), PlanliftError> {
        let path = self.storage.document_path(project_id);
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PlanliftError::io(&path, e)),
        }
    }

    /// All project ids with a document record.
    pub fn list_ids(&self) -> Result<Vec<String>, PlanliftError> {
        let dir = self.storage.documents_dir();
        if !dir.exists() {
            return Ok(Vec::new());
        }
        let mut ids = Vec::new();
        let entries = std::fs::read_dir(&dir).map_err(|e| PlanliftError::io(&dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "json") {
                if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                    ids.push(stem.to_string());
                }
            }
        }
        ids.sort();
        Ok(ids)
    }
}
