//! Storage layout and durable JSON helpers.
//!
//! Everything lives under one configurable root:
//!
//! ```text
//! {root}/jobs/{job_id}.json          job records (never relocated)
//! {root}/jobs/{job_id}/              job-scoped working dir
//! {root}/jobs/{job_id}/pages/        full-page renders
//! {root}/jobs/{job_id}/sectioned/    crops + manifest.json
//! {root}/jobs/{job_id}/staged/       curated selection + selection.json
//! {root}/projects/{project_id}/      promoted job dirs (one level down)
//! {root}/projects/{project_id}/assets/   canonical promoted crops
//! {root}/projects/{project_id}/rooms/    extracted room images
//! {root}/projects/{project_id}/registry.json   disk mirror of the registry
//! {root}/documents/{project_id}.json structured per-project records
//! ```
//!
//! Job records sit *beside* the job directory rather than inside it, so
//! promotion (which moves the directory into a project) never orphans the
//! record. All JSON writes go through [`Storage::write_json`], which writes
//! a temp file in the destination directory and renames it into place.

use crate::error::PlanliftError;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Resolves every path and URL in the storage layout from the single root.
#[derive(Debug, Clone)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Storage { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the top-level directories if they don't exist.
    pub fn ensure_layout(&self) -> Result<(), PlanliftError> {
        for dir in [self.jobs_dir(), self.projects_dir(), self.documents_dir()] {
            std::fs::create_dir_all(&dir).map_err(|e| PlanliftError::io(&dir, e))?;
        }
        Ok(())
    }

    // ── Job-scoped paths ──────────────────────────────────────────────────

    pub fn jobs_dir(&self) -> PathBuf {
        self.root.join("jobs")
    }

    pub fn job_dir(&self, job_id: &str) -> PathBuf {
        self.jobs_dir().join(job_id)
    }

    pub fn pages_dir(job_dir: &Path) -> PathBuf {
        job_dir.join("pages")
    }

    pub fn sectioned_dir(job_dir: &Path) -> PathBuf {
        job_dir.join("sectioned")
    }

    pub fn staged_dir(job_dir: &Path) -> PathBuf {
        job_dir.join("staged")
    }

    pub fn manifest_path(job_dir: &Path) -> PathBuf {
        Self::sectioned_dir(job_dir).join("manifest.json")
    }

    pub fn selection_path(job_dir: &Path) -> PathBuf {
        Self::staged_dir(job_dir).join("selection.json")
    }

    // ── Project-scoped paths ──────────────────────────────────────────────

    pub fn projects_dir(&self) -> PathBuf {
        self.root.join("projects")
    }

    pub fn project_dir(&self, project_id: &str) -> PathBuf {
        self.projects_dir().join(project_id)
    }

    pub fn assets_dir(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("assets")
    }

    pub fn rooms_dir(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("rooms")
    }

    /// Disk mirror of the project registry, used for crash recovery.
    pub fn registry_mirror_path(&self, project_id: &str) -> PathBuf {
        self.project_dir(project_id).join("registry.json")
    }

    pub fn documents_dir(&self) -> PathBuf {
        self.root.join("documents")
    }

    pub fn document_path(&self, project_id: &str) -> PathBuf {
        self.documents_dir().join(format!("{project_id}.json"))
    }

    // ── Serving URLs ──────────────────────────────────────────────────────
    //
    // The storage root is expected to be served at `/files/`. These helpers
    // produce the URLs embedded in manifests and registry records.

    pub fn job_file_url(job_id: &str, rel: &str) -> String {
        format!("/files/jobs/{job_id}/{rel}")
    }

    pub fn project_file_url(project_id: &str, rel: &str) -> String {
        format!("/files/{project_id}/{rel}")
    }

    // ── Durable JSON ──────────────────────────────────────────────────────

    /// Atomically write `value` as pretty JSON to `path`.
    ///
    /// The temp file lands in the same directory as the destination so the
    /// rename stays on one filesystem.
    pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<(), PlanliftError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| PlanliftError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(value)
            .map_err(|e| PlanliftError::Internal(format!("serialise {}: {e}", path.display())))?;
        let tmp = path.with_extension("tmp");
        std::fs::write(&tmp, bytes).map_err(|e| PlanliftError::io(&tmp, e))?;
        std::fs::rename(&tmp, path).map_err(|e| PlanliftError::io(path, e))?;
        Ok(())
    }

    /// Read and parse a JSON record.
    pub fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, PlanliftError> {
        let bytes = std::fs::read(path).map_err(|e| match e.kind() {
            std::io::ErrorKind::NotFound => PlanliftError::RecordCorrupted {
                path: path.to_path_buf(),
                detail: "record missing".into(),
            },
            _ => PlanliftError::io(path, e),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| PlanliftError::RecordCorrupted {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }
}
