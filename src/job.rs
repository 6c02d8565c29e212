//! Job records and the write-through job store.
//!
//! A [`ProcessingJob`] is the durable, polled handle for one background
//! extraction run. The store keeps an in-memory index for fast reads and
//! writes every mutation through to `jobs/{id}.json` so records survive a
//! restart; writes are short and synchronous, which lets pipeline code call
//! them from blocking contexts without ceremony.
//!
//! Two invariants are enforced here and nowhere else:
//!
//! * progress is non-decreasing until a terminal state, and
//! * status only moves forward (pending → processing → done | error).
//!
//! The error transition is the single exception that lowers progress — it
//! resets to 0, preserving the behaviour of the system this replaces.
//! A terminal record accepts no further mutation except the project
//! back-reference set at promotion time.

use crate::error::PlanliftError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

/// Lifecycle state of a processing job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Pending,
    Processing,
    Done,
    Error,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Done => "done",
            JobStatus::Error => "error",
        }
    }

    /// Done and Error are terminal; no stage runs after either.
    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Done | JobStatus::Error)
    }
}

/// Per-job pipeline parameters, fixed at submission.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct JobParams {
    /// Rendering DPI for the rasterisation stage.
    pub dpi: u32,
    /// Minimum sub-diagram area as a percentage of page-crop area.
    pub min_area_pct: f32,
}

/// One submitted extraction run: the polled source of truth for its
/// status, step and progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessingJob {
    /// Unique job id (UUID).
    pub id: String,
    /// The source document reference as submitted (path or URL).
    pub source: String,
    pub status: JobStatus,
    /// Human-readable current activity.
    pub step: String,
    /// 0–100; non-decreasing until terminal.
    pub progress: u8,
    /// Job-scoped storage directory (relocated on promotion).
    pub job_dir: PathBuf,
    pub params: JobParams,
    /// Exception message captured verbatim on stage failure.
    pub error_msg: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Registry back-reference, set when the job's assets are promoted.
    pub project_id: Option<String>,
}

impl ProcessingJob {
    pub fn new(source: impl Into<String>, params: JobParams, job_dir: impl Into<PathBuf>) -> Self {
        ProcessingJob {
            id: Uuid::new_v4().to_string(),
            source: source.into(),
            status: JobStatus::Pending,
            step: "Queued — waiting to start".to_string(),
            progress: 0,
            job_dir: job_dir.into(),
            params,
            error_msg: None,
            created_at: Utc::now(),
            project_id: None,
        }
    }
}

/// In-memory index plus write-through JSON persistence for job records.
pub struct JobStore {
    jobs_dir: PathBuf,
    jobs: RwLock<HashMap<String, ProcessingJob>>,
}

impl JobStore {
    /// Open (or create) the store at `jobs_dir`, loading any existing
    /// records. A record that fails to parse is skipped with a warning
    /// rather than poisoning startup.
    pub fn open(jobs_dir: impl Into<PathBuf>) -> Result<Self, PlanliftError> {
        let jobs_dir = jobs_dir.into();
        std::fs::create_dir_all(&jobs_dir).map_err(|e| PlanliftError::io(&jobs_dir, e))?;

        let mut jobs = HashMap::new();
        let entries =
            std::fs::read_dir(&jobs_dir).map_err(|e| PlanliftError::io(&jobs_dir, e))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            match Self::load_record(&path) {
                Ok(job) => {
                    jobs.insert(job.id.clone(), job);
                }
                Err(e) => warn!("Skipping unreadable job record {}: {}", path.display(), e),
            }
        }
        debug!("Job store opened with {} records", jobs.len());

        Ok(JobStore {
            jobs_dir,
            jobs: RwLock::new(jobs),
        })
    }

    fn load_record(path: &Path) -> Result<ProcessingJob, PlanliftError> {
        let bytes = std::fs::read(path).map_err(|e| PlanliftError::io(path, e))?;
        serde_json::from_slice(&bytes).map_err(|e| PlanliftError::RecordCorrupted {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })
    }

    fn record_path(&self, id: &str) -> PathBuf {
        self.jobs_dir.join(format!("{id}.json"))
    }

    /// Atomic write: temp file + rename, so a crash never leaves a
    /// half-written record.
    fn persist(&self, job: &ProcessingJob) -> Result<(), PlanliftError> {
        let path = self.record_path(&job.id);
        let tmp = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(job)
            .map_err(|e| PlanliftError::Internal(format!("serialise job record: {e}")))?;
        std::fs::write(&tmp, bytes).map_err(|e| PlanliftError::io(&tmp, e))?;
        std::fs::rename(&tmp, &path).map_err(|e| PlanliftError::io(&path, e))?;
        Ok(())
    }

    /// Insert a freshly created job (pending, progress 0).
    pub fn insert(&self, job: ProcessingJob) -> Result<ProcessingJob, PlanliftError> {
        self.persist(&job)?;
        self.jobs
            .write()
            .expect("job index poisoned")
            .insert(job.id.clone(), job.clone());
        Ok(job)
    }

    pub fn get(&self, id: &str) -> Option<ProcessingJob> {
        self.jobs.read().expect("job index poisoned").get(id).cloned()
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<ProcessingJob> {
        let mut jobs: Vec<_> = self
            .jobs
            .read()
            .expect("job index poisoned")
            .values()
            .cloned()
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Apply a mutation under the write lock, then persist.
    ///
    /// The closure sees the record only when it is non-terminal; terminal
    /// records are left untouched (with a warning) so a slow worker cannot
    /// resurrect a finished job.
    fn mutate<F>(&self, id: &str, f: F) -> Result<ProcessingJob, PlanliftError>
    where
        F: FnOnce(&mut ProcessingJob),
    {
        let mut index = self.jobs.write().expect("job index poisoned");
        let job = index
            .get_mut(id)
            .ok_or_else(|| PlanliftError::JobNotFound { id: id.to_string() })?;
        if job.status.is_terminal() {
            warn!("Ignoring update to terminal job {}", id);
            return Ok(job.clone());
        }
        f(job);
        let snapshot = job.clone();
        drop(index);
        self.persist(&snapshot)?;
        Ok(snapshot)
    }

    /// Enter a new stage: status becomes `processing`, the step label is
    /// replaced, and progress advances (never regresses) to `progress`.
    pub fn set_stage(
        &self,
        id: &str,
        step: &str,
        progress: u8,
    ) -> Result<ProcessingJob, PlanliftError> {
        self.mutate(id, |job| {
            job.status = JobStatus::Processing;
            job.step = step.to_string();
            job.progress = job.progress.max(progress.min(100));
        })
    }

    /// Advance progress within the current stage; regressions are ignored.
    pub fn set_progress(&self, id: &str, progress: u8) -> Result<ProcessingJob, PlanliftError> {
        self.mutate(id, |job| {
            job.progress = job.progress.max(progress.min(100));
        })
    }

    /// Terminal success: progress 100.
    pub fn complete(&self, id: &str) -> Result<ProcessingJob, PlanliftError> {
        self.mutate(id, |job| {
            job.status = JobStatus::Done;
            job.step = "Complete — all steps finished".to_string();
            job.progress = 100;
        })
    }

    /// Terminal failure: the message is recorded verbatim and progress is
    /// reset to 0 — the only transition allowed to lower it.
    pub fn fail(&self, id: &str, error_msg: &str) -> Result<ProcessingJob, PlanliftError> {
        self.mutate(id, |job| {
            job.status = JobStatus::Error;
            job.step = format!("Error: {error_msg}");
            job.error_msg = Some(error_msg.to_string());
            job.progress = 0;
        })
    }

    /// Record the registry back-reference after promotion. This is the one
    /// mutation allowed on a terminal record.
    pub fn link_project(&self, id: &str, project_id: &str) -> Result<(), PlanliftError> {
        let mut index = self.jobs.write().expect("job index poisoned");
        let job = index
            .get_mut(id)
            .ok_or_else(|| PlanliftError::JobNotFound { id: id.to_string() })?;
        job.project_id = Some(project_id.to_string());
        let snapshot = job.clone();
        drop(index);
        self.persist(&snapshot)
    }

    /// Rewrite a terminal job's storage location after its directory has
    /// been relocated into a project.
    pub fn relocate(&self, id: &str, new_dir: &Path) -> Result<(), PlanliftError> {
        let mut index = self.jobs.write().expect("job index poisoned");
        let job = index
            .get_mut(id)
            .ok_or_else(|| PlanliftError::JobNotFound { id: id.to_string() })?;
        job.job_dir = new_dir.to_path_buf();
        let snapshot = job.clone();
        drop(index);
        self.persist(&snapshot)
    }
}
