//! The job controller: submission, queueing and the worker pool.
//!
//! ## Why an explicit queue?
//!
//! Each job is CPU-bound for seconds to minutes. Spawning a task per
//! submission would let a burst of uploads saturate the blocking pool; a
//! bounded queue consumed by a fixed number of workers keeps concurrency
//! at the configured level and gives natural backpressure at submit time.
//!
//! A worker runs one job end to end: resolve the source (async, may
//! download), then the whole CPU-bound pipeline inside one
//! `spawn_blocking` call. Stage transitions are written straight to the
//! job store from the blocking context — the store is synchronous by
//! design — so a polling client always sees fresh progress.
//!
//! A stage failure is fatal to the job, not the process: the error message
//! is captured verbatim into the record and the worker moves on.

use crate::config::PipelineConfig;
use crate::error::PlanliftError;
use crate::job::{JobParams, JobStore, ProcessingJob};
use crate::pipeline::segment::QuadrantLabeler;
use crate::pipeline::{self, input, render, PipelineRun, StageSink};
use crate::progress::ProgressCallback;
use crate::storage::Storage;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

/// Queue depth before `submit` starts waiting.
const QUEUE_CAPACITY: usize = 64;

/// Bridges pipeline stage events into the job record and the optional
/// in-process callback.
struct JobSink {
    jobs: Arc<JobStore>,
    job_id: String,
    callback: Option<ProgressCallback>,
}

impl StageSink for JobSink {
    fn stage(&self, step: &str, progress: u8) {
        if let Err(e) = self.jobs.set_stage(&self.job_id, step, progress) {
            warn!("Failed to record stage for job {}: {}", self.job_id, e);
        }
        if let Some(cb) = &self.callback {
            cb.on_stage_start(&self.job_id, step);
            cb.on_progress(&self.job_id, progress);
        }
    }

    fn progress(&self, progress: u8) {
        if let Err(e) = self.jobs.set_progress(&self.job_id, progress) {
            warn!("Failed to record progress for job {}: {}", self.job_id, e);
        }
        if let Some(cb) = &self.callback {
            cb.on_progress(&self.job_id, progress);
        }
    }
}

/// Accepts submissions, owns the job store and runs the worker pool.
pub struct JobController {
    config: PipelineConfig,
    storage: Storage,
    jobs: Arc<JobStore>,
    tx: mpsc::Sender<String>,
}

impl JobController {
    /// Open the store under the configured root and start the workers.
    ///
    /// Jobs found mid-flight from a previous run stay in their persisted
    /// state; they are not re-queued (their partial output is still on
    /// disk for inspection).
    pub fn new(config: PipelineConfig) -> Result<Self, PlanliftError> {
        let storage = Storage::new(&config.storage_root);
        storage.ensure_layout()?;
        let jobs = Arc::new(JobStore::open(storage.jobs_dir())?);

        let (tx, rx) = mpsc::channel::<String>(QUEUE_CAPACITY);
        let rx = Arc::new(Mutex::new(rx));

        let controller = JobController {
            config,
            storage,
            jobs,
            tx,
        };

        for worker_id in 0..controller.config.workers {
            let rx = Arc::clone(&rx);
            let jobs = Arc::clone(&controller.jobs);
            let config = controller.config.clone();
            tokio::spawn(async move {
                loop {
                    let job_id = { rx.lock().await.recv().await };
                    let Some(job_id) = job_id else {
                        info!("Worker {} shutting down", worker_id);
                        break;
                    };
                    info!("Worker {} picked up job {}", worker_id, job_id);
                    run_job(&jobs, &config, &job_id).await;
                }
            });
        }

        Ok(controller)
    }

    /// Validate the source reference and enqueue a new job.
    ///
    /// A local path is resolved eagerly so an obvious mistake (missing
    /// file, not a PDF) fails the call instead of creating a doomed job.
    /// URLs are only checked for shape; the download happens on a worker.
    pub async fn submit(&self, source: &str) -> Result<ProcessingJob, PlanliftError> {
        if source.trim().is_empty() {
            return Err(PlanliftError::InvalidInput {
                input: source.to_string(),
            });
        }
        if !input::is_url(source) {
            // Resolve and discard: existence, readability, magic bytes.
            input::resolve_input(source, self.config.download_timeout_secs).await?;
        }

        let params = JobParams {
            dpi: self.config.dpi,
            min_area_pct: self.config.min_area_pct,
        };
        let mut job = ProcessingJob::new(source, params, "");
        job.job_dir = self.storage.job_dir(&job.id);
        std::fs::create_dir_all(&job.job_dir).map_err(|e| PlanliftError::io(&job.job_dir, e))?;

        let job = self.jobs.insert(job)?;
        self.tx
            .send(job.id.clone())
            .await
            .map_err(|_| PlanliftError::Internal("job queue closed".into()))?;
        info!("Job {} queued for '{}'", job.id, source);
        Ok(job)
    }

    pub fn get(&self, job_id: &str) -> Result<ProcessingJob, PlanliftError> {
        self.jobs.get(job_id).ok_or_else(|| PlanliftError::JobNotFound {
            id: job_id.to_string(),
        })
    }

    /// All jobs, newest first.
    pub fn list(&self) -> Vec<ProcessingJob> {
        self.jobs.list()
    }

    pub fn jobs(&self) -> &Arc<JobStore> {
        &self.jobs
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }
}

/// Run one job to a terminal state. Never returns an error: failures are
/// recorded on the job.
async fn run_job(jobs: &Arc<JobStore>, config: &PipelineConfig, job_id: &str) {
    let Some(job) = jobs.get(job_id) else {
        error!("Queued job {} has no record; skipping", job_id);
        return;
    };

    let callback = config.progress_callback.clone();
    let fail = |msg: &str| {
        if let Err(e) = jobs.fail(job_id, msg) {
            error!("Failed to record error for job {}: {}", job_id, e);
        }
        if let Some(cb) = &callback {
            cb.on_job_error(job_id, msg.to_string());
        }
    };

    if let Err(e) = jobs.set_stage(job_id, "Preparing — resolving source document", 1) {
        warn!("Failed to record stage for job {}: {}", job_id, e);
    }

    let resolved = match input::resolve_input(&job.source, config.download_timeout_secs).await {
        Ok(r) => r,
        Err(e) => {
            warn!("Job {} failed resolving input: {}", job_id, e);
            fail(&e.to_string());
            return;
        }
    };

    let sink = JobSink {
        jobs: Arc::clone(jobs),
        job_id: job_id.to_string(),
        callback: config.progress_callback.clone(),
    };
    let detector = config.detector.clone();
    let dpi = job.params.dpi;
    let min_area_pct = job.params.min_area_pct;
    let job_dir = job.job_dir.clone();
    let cb = config.progress_callback.clone();
    let id_for_blocking = job_id.to_string();

    let result = tokio::task::spawn_blocking(move || {
        // `resolved` moves in so a downloaded temp file outlives the run.
        let pdf_path = resolved.path();
        if let Some(cb) = &cb {
            let pages = render::page_count(pdf_path)?;
            cb.on_job_start(&id_for_blocking, pages);
        }
        let run = PipelineRun {
            pdf_path,
            job_dir: &job_dir,
            dpi,
            min_area_pct,
            detector: detector.as_ref(),
            labeler: &QuadrantLabeler,
        };
        pipeline::run_blocking(&run, &sink)
    })
    .await;

    match result {
        Ok(Ok(manifest)) => {
            if let Err(e) = jobs.complete(job_id) {
                error!("Failed to record completion for job {}: {}", job_id, e);
            }
            if let Some(cb) = &callback {
                cb.on_job_complete(job_id, manifest.total);
            }
            info!("Job {} complete: {} assets", job_id, manifest.total);
        }
        Ok(Err(e)) => {
            warn!("Job {} failed: {}", job_id, e);
            fail(&e.to_string());
        }
        Err(join_err) => {
            error!("Job {} pipeline task panicked: {}", job_id, join_err);
            fail(&format!("Internal error: {join_err}"));
        }
    }
}
