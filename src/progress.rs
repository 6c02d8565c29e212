//! Progress bands and the job-progress callback trait.
//!
//! The job record in [`crate::job::JobStore`] is the durable source of truth
//! for progress; callers poll it. The callback here is a second, optional
//! channel for in-process observers (the CLI progress bar, tests) that want
//! events without polling. Implementations must be `Send + Sync` because
//! jobs run on worker tasks.
//!
//! # Bands
//!
//! Each stage owns a fixed slice of the 0–100 progress range, matching the
//! step labels a polling client displays:
//!
//! ```text
//! [ 5..30]  rasterisation, linear over pages
//! [30..60]  primary-region extraction, linear over pages
//! [62..97]  diagram segmentation, linear over pages
//! [97..100] manifest write
//! ```

use std::sync::Arc;

/// A contiguous slice of the 0–100 progress range owned by one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Band {
    pub start: u8,
    pub end: u8,
}

/// Band for the rasterisation stage.
pub const BAND_RASTERISE: Band = Band { start: 5, end: 30 };
/// Band for the primary-region extraction stage.
pub const BAND_EXTRACT: Band = Band { start: 30, end: 60 };
/// Band for the diagram segmentation stage.
pub const BAND_SEGMENT: Band = Band { start: 62, end: 97 };
/// Band for the manifest write.
pub const BAND_FINALISE: Band = Band { start: 97, end: 100 };

impl Band {
    /// Map `done` of `total` units linearly into this band.
    ///
    /// `total == 0` pins the value to the band start so an empty document
    /// never divides by zero or jumps backwards.
    pub fn at(&self, done: usize, total: usize) -> u8 {
        if total == 0 {
            return self.start;
        }
        let span = (self.end - self.start) as usize;
        let v = self.start as usize + span * done.min(total) / total;
        v as u8
    }
}

/// Called by the pipeline as a job moves through its stages.
///
/// All methods have default no-op implementations so observers only
/// override what they care about.
pub trait JobProgressCallback: Send + Sync {
    /// Called once when a worker picks the job up, before any stage runs.
    ///
    /// # Arguments
    /// * `job_id`      — the job being processed
    /// * `total_pages` — page count of the source document
    fn on_job_start(&self, job_id: &str, total_pages: usize) {
        let _ = (job_id, total_pages);
    }

    /// Called at each stage boundary with the human-readable step label.
    fn on_stage_start(&self, job_id: &str, step: &str) {
        let _ = (job_id, step);
    }

    /// Called whenever the job's progress value advances.
    fn on_progress(&self, job_id: &str, progress: u8) {
        let _ = (job_id, progress);
    }

    /// Called once when the job reaches `done`, with the manifest size.
    fn on_job_complete(&self, job_id: &str, total_assets: usize) {
        let _ = (job_id, total_assets);
    }

    /// Called once when the job reaches `error`.
    fn on_job_error(&self, job_id: &str, error: String) {
        let _ = (job_id, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopJobProgress;

impl JobProgressCallback for NoopJobProgress {}

/// Convenience alias matching the type stored in [`crate::config::PipelineConfig`].
pub type ProgressCallback = Arc<dyn JobProgressCallback>;
