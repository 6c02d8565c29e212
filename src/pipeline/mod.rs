//! The extraction pipeline: source document in, diagram manifest out.
//!
//! Stages run strictly in order, each reading the previous stage's output
//! from the job directory:
//!
//! 1. [`input`]   — resolve a path or URL to a local, validated PDF;
//! 2. [`render`]  — rasterise every page to `pages/` via pdfium;
//! 3. [`extract`] — crop each page to its primary region (`sectioned/`);
//! 4. [`segment`] — split multi-diagram crops and emit manifest entries.
//!
//! Input resolution is async (it may download); everything after it is
//! CPU-bound and runs as one blocking unit via [`run_blocking`], called
//! inside `spawn_blocking` by the job controller. Stage boundaries and
//! per-page completions are reported through [`StageSink`] so the caller
//! can update the job record without this module knowing about job stores.

pub mod extract;
pub mod input;
pub mod render;
pub mod segment;

use crate::error::PlanliftError;
use crate::manifest::Manifest;
use crate::progress::{BAND_EXTRACT, BAND_FINALISE, BAND_RASTERISE, BAND_SEGMENT};
use crate::storage::Storage;
use extract::RegionDetector;
use segment::RegionLabeler;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Receives stage transitions and progress from a running pipeline.
pub trait StageSink {
    /// A new stage begins; `progress` is the start of its band.
    fn stage(&self, step: &str, progress: u8);
    /// Progress advanced within the current stage.
    fn progress(&self, progress: u8);
}

/// Sink for callers that don't track progress (tests, one-shot tools).
pub struct NoopSink;

impl StageSink for NoopSink {
    fn stage(&self, _step: &str, _progress: u8) {}
    fn progress(&self, _progress: u8) {}
}

/// Everything one pipeline run needs, borrowed from the controller.
pub struct PipelineRun<'a> {
    /// Local PDF path, already resolved and validated.
    pub pdf_path: &'a Path,
    pub job_dir: &'a Path,
    pub dpi: u32,
    pub min_area_pct: f32,
    pub detector: Option<&'a Arc<dyn RegionDetector>>,
    pub labeler: &'a dyn RegionLabeler,
}

/// Run the full pipeline for one job. Blocking; call from `spawn_blocking`.
///
/// On success the manifest has been written to
/// `{job_dir}/sectioned/manifest.json` and is also returned.
pub fn run_blocking(run: &PipelineRun<'_>, sink: &dyn StageSink) -> Result<Manifest, PlanliftError> {
    let pages_dir = Storage::pages_dir(run.job_dir);
    let sectioned_dir = Storage::sectioned_dir(run.job_dir);

    sink.stage(
        &format!("Step 1/3 — Rasterising pages at {} DPI", run.dpi),
        BAND_RASTERISE.start,
    );
    let pages = render::rasterise_pages(run.pdf_path, &pages_dir, run.dpi, |done, total| {
        sink.progress(BAND_RASTERISE.at(done, total))
    })?;

    let step2 = match run.detector {
        Some(d) => format!("Step 2/3 — Extracting primary regions ({})", d.name()),
        None => "Step 2/3 — Extracting primary regions (no detector — using full pages)"
            .to_string(),
    };
    sink.stage(&step2, BAND_EXTRACT.start);
    let crops =
        extract::extract_primary_regions(&pages, &sectioned_dir, run.detector, |done, total| {
            sink.progress(BAND_EXTRACT.at(done, total))
        })?;

    sink.stage("Step 3/3 — Segmenting diagrams", BAND_SEGMENT.start);
    let assets = segment::segment_pages(&crops, run.min_area_pct, run.labeler, |done, total| {
        sink.progress(BAND_SEGMENT.at(done, total))
    })?;

    sink.stage("Finalising — writing manifest", BAND_FINALISE.start);
    let manifest = Manifest::new(assets, run.dpi);
    manifest.write(run.job_dir)?;
    sink.progress(BAND_FINALISE.end);

    info!(
        "Pipeline finished: {} pages, {} assets",
        pages.len(),
        manifest.total
    );
    Ok(manifest)
}
