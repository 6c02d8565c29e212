//! Configuration for the extraction pipeline and its worker pool.
//!
//! All behaviour is controlled through [`PipelineConfig`], built via
//! [`PipelineConfigBuilder`]. Keeping every knob in one struct makes it
//! trivial to share the config across worker tasks and to diff two runs to
//! understand why their manifests differ.
//!
//! # Design choice: builder over constructor
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest; new fields never break call sites.

use crate::error::PlanliftError;
use crate::pipeline::extract::RegionDetector;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Configuration for a [`crate::controller::JobController`].
///
/// # Example
/// ```rust
/// use planlift::PipelineConfig;
///
/// let config = PipelineConfig::builder("/var/lib/planlift")
///     .dpi(300)
///     .min_area_pct(5.0)
///     .workers(2)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct PipelineConfig {
    /// Root directory for all job and project storage. Required.
    ///
    /// Layout under the root: `jobs/` (records + job-scoped dirs),
    /// `projects/` (promoted, project-scoped dirs), `documents/`
    /// (structured per-project records).
    pub storage_root: PathBuf,

    /// Rendering DPI used when rasterising each page. Range: 72–600. Default: 300.
    ///
    /// Floor plans carry thin wall lines and small room labels; 300 DPI keeps
    /// both legible after segmentation crops. Lower values speed up large
    /// documents at the cost of crop quality.
    pub dpi: u32,

    /// Minimum sub-diagram area as a percentage of page-crop area.
    /// Range: 0–100. Default: 5.0.
    ///
    /// Connected components smaller than this (title blocks, north arrows,
    /// stray marks) are never treated as independent diagrams.
    pub min_area_pct: f32,

    /// Number of worker tasks consuming the job queue. Default: 2.
    ///
    /// Each job is CPU-bound (pdfium + image ops) and runs on a blocking
    /// thread, so more workers than cores buys nothing.
    pub workers: usize,

    /// Optional pretrained region detector for the primary-region stage.
    ///
    /// `None` is not an error: every page falls back to itself unmodified
    /// and the degradation is recorded in the job's step annotation.
    pub detector: Option<Arc<dyn RegionDetector>>,

    /// Optional in-process progress observer (the CLI bar, tests).
    pub progress_callback: Option<ProgressCallback>,

    /// Download timeout for URL source references in seconds. Default: 120.
    pub download_timeout_secs: u64,
}

impl PipelineConfig {
    /// Create a builder rooted at `storage_root`.
    pub fn builder(storage_root: impl Into<PathBuf>) -> PipelineConfigBuilder {
        PipelineConfigBuilder {
            config: PipelineConfig {
                storage_root: storage_root.into(),
                dpi: 300,
                min_area_pct: 5.0,
                workers: 2,
                detector: None,
                progress_callback: None,
                download_timeout_secs: 120,
            },
        }
    }
}

impl fmt::Debug for PipelineConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineConfig")
            .field("storage_root", &self.storage_root)
            .field("dpi", &self.dpi)
            .field("min_area_pct", &self.min_area_pct)
            .field("workers", &self.workers)
            .field("detector", &self.detector.as_ref().map(|d| d.name()))
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn JobProgressCallback>"),
            )
            .field("download_timeout_secs", &self.download_timeout_secs)
            .finish()
    }
}

/// Builder for [`PipelineConfig`].
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    pub fn dpi(mut self, dpi: u32) -> Self {
        self.config.dpi = dpi.clamp(72, 600);
        self
    }

    pub fn min_area_pct(mut self, pct: f32) -> Self {
        self.config.min_area_pct = pct.clamp(0.0, 100.0);
        self
    }

    pub fn workers(mut self, n: usize) -> Self {
        self.config.workers = n.max(1);
        self
    }

    pub fn detector(mut self, detector: Arc<dyn RegionDetector>) -> Self {
        self.config.detector = Some(detector);
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.config.download_timeout_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<PipelineConfig, PlanliftError> {
        let c = &self.config;
        if c.storage_root.as_os_str().is_empty() {
            return Err(PlanliftError::InvalidConfig(
                "storage_root must not be empty".into(),
            ));
        }
        if !(72..=600).contains(&c.dpi) {
            return Err(PlanliftError::InvalidConfig(format!(
                "DPI must be 72–600, got {}",
                c.dpi
            )));
        }
        if !(0.0..=100.0).contains(&c.min_area_pct) {
            return Err(PlanliftError::InvalidConfig(format!(
                "min_area_pct must be 0–100, got {}",
                c.min_area_pct
            )));
        }
        if c.workers == 0 {
            return Err(PlanliftError::InvalidConfig("workers must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}
