//! # planlift
//!
//! Turn floor-plan PDFs into curated, per-project libraries of diagram
//! images.
//!
//! ## Why this crate?
//!
//! Architectural document sets bundle several drawings onto every sheet —
//! plans, elevations, detail callouts, title blocks. Feeding whole pages to
//! downstream tooling (measurement, labeling, viewers) wastes most of each
//! image on furniture. This crate rasterises each page, crops it to its
//! primary content region, splits pages that carry multiple independent
//! diagrams, and manages the result as a durable per-project asset registry
//! that a user can curate and decompose into named room crops.
//!
//! ## Pipeline Overview
//!
//! ```text
//! PDF
//!  │
//!  ├─ 1. Input     resolve local file or download from URL
//!  ├─ 2. Render    rasterise pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 3. Extract   crop each page to its primary region (optional detector)
//!  ├─ 4. Segment   split disjoint sub-diagrams, label by quadrant
//!  └─ 5. Manifest  one entry per candidate diagram, served over /files/
//!
//! then, per project:
//!
//!  select → promote → update (add/remove) → extract rooms
//! ```
//!
//! Jobs run on a bounded worker pool and are polled through their durable
//! records; promotion relocates a job's output into a project folder with
//! canonical asset names and a crash-recoverable registry.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use planlift::{JobController, PipelineConfig, RegistryService};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = PipelineConfig::builder("/var/lib/planlift").build()?;
//!     let controller = JobController::new(config)?;
//!
//!     let job = controller.submit("site-plans.pdf").await?;
//!     // ... poll controller.get(&job.id) until status is done ...
//!
//!     let registry = RegistryService::new(
//!         controller.storage().clone(),
//!         Arc::clone(controller.jobs()),
//!     );
//!     for image in registry.list_manifest(&job.id)? {
//!         println!("{} ({})", image.asset.filename, image.asset.label);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `planlift` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library to avoid pulling in CLI-only deps:
//! ```toml
//! planlift = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod controller;
pub mod error;
pub mod job;
pub mod manifest;
pub mod pipeline;
pub mod progress;
pub mod registry;
pub mod rooms;
pub mod storage;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{PipelineConfig, PipelineConfigBuilder};
pub use controller::JobController;
pub use error::PlanliftError;
pub use job::{JobStatus, JobStore, ProcessingJob};
pub use manifest::{DiagramAsset, Manifest, Provenance, Room, SavedAsset, SelectionRecord};
pub use pipeline::extract::{DetectedRegion, RegionClass, RegionDetector};
pub use pipeline::segment::{QuadrantLabeler, RegionLabeler};
pub use progress::{JobProgressCallback, NoopJobProgress, ProgressCallback};
pub use registry::{ManifestImage, RegistryService};
pub use rooms::RoomSpec;
pub use storage::Storage;
pub use store::{ProjectDocument, ProjectStore};
