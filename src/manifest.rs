//! The diagram-asset data model.
//!
//! The pipeline's durable output is a manifest listing every cropped
//! diagram it produced for a job; curation then narrows that down to a
//! selection record, and promotion turns selected entries into saved
//! assets under a project. All three records share the same identifying
//! fields (page number, label, sequence) so an asset can be traced from
//! crop to canonical file.

use crate::error::PlanliftError;
use crate::storage::Storage;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// How the primary region of a page was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provenance {
    /// The detector proposed a region and it was cropped with padding.
    Detected,
    /// No detector, or no usable detection: the full page stands in.
    FullPage,
}

/// One cropped diagram produced by the segmentation stage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiagramAsset {
    /// Crop filename inside the job's `sectioned/` directory,
    /// `crop{page}.png` or `crop{page}.{seq}.png`.
    pub filename: String,
    /// 1-based page number in the source document.
    pub page_num: usize,
    /// Position label: a quadrant name, `bottom`, or `full`.
    pub label: String,
    /// Sequence letter within the page (`a`–`d`), ordered by area.
    pub diagram_seq: String,
    /// 1-based index within the page.
    pub sub_index: usize,
    /// Path relative to the job directory, e.g. `sectioned/crop1.a.png`.
    pub path: String,
    /// Whether the page's primary region came from the detector.
    pub source: Provenance,
}

impl DiagramAsset {
    /// Crop filename for page `page` and optional sequence letter.
    pub fn crop_filename(page: usize, seq: Option<&str>) -> String {
        match seq {
            Some(s) => format!("crop{page}.{s}.png"),
            None => format!("crop{page}.png"),
        }
    }
}

/// The complete, ordered output of one job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    pub images: Vec<DiagramAsset>,
    pub total: usize,
    pub dpi: u32,
    pub generated_at: DateTime<Utc>,
}

impl Manifest {
    pub fn new(images: Vec<DiagramAsset>, dpi: u32) -> Self {
        Manifest {
            total: images.len(),
            images,
            dpi,
            generated_at: Utc::now(),
        }
    }

    pub fn write(&self, job_dir: &Path) -> Result<(), PlanliftError> {
        Storage::write_json(&Storage::manifest_path(job_dir), self)
    }

    pub fn read(job_dir: &Path) -> Result<Self, PlanliftError> {
        Storage::read_json(&Storage::manifest_path(job_dir))
    }
}

/// One image chosen during curation, as persisted in the selection record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectedImage {
    pub filename: String,
    pub page_number: usize,
    pub label: String,
    pub diagram_seq: String,
    pub sub_index: usize,
    /// Path of the crop inside `sectioned/`, relative to the job dir.
    pub original_path: String,
    /// Path of the staged copy, relative to the job dir.
    pub saved_path: String,
    pub url: String,
}

/// The curated subset of a job's manifest, written to `staged/selection.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SelectionRecord {
    pub total_selected: usize,
    pub timestamp: DateTime<Utc>,
    pub dpi: u32,
    pub images: Vec<SelectedImage>,
}

impl SelectionRecord {
    pub fn write(&self, job_dir: &Path) -> Result<(), PlanliftError> {
        Storage::write_json(&Storage::selection_path(job_dir), self)
    }

    pub fn read(job_dir: &Path) -> Result<Self, PlanliftError> {
        Storage::read_json(&Storage::selection_path(job_dir))
    }
}

/// A rectangular room cut out of a promoted floor-plan asset.
///
/// The polygon is stored as the caller supplied it, in unit fractions of
/// the parent image, so it can be re-rendered at any scale.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Room {
    pub id: String,
    pub name: String,
    /// Vertices as `[x, y]` pairs in unit fractions, 0–1.
    pub polygon: Vec<[f32; 2]>,
    /// Room image filename inside the project's `rooms/` directory.
    pub filename: String,
    pub url: String,
    pub created_at: DateTime<Utc>,
}

/// A promoted asset under a project, carried in the registry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SavedAsset {
    /// Canonical filename, `{project_id}_{page}_{seq}.png`.
    pub filename: String,
    pub page_number: usize,
    pub label: String,
    pub diagram_seq: String,
    pub sub_index: usize,
    /// The crop filename this asset was promoted from. Uploads that never
    /// went through the pipeline have no source crop.
    pub source_filename: Option<String>,
    pub url: String,
    #[serde(default)]
    pub rooms: Vec<Room>,
}

impl SavedAsset {
    /// Canonical promoted filename for one crop.
    pub fn canonical_filename(project_id: &str, page: usize, seq: &str) -> String {
        format!("{project_id}_{page}_{seq}.png")
    }
}
