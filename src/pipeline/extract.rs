//! Primary-region extraction: find the dominant content area of each page.
//!
//! A pretrained layout detector is optional and injected behind the
//! [`RegionDetector`] trait; this crate ships no model runtime. Without a
//! detector (or when detection fails for a page) the page falls back to
//! itself unmodified — degradation is recorded in the job's step
//! annotation, never as an error.
//!
//! Scoring and padding are pure functions so the selection rules can be
//! tested without a model: a candidate box scores `confidence × area`,
//! multiplied by 10 when its class is primary content (figures, tables).
//! The multiplier is what lets a low-confidence table beat a confident
//! block of running text of the same size.

use crate::error::PlanliftError;
use crate::manifest::Provenance;
use crate::pipeline::render::RenderedPage;
use image::DynamicImage;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, warn};

/// Padding applied around the winning box before cropping, in pixels.
pub const REGION_PAD_PX: u32 = 10;

/// Class priority multiplier for primary content.
pub const PRIORITY_FACTOR: f32 = 10.0;

/// Layout classes a detector may report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegionClass {
    Figure,
    Table,
    PlainText,
    TableFootnote,
    FigureCaption,
    TableCaption,
    Abandon,
    /// Any class this pipeline has no special handling for.
    Other(String),
}

impl RegionClass {
    /// Classes that can never be the primary region.
    pub fn is_ignored(&self) -> bool {
        matches!(
            self,
            RegionClass::Abandon
                | RegionClass::PlainText
                | RegionClass::TableFootnote
                | RegionClass::FigureCaption
                | RegionClass::TableCaption
        )
    }

    /// Classes that get the ×10 priority multiplier.
    pub fn is_priority(&self) -> bool {
        matches!(self, RegionClass::Figure | RegionClass::Table)
    }
}

/// One candidate box from the detector, in page-pixel coordinates.
#[derive(Debug, Clone)]
pub struct DetectedRegion {
    pub class: RegionClass,
    /// Detector confidence in [0, 1].
    pub confidence: f32,
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl DetectedRegion {
    pub fn area(&self) -> f32 {
        self.width * self.height
    }
}

/// A pretrained region detector. Implementations own their model lifecycle;
/// the pipeline only calls `detect` per page image.
pub trait RegionDetector: Send + Sync {
    /// Short identifier used in logs and step annotations.
    fn name(&self) -> &str;

    /// Detect candidate layout regions in one page raster.
    fn detect(&self, image: &DynamicImage) -> Result<Vec<DetectedRegion>, PlanliftError>;
}

/// Score a candidate: `confidence × area`, ×10 for priority classes.
pub fn score_region(region: &DetectedRegion) -> f32 {
    let base = region.confidence * region.area();
    if region.class.is_priority() {
        base * PRIORITY_FACTOR
    } else {
        base
    }
}

/// Pick the maximum-scoring candidate after dropping ignored classes.
///
/// Returns `None` when nothing survives filtering — the caller falls back
/// to the full page.
pub fn select_primary(regions: &[DetectedRegion]) -> Option<&DetectedRegion> {
    regions
        .iter()
        .filter(|r| !r.class.is_ignored())
        .max_by(|a, b| score_region(a).total_cmp(&score_region(b)))
}

/// A crop rectangle in whole pixels, guaranteed inside the image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pad the winning box by [`REGION_PAD_PX`] on all sides, clamped to the
/// image bounds, and round to whole pixels.
pub fn pad_and_clamp(region: &DetectedRegion, img_width: u32, img_height: u32) -> PixelBox {
    let pad = REGION_PAD_PX as f32;
    let x0 = (region.x - pad).max(0.0);
    let y0 = (region.y - pad).max(0.0);
    let x1 = (region.x + region.width + pad).min(img_width as f32);
    let y1 = (region.y + region.height + pad).min(img_height as f32);

    let x = (x0 as u32).min(img_width.saturating_sub(1));
    let y = (y0 as u32).min(img_height.saturating_sub(1));
    PixelBox {
        x,
        y,
        width: ((x1 as u32).saturating_sub(x)).clamp(1, img_width - x),
        height: ((y1 as u32).saturating_sub(y)).clamp(1, img_height - y),
    }
}

/// One page's primary-region crop, persisted under `sectioned/`.
#[derive(Debug, Clone)]
pub struct PageCrop {
    /// 1-based page number.
    pub page_num: usize,
    /// `sectioned/crop{page}.png` path.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
    pub source: Provenance,
}

/// Run the primary-region stage over every rendered page.
///
/// Each page's crop lands at `{sectioned_dir}/crop{page}.png`. A per-page
/// detector failure degrades that page to a full-page crop with a warning.
pub fn extract_primary_regions(
    pages: &[RenderedPage],
    sectioned_dir: &Path,
    detector: Option<&Arc<dyn RegionDetector>>,
    mut on_page: impl FnMut(usize, usize),
) -> Result<Vec<PageCrop>, PlanliftError> {
    std::fs::create_dir_all(sectioned_dir).map_err(|e| PlanliftError::io(sectioned_dir, e))?;

    let total = pages.len();
    let mut crops = Vec::with_capacity(total);

    for (done, page) in pages.iter().enumerate() {
        let image = image::open(&page.path).map_err(|e| PlanliftError::ImageDecodeFailed {
            path: page.path.clone(),
            detail: e.to_string(),
        })?;

        let (cropped, source) = match detector {
            Some(d) => match d.detect(&image) {
                Ok(regions) => match select_primary(&regions) {
                    Some(winner) => {
                        let b = pad_and_clamp(winner, image.width(), image.height());
                        debug!(
                            "Page {}: {:?} at ({},{}) {}x{}",
                            page.page_num, winner.class, b.x, b.y, b.width, b.height
                        );
                        (
                            image.crop_imm(b.x, b.y, b.width, b.height),
                            Provenance::Detected,
                        )
                    }
                    None => {
                        debug!("Page {}: no usable detection, using full page", page.page_num);
                        (image, Provenance::FullPage)
                    }
                },
                Err(e) => {
                    warn!(
                        "Detector '{}' failed on page {}: {} — using full page",
                        d.name(),
                        page.page_num,
                        e
                    );
                    (image, Provenance::FullPage)
                }
            },
            None => (image, Provenance::FullPage),
        };

        let path = sectioned_dir.join(format!("crop{}.png", page.page_num));
        cropped
            .save(&path)
            .map_err(|e| PlanliftError::ImageWriteFailed {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        crops.push(PageCrop {
            page_num: page.page_num,
            path,
            width: cropped.width(),
            height: cropped.height(),
            source,
        });
        on_page(done + 1, total);
    }

    Ok(crops)
}
