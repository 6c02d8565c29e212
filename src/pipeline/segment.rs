//! Diagram segmentation: split a page crop into independent sub-diagrams.
//!
//! Floor-plan sheets often carry several disjoint drawings (elevations,
//! detail callouts) on one page. This stage finds connected ink regions in
//! the page crop and, when more than one is substantial, splits them into
//! separate assets with position labels.
//!
//! The algorithm is deliberately classical — grayscale, binarize, external
//! contours, bounding boxes — because plan line work is high-contrast and a
//! model-free split is predictable and fast:
//!
//! 1. luminance < 240 counts as ink (inverted binary mask);
//! 2. external contours of connected components, AABB + area each;
//! 3. drop regions below `min_area_ratio` of the image, sort by area;
//! 4. one region, or a region covering > 70% → no split, label `full`;
//! 5. otherwise up to four regions, labelled by quadrant geometry and
//!    lettered `a`–`d` in descending area order.
//!
//! Region geometry travels as percentages so the labeling heuristic is
//! resolution-independent; the final crop converts back to pixels with
//! clamping.

use crate::error::PlanliftError;
use crate::manifest::DiagramAsset;
use crate::pipeline::extract::{PageCrop, PixelBox};
use image::{DynamicImage, GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use tracing::debug;

/// Luminance cutoff: pixels darker than this are ink.
pub const INK_THRESHOLD: u8 = 240;

/// Maximum number of sub-diagrams split out of one page.
pub const MAX_REGIONS: usize = 4;

/// A single region covering more than this fraction of the image means the
/// page is one diagram, not several.
pub const DOMINANT_FRACTION: f32 = 0.70;

const SEQ_LETTERS: [&str; MAX_REGIONS] = ["a", "b", "c", "d"];

/// A candidate sub-diagram: the AABB of one connected ink component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InkRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl InkRegion {
    pub fn area(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

/// Region geometry as percentages of the image, 0–100 per axis.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercentBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl PercentBox {
    pub fn from_region(r: &InkRegion, img_width: u32, img_height: u32) -> Self {
        PercentBox {
            x: r.x as f32 / img_width as f32 * 100.0,
            y: r.y as f32 / img_height as f32 * 100.0,
            width: r.width as f32 / img_width as f32 * 100.0,
            height: r.height as f32 / img_height as f32 * 100.0,
        }
    }
}

/// Convert a percent box back to pixels, clamped inside the image.
pub fn percent_to_pixel(b: &PercentBox, img_width: u32, img_height: u32) -> PixelBox {
    let x = ((b.x / 100.0 * img_width as f32) as u32).min(img_width.saturating_sub(1));
    let y = ((b.y / 100.0 * img_height as f32) as u32).min(img_height.saturating_sub(1));
    let width = ((b.width / 100.0 * img_width as f32) as u32).clamp(1, img_width - x);
    let height = ((b.height / 100.0 * img_height as f32) as u32).clamp(1, img_height - y);
    PixelBox {
        x,
        y,
        width,
        height,
    }
}

/// Position-labeling strategy for split regions.
///
/// Behind a trait so the heuristic can be swapped (e.g. a grid scheme for
/// sheets with more than four drawings) without touching the splitter.
pub trait RegionLabeler: Send + Sync {
    fn label(&self, region: &PercentBox) -> String;
}

/// The default quadrant heuristic.
///
/// A region starting in the top 40% of the page is `top-left`/`top-right`
/// by horizontal position; otherwise `bottom-left`/`bottom-right`. A wide
/// region (over 60% of the width) in the lower half is just `bottom` —
/// typically a section strip spanning the sheet.
pub struct QuadrantLabeler;

impl RegionLabeler for QuadrantLabeler {
    fn label(&self, region: &PercentBox) -> String {
        if region.y > 50.0 && region.width > 60.0 {
            return "bottom".to_string();
        }
        let vertical = if region.y < 40.0 { "top" } else { "bottom" };
        let horizontal = if region.x < 50.0 { "left" } else { "right" };
        format!("{vertical}-{horizontal}")
    }
}

/// Binarize: ink (luminance < [`INK_THRESHOLD`]) becomes foreground.
///
/// The mask carries a one-pixel background border — the contour tracer
/// only emits an outer contour for components surrounded by background, so
/// without it any diagram flush with the crop edge would vanish.
fn ink_mask(image: &DynamicImage) -> GrayImage {
    let luma = image.to_luma8();
    GrayImage::from_fn(luma.width() + 2, luma.height() + 2, |x, y| {
        if x == 0 || y == 0 || x > luma.width() || y > luma.height() {
            return Luma([0u8]);
        }
        if luma.get_pixel(x - 1, y - 1)[0] < INK_THRESHOLD {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Find substantial connected ink regions, largest first.
///
/// `min_area_ratio` is a fraction of the full image area; components below
/// it (title blocks, north arrows, stray marks) are discarded.
pub fn find_ink_regions(image: &DynamicImage, min_area_ratio: f32) -> Vec<InkRegion> {
    let mask = ink_mask(image);
    let total = image.width() as u64 * image.height() as u64;
    let min_area = (total as f64 * min_area_ratio as f64) as u64;

    let mut regions: Vec<InkRegion> = find_contours::<i32>(&mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .filter_map(|c| {
            // Undo the mask's border offset.
            let xs = c.points.iter().map(|p| p.x - 1);
            let ys = c.points.iter().map(|p| p.y - 1);
            let x0 = xs.clone().min()?;
            let x1 = xs.max()?;
            let y0 = ys.clone().min()?;
            let y1 = ys.max()?;
            Some(InkRegion {
                x: x0 as u32,
                y: y0 as u32,
                width: (x1 - x0 + 1) as u32,
                height: (y1 - y0 + 1) as u32,
            })
        })
        .filter(|r| r.area() >= min_area)
        .collect();

    regions.sort_by(|a, b| b.area().cmp(&a.area()));
    regions
}

/// Segment one page crop, writing any sub-crops next to it and returning
/// the manifest entries for the page.
pub fn segment_page(
    crop: &PageCrop,
    min_area_pct: f32,
    labeler: &dyn RegionLabeler,
) -> Result<Vec<DiagramAsset>, PlanliftError> {
    let image = image::open(&crop.path).map_err(|e| PlanliftError::ImageDecodeFailed {
        path: crop.path.clone(),
        detail: e.to_string(),
    })?;

    let regions = find_ink_regions(&image, min_area_pct / 100.0);
    let total_area = image.width() as u64 * image.height() as u64;

    let dominant = regions
        .first()
        .is_some_and(|r| r.area() as f32 > total_area as f32 * DOMINANT_FRACTION);

    // One diagram per page: the primary crop itself is the asset.
    if regions.len() <= 1 || dominant {
        debug!(
            "Page {}: single diagram ({} region(s), dominant={})",
            crop.page_num,
            regions.len(),
            dominant
        );
        let filename = DiagramAsset::crop_filename(crop.page_num, None);
        return Ok(vec![DiagramAsset {
            path: format!("sectioned/{filename}"),
            filename,
            page_num: crop.page_num,
            label: "full".to_string(),
            diagram_seq: "a".to_string(),
            sub_index: 1,
            source: crop.source,
        }]);
    }

    let sectioned_dir = crop
        .path
        .parent()
        .ok_or_else(|| PlanliftError::Internal("crop path has no parent".into()))?;

    let mut assets = Vec::new();
    for (i, region) in regions.iter().take(MAX_REGIONS).enumerate() {
        let pct = PercentBox::from_region(region, image.width(), image.height());
        let label = labeler.label(&pct);
        let seq = SEQ_LETTERS[i];

        let b = percent_to_pixel(&pct, image.width(), image.height());
        let sub = image.crop_imm(b.x, b.y, b.width, b.height);

        let filename = DiagramAsset::crop_filename(crop.page_num, Some(seq));
        let path = sectioned_dir.join(&filename);
        sub.save(&path).map_err(|e| PlanliftError::ImageWriteFailed {
            path: path.clone(),
            detail: e.to_string(),
        })?;

        debug!(
            "Page {}: region {} '{}' {}x{} at ({},{})",
            crop.page_num, seq, label, b.width, b.height, b.x, b.y
        );

        assets.push(DiagramAsset {
            path: format!("sectioned/{filename}"),
            filename,
            page_num: crop.page_num,
            label,
            diagram_seq: seq.to_string(),
            sub_index: i + 1,
            source: crop.source,
        });
    }

    Ok(assets)
}

/// Run segmentation over every page crop, in page order.
pub fn segment_pages(
    crops: &[PageCrop],
    min_area_pct: f32,
    labeler: &dyn RegionLabeler,
    mut on_page: impl FnMut(usize, usize),
) -> Result<Vec<DiagramAsset>, PlanliftError> {
    let total = crops.len();
    let mut assets = Vec::new();
    for (done, crop) in crops.iter().enumerate() {
        assets.extend(segment_page(crop, min_area_pct, labeler)?);
        on_page(done + 1, total);
    }
    Ok(assets)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manifest::Provenance;
    use image::RgbImage;
    use std::path::{Path, PathBuf};

    /// White canvas with black rectangles at the given pixel boxes.
    fn plan_image(w: u32, h: u32, blocks: &[(u32, u32, u32, u32)]) -> DynamicImage {
        let img = RgbImage::from_fn(w, h, |x, y| {
            for &(bx, by, bw, bh) in blocks {
                if x >= bx && x < bx + bw && y >= by && y < by + bh {
                    return image::Rgb([0, 0, 0]);
                }
            }
            image::Rgb([255, 255, 255])
        });
        DynamicImage::ImageRgb8(img)
    }

    fn write_crop(dir: &Path, page_num: usize, image: &DynamicImage) -> PageCrop {
        let path = dir.join(format!("crop{page_num}.png"));
        image.save(&path).unwrap();
        PageCrop {
            page_num,
            path,
            width: image.width(),
            height: image.height(),
            source: Provenance::FullPage,
        }
    }

    #[test]
    fn quadrant_labels() {
        let l = QuadrantLabeler;
        let b = |x, y, w| PercentBox {
            x,
            y,
            width: w,
            height: 20.0,
        };
        assert_eq!(l.label(&b(10.0, 10.0, 30.0)), "top-left");
        assert_eq!(l.label(&b(60.0, 10.0, 30.0)), "top-right");
        assert_eq!(l.label(&b(10.0, 55.0, 30.0)), "bottom-left");
        assert_eq!(l.label(&b(60.0, 55.0, 30.0)), "bottom-right");
        // Wide strip in the lower half collapses to plain "bottom".
        assert_eq!(l.label(&b(10.0, 55.0, 70.0)), "bottom");
        // Wide but in the upper half: the override requires y > 50%.
        assert_eq!(l.label(&b(10.0, 10.0, 70.0)), "top-left");
    }

    #[test]
    fn percent_to_pixel_clamps() {
        let b = PercentBox {
            x: 99.0,
            y: 99.0,
            width: 50.0,
            height: 50.0,
        };
        let p = percent_to_pixel(&b, 200, 100);
        assert!(p.x < 200 && p.y < 100);
        assert!(p.x + p.width <= 200);
        assert!(p.y + p.height <= 100);
        assert!(p.width >= 1 && p.height >= 1);
    }

    #[test]
    fn blank_page_is_single_full_asset() {
        let dir = tempfile::tempdir().unwrap();
        let img = plan_image(400, 300, &[]);
        let crop = write_crop(dir.path(), 1, &img);

        let assets = segment_page(&crop, 5.0, &QuadrantLabeler).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].label, "full");
        assert_eq!(assets[0].diagram_seq, "a");
        assert_eq!(assets[0].filename, "crop1.png");
    }

    #[test]
    fn dominant_region_prevents_split() {
        let dir = tempfile::tempdir().unwrap();
        // One block covering ~84% of the page plus a small one: no split.
        let img = plan_image(400, 300, &[(10, 10, 366, 276), (2, 2, 4, 4)]);
        let crop = write_crop(dir.path(), 2, &img);

        let assets = segment_page(&crop, 0.0, &QuadrantLabeler).unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!(assets[0].label, "full");
        assert_eq!(assets[0].filename, "crop2.png");
    }

    #[test]
    fn two_diagonal_regions_split_with_quadrant_labels() {
        let dir = tempfile::tempdir().unwrap();
        // Larger block top-left, smaller block bottom-right.
        let img = plan_image(
            1000,
            1000,
            &[(50, 50, 400, 300), (600, 600, 300, 250)],
        );
        let crop = write_crop(dir.path(), 3, &img);

        let assets = segment_page(&crop, 5.0, &QuadrantLabeler).unwrap();
        assert_eq!(assets.len(), 2);

        assert_eq!(assets[0].label, "top-left");
        assert_eq!(assets[0].diagram_seq, "a");
        assert_eq!(assets[0].sub_index, 1);
        assert_eq!(assets[0].filename, "crop3.a.png");

        assert_eq!(assets[1].label, "bottom-right");
        assert_eq!(assets[1].diagram_seq, "b");
        assert_eq!(assets[1].filename, "crop3.b.png");

        assert!(dir.path().join("crop3.a.png").exists());
        assert!(dir.path().join("crop3.b.png").exists());
    }

    #[test]
    fn tiny_regions_filtered_by_min_area() {
        let dir = tempfile::tempdir().unwrap();
        // Two real diagrams plus specks that must not become assets.
        let img = plan_image(
            1000,
            1000,
            &[
                (50, 50, 400, 300),
                (600, 600, 300, 250),
                (980, 10, 8, 8),
                (10, 980, 6, 6),
            ],
        );
        let crop = write_crop(dir.path(), 4, &img);

        let assets = segment_page(&crop, 5.0, &QuadrantLabeler).unwrap();
        assert_eq!(assets.len(), 2);
    }

    #[test]
    fn at_most_four_regions() {
        let dir = tempfile::tempdir().unwrap();
        // Five well-separated blocks; only the four largest survive.
        let img = plan_image(
            1000,
            1000,
            &[
                (10, 10, 300, 280),
                (520, 10, 300, 260),
                (10, 520, 300, 240),
                (520, 520, 300, 220),
                (400, 350, 150, 150),
            ],
        );
        let crop = write_crop(dir.path(), 5, &img);

        let assets = segment_page(&crop, 2.0, &QuadrantLabeler).unwrap();
        assert_eq!(assets.len(), 4);
        let seqs: Vec<&str> = assets.iter().map(|a| a.diagram_seq.as_str()).collect();
        assert_eq!(seqs, vec!["a", "b", "c", "d"]);
    }

    #[test]
    fn find_ink_regions_orders_by_descending_area() {
        let img = plan_image(1000, 1000, &[(0, 0, 100, 100), (500, 500, 300, 300)]);
        let regions = find_ink_regions(&img, 0.001);
        assert_eq!(regions.len(), 2);
        assert!(regions[0].area() > regions[1].area());
        assert_eq!((regions[0].x, regions[0].y), (500, 500));
    }

    #[test]
    fn edge_flush_region_detected() {
        // A diagram touching the crop edge must still be found; crops padded
        // by only a few pixels routinely put ink at (0,0).
        let img = plan_image(200, 200, &[(0, 0, 80, 60)]);
        let regions = find_ink_regions(&img, 0.01);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].x, regions[0].y), (0, 0));
        assert_eq!((regions[0].width, regions[0].height), (80, 60));
    }

    #[test]
    fn full_bleed_ink_covers_whole_image() {
        let img = plan_image(120, 90, &[(0, 0, 120, 90)]);
        let regions = find_ink_regions(&img, 0.5);
        assert_eq!(regions.len(), 1);
        assert_eq!((regions[0].width, regions[0].height), (120, 90));
    }

    #[test]
    fn region_bbox_matches_block() {
        let img = plan_image(400, 300, &[(40, 30, 120, 90)]);
        let regions = find_ink_regions(&img, 0.01);
        assert_eq!(regions.len(), 1);
        let r = regions[0];
        assert_eq!((r.x, r.y), (40, 30));
        assert_eq!((r.width, r.height), (120, 90));
    }

    #[test]
    fn segment_pages_reports_progress() {
        let dir = tempfile::tempdir().unwrap();
        let crops: Vec<PageCrop> = (1..=3)
            .map(|n| write_crop(dir.path(), n, &plan_image(200, 200, &[])))
            .collect();

        let mut seen: Vec<(usize, usize)> = Vec::new();
        let assets =
            segment_pages(&crops, 5.0, &QuadrantLabeler, |done, total| {
                seen.push((done, total))
            })
            .unwrap();
        assert_eq!(assets.len(), 3);
        assert_eq!(seen, vec![(1, 3), (2, 3), (3, 3)]);
    }

    #[test]
    fn unreadable_crop_is_decode_error() {
        let crop = PageCrop {
            page_num: 9,
            path: PathBuf::from("/nonexistent/crop9.png"),
            width: 0,
            height: 0,
            source: Provenance::FullPage,
        };
        let err = segment_page(&crop, 5.0, &QuadrantLabeler).unwrap_err();
        assert!(matches!(err, PlanliftError::ImageDecodeFailed { .. }));
    }
}
