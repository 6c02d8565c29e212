//! PDF rasterisation: render every page to a PNG on disk via pdfium.
//!
//! ## Why a blocking function?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. The whole pipeline for one job runs inside a single
//! `spawn_blocking` call (see [`crate::controller`]), so this stage is a
//! plain blocking function rather than async-with-inner-spawn.
//!
//! ## Why render at `dpi / 72`?
//!
//! PDF user space is 72 units per inch, so scaling the page by `dpi / 72`
//! yields a raster whose pixel density is exactly the requested DPI.
//! Floor-plan line work survives downstream crops at 300 DPI; the config
//! clamps the range so a typo can't produce a gigapixel render.

use crate::error::PlanliftError;
use image::DynamicImage;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// One page rendered to disk.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// 1-based page number.
    pub page_num: usize,
    /// PNG path under the job's `pages/` directory.
    pub path: PathBuf,
    pub width: u32,
    pub height: u32,
}

/// Filename for a rendered page, `page_{n}_{dpi}dpi.png`.
pub fn page_filename(page_num: usize, dpi: u32) -> String {
    format!("page_{page_num}_{dpi}dpi.png")
}

/// Rasterise every page of `pdf_path` into `pages_dir`.
///
/// `on_page(done, total)` is invoked after each page lands on disk so the
/// caller can advance job progress. Page order is preserved.
pub fn rasterise_pages(
    pdf_path: &Path,
    pages_dir: &Path,
    dpi: u32,
    mut on_page: impl FnMut(usize, usize),
) -> Result<Vec<RenderedPage>, PlanliftError> {
    std::fs::create_dir_all(pages_dir).map_err(|e| PlanliftError::io(pages_dir, e))?;

    let pdfium = Pdfium::default();
    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| PlanliftError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {} pages", total);

    let render_config = PdfRenderConfig::new().scale_page_by_factor(dpi as f32 / 72.0);

    let mut results = Vec::with_capacity(total);
    for (idx, page) in pages.iter().enumerate() {
        let page_num = idx + 1;
        let bitmap =
            page.render_with_config(&render_config)
                .map_err(|e| PlanliftError::RasterisationFailed {
                    page: page_num,
                    detail: format!("{:?}", e),
                })?;

        let image: DynamicImage = bitmap.as_image();
        let path = pages_dir.join(page_filename(page_num, dpi));
        image
            .save(&path)
            .map_err(|e| PlanliftError::ImageWriteFailed {
                path: path.clone(),
                detail: e.to_string(),
            })?;

        debug!(
            "Rendered page {} → {}x{} px ({})",
            page_num,
            image.width(),
            image.height(),
            path.display()
        );

        results.push(RenderedPage {
            page_num,
            path,
            width: image.width(),
            height: image.height(),
        });
        on_page(page_num, total);
    }

    Ok(results)
}

/// Page count of a PDF without rendering anything.
pub fn page_count(pdf_path: &Path) -> Result<usize, PlanliftError> {
    let pdfium = Pdfium::default();
    let document =
        pdfium
            .load_pdf_from_file(pdf_path, None)
            .map_err(|e| PlanliftError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: format!("{:?}", e),
            })?;
    Ok(document.pages().len() as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_filename_shape() {
        assert_eq!(page_filename(1, 300), "page_1_300dpi.png");
        assert_eq!(page_filename(12, 150), "page_12_150dpi.png");
    }

    // Rendering itself needs a pdfium shared library and a real PDF;
    // covered by the gated end-to-end tests.
}
