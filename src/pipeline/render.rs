//! PDF rasterisation: render pages to `DynamicImage` via pdfium.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves the work onto the blocking
//! thread pool so Tokio workers never stall during CPU-heavy rendering.
//!
//! ## Resource discipline
//!
//! The document handle lives entirely inside the blocking closure and is
//! dropped on every exit path, including errors — there is no way for a
//! failed page to leak an open document.

use crate::error::AnalysisError;
use crate::progress::ProgressCallback;
use image::DynamicImage;
use pdfium_render::prelude::*;
use tracing::{debug, info};

/// PDF page points per inch; zoom factor is `dpi / 72`.
const PDF_POINTS_PER_INCH: f32 = 72.0;

/// Renders PDF documents into ordered page images at a fixed DPI.
pub struct PdfRenderer {
    dpi: u32,
}

impl PdfRenderer {
    /// Create a renderer with the given DPI.
    pub fn new(dpi: u32) -> Self {
        Self { dpi }
    }

    /// Process-wide shared instance, configured from the environment on
    /// first use. Holds only the DPI setting; safe to share across
    /// concurrent requests.
    pub fn shared() -> &'static PdfRenderer {
        static RENDERER: once_cell::sync::OnceCell<PdfRenderer> = once_cell::sync::OnceCell::new();
        RENDERER.get_or_init(|| PdfRenderer::new(crate::config::ServiceConfig::from_env().dpi))
    }

    /// Rasterise every page of a PDF, in document order.
    ///
    /// `progress` (if given) is invoked inline after each page with
    /// `(completed, total)`.
    pub async fn render_pages(
        &self,
        pdf_bytes: Vec<u8>,
        progress: Option<ProgressCallback>,
    ) -> Result<Vec<DynamicImage>, AnalysisError> {
        let dpi = self.dpi;
        tokio::task::spawn_blocking(move || render_pages_blocking(&pdf_bytes, dpi, progress))
            .await
            .map_err(|e| AnalysisError::Internal(format!("Render task panicked: {e}")))?
    }

    /// Rasterise a single page (0-indexed).
    ///
    /// # Errors
    /// [`AnalysisError::PageOutOfRange`] when `page_index` is past the end
    /// of the document.
    pub async fn render_single_page(
        &self,
        pdf_bytes: Vec<u8>,
        page_index: usize,
    ) -> Result<DynamicImage, AnalysisError> {
        let dpi = self.dpi;
        tokio::task::spawn_blocking(move || render_single_page_blocking(&pdf_bytes, dpi, page_index))
            .await
            .map_err(|e| AnalysisError::Internal(format!("Render task panicked: {e}")))?
    }

    /// Number of pages in a PDF, without rendering anything.
    pub async fn page_count(&self, pdf_bytes: Vec<u8>) -> Result<usize, AnalysisError> {
        tokio::task::spawn_blocking(move || {
            let pdfium = Pdfium::default();
            let document = open_document(&pdfium, &pdf_bytes)?;
            Ok(document.pages().len() as usize)
        })
        .await
        .map_err(|e| AnalysisError::Internal(format!("Page-count task panicked: {e}")))?
    }
}

/// Target pixel width for a page of `points_width` PDF points at `dpi`.
fn target_width(points_width: f32, dpi: u32) -> i32 {
    (points_width * dpi as f32 / PDF_POINTS_PER_INCH).round() as i32
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    pdf_bytes: &'a [u8],
) -> Result<PdfDocument<'a>, AnalysisError> {
    pdfium
        .load_pdf_from_byte_slice(pdf_bytes, None)
        .map_err(|e| AnalysisError::CorruptPdf {
            detail: format!("{e:?}"),
        })
}

fn render_page(page: &PdfPage<'_>, index: usize, dpi: u32) -> Result<DynamicImage, AnalysisError> {
    let config = PdfRenderConfig::new().set_target_width(target_width(page.width().value, dpi));

    let bitmap = page
        .render_with_config(&config)
        .map_err(|e| AnalysisError::RenderFailed {
            page: index + 1,
            detail: format!("{e:?}"),
        })?;

    Ok(bitmap.as_image())
}

fn render_pages_blocking(
    pdf_bytes: &[u8],
    dpi: u32,
    progress: Option<ProgressCallback>,
) -> Result<Vec<DynamicImage>, AnalysisError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, pdf_bytes)?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!("PDF loaded: {total} pages, rendering at {dpi} DPI");

    let mut images = Vec::with_capacity(total);

    for (index, page) in pages.iter().enumerate() {
        let image = render_page(&page, index, dpi)?;
        debug!(
            "Rendered page {}/{} → {}x{} px",
            index + 1,
            total,
            image.width(),
            image.height()
        );
        images.push(image);

        if let Some(ref cb) = progress {
            cb.on_page_rendered(index + 1, total);
        }
    }

    Ok(images)
}

fn render_single_page_blocking(
    pdf_bytes: &[u8],
    dpi: u32,
    page_index: usize,
) -> Result<DynamicImage, AnalysisError> {
    let pdfium = Pdfium::default();
    let document = open_document(&pdfium, pdf_bytes)?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page_index >= total {
        return Err(AnalysisError::PageOutOfRange {
            page: page_index,
            total,
        });
    }

    let page = pages
        .get(page_index as u16)
        .map_err(|e| AnalysisError::RenderFailed {
            page: page_index + 1,
            detail: format!("{e:?}"),
        })?;

    render_page(&page, page_index, dpi)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zoom_factor_is_dpi_over_72() {
        // US Letter is 612 points wide; 200 DPI → 612 · 200/72 = 1700 px.
        assert_eq!(target_width(612.0, 200), 1700);
        // At 72 DPI the page renders at its native point size.
        assert_eq!(target_width(612.0, 72), 612);
        // A4 (595 pt) at 150 DPI.
        assert_eq!(target_width(595.0, 150), 1240);
    }
}
