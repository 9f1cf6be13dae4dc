//! Coordinate/crop engine: normalised bounding box → PNG crop artifact.
//!
//! Pure in-memory geometry, no I/O and no suspension points. The transform
//! is scale → pad → clamp:
//!
//! ```text
//! x1 = xmin/1000 · W − pad    clamped to [0, W]
//! x2 = xmax/1000 · W + pad    clamped to [0, W]     (same for y with H)
//! ```
//!
//! The extracted region is composited onto a white canvas exactly the size
//! of the clamped rectangle, normalising transparency and colour-mode
//! differences in the source material, then PNG-encoded as a data URL.
//!
//! ## Failure semantics
//!
//! Boxes that invert or collapse after padding produce an EMPTY artifact
//! (empty crop URL), never an error — one hallucinated box must not sink a
//! whole batch. Only a source image that fails to decode is fatal, because
//! then no segment can be cropped at all.

use crate::config::ServiceConfig;
use crate::error::AnalysisError;
use crate::pipeline::encode;
use crate::types::{BoundingBox, CroppedSegment, QuestionSegment};
use image::{DynamicImage, Rgba, RgbaImage};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

/// Normalised coordinate range the model is instructed to use.
const COORD_SCALE: f64 = 1000.0;

/// Crops question regions out of page images.
pub struct CropEngine {
    padding: u32,
}

impl CropEngine {
    /// Create an engine with the given padding in pixels.
    pub fn new(padding: u32) -> Self {
        Self { padding }
    }

    /// Process-wide shared instance, configured from the environment on
    /// first use. Stateless after construction, safe to share across
    /// concurrent requests.
    pub fn shared() -> &'static CropEngine {
        static ENGINE: OnceCell<CropEngine> = OnceCell::new();
        ENGINE.get_or_init(|| CropEngine::new(ServiceConfig::from_env().crop_padding))
    }

    /// Compute the padded, clamped pixel rectangle for a box on a
    /// `width`×`height` image. Returns `(x, y, crop_width, crop_height)`;
    /// inverted or out-of-range boxes collapse to zero-area rectangles.
    pub fn crop_rect(&self, bbox: &BoundingBox, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let pad = self.padding as i64;
        let (w, h) = (width as i64, height as i64);

        let x1 = (bbox.xmin / COORD_SCALE * width as f64) as i64 - pad;
        let y1 = (bbox.ymin / COORD_SCALE * height as f64) as i64 - pad;
        let x2 = (bbox.xmax / COORD_SCALE * width as f64) as i64 + pad;
        let y2 = (bbox.ymax / COORD_SCALE * height as f64) as i64 + pad;

        let x1 = x1.clamp(0, w);
        let y1 = y1.clamp(0, h);
        let x2 = x2.clamp(0, w);
        let y2 = y2.clamp(0, h);

        (
            x1 as u32,
            y1 as u32,
            (x2 - x1).max(0) as u32,
            (y2 - y1).max(0) as u32,
        )
    }

    /// Crop one region and return it as a PNG data URL.
    ///
    /// A zero-area rectangle yields an empty string, not an error.
    pub fn crop_segment(
        &self,
        img: &DynamicImage,
        bbox: &BoundingBox,
    ) -> Result<String, AnalysisError> {
        let (x, y, cw, ch) = self.crop_rect(bbox, img.width(), img.height());

        if cw == 0 || ch == 0 {
            debug!("Degenerate crop rect for box {bbox:?}, returning empty artifact");
            return Ok(String::new());
        }

        let region = img.crop_imm(x, y, cw, ch).to_rgba8();

        // White canvas the exact size of the crop; compositing flattens any
        // alpha in the source onto a clean background.
        let mut canvas = RgbaImage::from_pixel(cw, ch, Rgba([255, 255, 255, 255]));
        image::imageops::overlay(&mut canvas, &region, 0, 0);

        let flattened = DynamicImage::ImageRgba8(canvas).to_rgb8();
        encode::encode_png_data_url(&DynamicImage::ImageRgb8(flattened))
    }

    /// Crop every segment out of a decoded page image.
    ///
    /// Per-segment failures are isolated: the segment still appears in the
    /// output with an empty crop URL and the failure is logged.
    pub fn extract_crops(
        &self,
        img: &DynamicImage,
        segments: &[QuestionSegment],
    ) -> Vec<CroppedSegment> {
        segments
            .iter()
            .map(|segment| {
                let crop_url = match self.crop_segment(img, &segment.bounding_box) {
                    Ok(url) => url,
                    Err(e) => {
                        warn!("Failed to crop segment {}: {e}", segment.id);
                        String::new()
                    }
                };

                CroppedSegment {
                    id: segment.id.clone(),
                    bounding_box: segment.bounding_box,
                    text: segment.text.clone(),
                    crop_url,
                    subject: segment.subject.clone(),
                    chapter: segment.chapter.clone(),
                    correct_answer: segment.correct_answer.clone(),
                }
            })
            .collect()
    }

    /// Decode a base64 source image and crop every segment out of it.
    ///
    /// Decoding failure is fatal for the whole batch.
    pub fn extract_crops_from_base64(
        &self,
        image_payload: &str,
        segments: &[QuestionSegment],
    ) -> Result<Vec<CroppedSegment>, AnalysisError> {
        let img = encode::decode_image(image_payload)?;
        Ok(self.extract_crops(&img, segments))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    fn white_page(w: u32, h: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_pixel(w, h, Rgb([255, 255, 255])))
    }

    fn segment(id: &str, bbox: BoundingBox) -> QuestionSegment {
        QuestionSegment {
            id: id.into(),
            bounding_box: bbox,
            text: String::new(),
            crop_url: None,
            image_url: None,
            source_image_url: None,
            subject: None,
            chapter: None,
            correct_answer: None,
        }
    }

    #[test]
    fn full_box_clamps_to_whole_image() {
        // Scenario: whole-image box on 100×100 with padding 10 clamps back
        // to exactly 100×100.
        let engine = CropEngine::new(10);
        let rect = engine.crop_rect(&BoundingBox::full(), 100, 100);
        assert_eq!(rect, (0, 0, 100, 100));

        let url = engine
            .crop_segment(&white_page(100, 100), &BoundingBox::full())
            .unwrap();
        let crop = encode::decode_image(&url).unwrap();
        assert_eq!((crop.width(), crop.height()), (100, 100));
    }

    #[test]
    fn padding_expands_interior_boxes() {
        let engine = CropEngine::new(10);
        let bbox = BoundingBox {
            ymin: 250.0,
            xmin: 250.0,
            ymax: 750.0,
            xmax: 750.0,
        };
        // 200×200 image: box maps to (50,50)-(150,150), padded to (40,40)-(160,160).
        let rect = engine.crop_rect(&bbox, 200, 200);
        assert_eq!(rect, (40, 40, 120, 120));
    }

    #[test]
    fn rect_never_escapes_image_bounds() {
        let engine = CropEngine::new(50);
        let bbox = BoundingBox {
            ymin: 900.0,
            xmin: 900.0,
            ymax: 1000.0,
            xmax: 1000.0,
        };
        let (x, y, cw, ch) = engine.crop_rect(&bbox, 100, 80);
        assert!(x + cw <= 100);
        assert!(y + ch <= 80);
    }

    #[test]
    fn inverted_box_yields_empty_artifact_not_error() {
        let engine = CropEngine::new(10);
        let inverted = BoundingBox {
            ymin: 800.0,
            xmin: 800.0,
            ymax: 200.0,
            xmax: 200.0,
        };
        let (_, _, cw, ch) = engine.crop_rect(&inverted, 100, 100);
        assert_eq!((cw, ch), (0, 0));

        let url = engine
            .crop_segment(&white_page(100, 100), &inverted)
            .unwrap();
        assert!(url.is_empty());
    }

    #[test]
    fn degenerate_line_box_still_crops() {
        // ymin == ymax: padding gives the strip a little height; still valid.
        let engine = CropEngine::new(10);
        let line = BoundingBox {
            ymin: 500.0,
            xmin: 0.0,
            ymax: 500.0,
            xmax: 1000.0,
        };
        let url = engine.crop_segment(&white_page(200, 200), &line).unwrap();
        let crop = encode::decode_image(&url).unwrap();
        assert_eq!(crop.width(), 200);
        assert_eq!(crop.height(), 20);
    }

    #[test]
    fn batch_isolates_bad_segments() {
        let engine = CropEngine::new(10);
        let img = white_page(100, 100);
        let segments = vec![
            segment("1", BoundingBox::full()),
            segment(
                "2",
                BoundingBox {
                    ymin: 900.0,
                    xmin: 900.0,
                    ymax: 100.0,
                    xmax: 100.0,
                },
            ),
        ];

        let crops = engine.extract_crops(&img, &segments);
        assert_eq!(crops.len(), 2);
        assert!(!crops[0].crop_url.is_empty());
        assert!(crops[1].crop_url.is_empty());
    }

    #[test]
    fn undecodable_source_fails_the_batch() {
        let engine = CropEngine::new(10);
        let err = engine
            .extract_crops_from_base64("QUJD", &[segment("1", BoundingBox::full())])
            .unwrap_err();
        assert!(matches!(err, AnalysisError::InvalidImage { .. }));
    }

    #[test]
    fn transparency_composites_onto_white() {
        let engine = CropEngine::new(0);
        let transparent = DynamicImage::ImageRgba8(RgbaImage::from_pixel(
            10,
            10,
            Rgba([0, 0, 0, 0]),
        ));
        let url = engine
            .crop_segment(&transparent, &BoundingBox::full())
            .unwrap();
        let crop = encode::decode_image(&url).unwrap().to_rgb8();
        assert_eq!(crop.get_pixel(5, 5), &Rgb([255, 255, 255]));
    }
}
