//! Core data model shared by the pipeline and the HTTP surface.
//!
//! Field names serialise in camelCase because these structs ARE the wire
//! contract with the frontend — the same shapes flow out of `/api/analyze`,
//! `/api/crop`, and `/api/analyze-pdf` unchanged. Everything here is
//! request-scoped: nothing is persisted, records are built fresh per model
//! response and discarded once the response is serialised.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle normalised to a 0–1000 coordinate space,
/// independent of the actual pixel dimensions of the source image.
///
/// The model is instructed to keep `ymin ≤ ymax` and `xmin ≤ xmax` but this
/// is not enforced on decode — the crop engine tolerates degenerate and
/// inverted boxes by producing an empty crop instead of failing the batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub ymin: f64,
    pub xmin: f64,
    pub ymax: f64,
    pub xmax: f64,
}

impl BoundingBox {
    /// The whole-image box, used when the model omits coordinates.
    pub fn full() -> Self {
        Self {
            ymin: 0.0,
            xmin: 0.0,
            ymax: 1000.0,
            xmax: 1000.0,
        }
    }
}

/// A single question detected on a page.
///
/// `crop_url` and `source_image_url` are populated in a later pipeline stage
/// than creation: segmentation yields the box and text, cropping attaches
/// the artifact, PDF analysis attaches the source page.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSegment {
    /// Detected question number. Not guaranteed unique or numeric.
    pub id: String,
    pub bounding_box: BoundingBox,
    pub text: String,
    /// Cropped question image as a `data:image/png;base64,…` reference.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub crop_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Data URL of the page image this question was detected on.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_image_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// A [`QuestionSegment`] whose crop artifact is guaranteed present.
///
/// A distinct type because cropping always produces *some* value: on a
/// per-segment failure `crop_url` is the empty string, never absent.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CroppedSegment {
    pub id: String,
    pub bounding_box: BoundingBox,
    pub text: String,
    pub crop_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chapter: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<String>,
}

/// Segmentation result for one page/image.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub questions: Vec<QuestionSegment>,
}

/// Aggregated result of a whole-document analysis.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAnalysis {
    /// Time-derived identifier of the processing task (`pdf_<unix-secs>`).
    pub task_id: String,
    /// Number of pages rendered and analysed.
    pub pages: usize,
    /// Every question from every page, in document order.
    pub all_questions: Vec<QuestionSegment>,
    /// Per-page results, index-correlated with page order.
    pub page_results: Vec<AnalysisResult>,
    /// Wall-clock duration from pipeline entry to response construction.
    pub processing_time_ms: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn question_segment_serialises_camel_case() {
        let q = QuestionSegment {
            id: "12".into(),
            bounding_box: BoundingBox {
                ymin: 10.0,
                xmin: 20.0,
                ymax: 110.0,
                xmax: 980.0,
            },
            text: "What is the SI unit of force?".into(),
            crop_url: None,
            image_url: None,
            source_image_url: None,
            subject: Some("Physics".into()),
            chapter: None,
            correct_answer: Some("B".into()),
        };

        let json = serde_json::to_value(&q).unwrap();
        assert_eq!(json["boundingBox"]["ymin"], 10.0);
        assert_eq!(json["correctAnswer"], "B");
        // Unpopulated optionals are omitted, not null.
        assert!(json.get("cropUrl").is_none());
    }

    #[test]
    fn question_segment_decodes_without_optionals() {
        let q: QuestionSegment = serde_json::from_str(
            r#"{"id":"3","boundingBox":{"ymin":0,"xmin":0,"ymax":500,"xmax":1000},"text":"Q3"}"#,
        )
        .unwrap();
        assert_eq!(q.id, "3");
        assert!(q.subject.is_none());
        assert!(q.crop_url.is_none());
    }

    #[test]
    fn full_box_spans_whole_image() {
        let b = BoundingBox::full();
        assert_eq!((b.ymin, b.xmin, b.ymax, b.xmax), (0.0, 0.0, 1000.0, 1000.0));
    }
}
