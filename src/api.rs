//! HTTP API for the question-paper analysis service.
//!
//! Endpoints:
//! - `POST /api/analyze` — segment a single base64 image
//! - `POST /api/analyze-pdf` — multipart PDF upload, whole-document analysis
//! - `POST /api/crop` — crop caller-supplied segments out of an image
//! - `POST /api/analyze-with-crop` — segment then crop in one call
//! - `GET /api/tasks/{id}` — poll a document job's progress
//! - `GET /`, `GET /health` — service health and configuration state
//!
//! ## Failure contract
//!
//! Requests that are malformed before any work starts (no file, wrong file
//! type, empty image) get a 4xx with a `{"detail": …}` body. Once the
//! pipeline is running, failures come back as HTTP 200 with
//! `success: false` and an `error` string, so the frontend handles model
//! and upstream problems through one code path.

use axum::{
    extract::{DefaultBodyLimit, Multipart, Path, State},
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use std::time::Instant;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::analyze;
use crate::config::ServiceConfig;
use crate::pipeline::crop::CropEngine;
use crate::tasks::{ProcessingTask, TaskRegistry};
use crate::types::{AnalysisResult, CroppedSegment, QuestionSegment};

/// Upload ceiling for PDF bodies. Scanned papers run large.
const MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Application state
pub struct AppState {
    pub config: ServiceConfig,
}

/// Build the API router.
pub fn router(config: ServiceConfig) -> Router {
    let cors = cors_layer(&config);
    let state = Arc::new(AppState { config });

    let api_routes = Router::new()
        .route("/analyze", post(analyze_handler))
        .route(
            "/analyze-pdf",
            post(analyze_pdf_handler).layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES)),
        )
        .route("/crop", post(crop_handler))
        .route("/analyze-with-crop", post(analyze_with_crop_handler))
        .route("/tasks/{id}", get(get_task_handler));

    Router::new()
        .route("/", get(health_handler))
        .route("/health", get(health_handler))
        .nest("/api", api_routes)
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Allow exactly the configured frontend origins; methods and headers stay
/// open since the API is same-team and unauthenticated.
fn cors_layer(config: &ServiceConfig) -> CorsLayer {
    let origins: Vec<HeaderValue> = config
        .cors_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(v) => Some(v),
            Err(_) => {
                warn!("Ignoring invalid CORS origin {origin:?}");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// A request rejected before any pipeline work started.
#[derive(Debug)]
pub struct ValidationError {
    status: StatusCode,
    detail: String,
}

impl ValidationError {
    fn bad_request(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            detail: detail.into(),
        }
    }

    fn not_found(detail: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            detail: detail.into(),
        }
    }
}

impl IntoResponse for ValidationError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "detail": self.detail }))).into_response()
    }
}

// === Health ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct HealthResponse {
    status: String,
    version: String,
    gemini_configured: bool,
}

async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        gemini_configured: state.config.gemini_configured(),
    })
}

// === Single-image analysis ===

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageRequest {
    pub image: String,
    pub mime_type: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeImageResponse {
    pub success: bool,
    pub questions: Vec<QuestionSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

async fn analyze_handler(
    Json(request): Json<AnalyzeImageRequest>,
) -> Result<Json<AnalyzeImageResponse>, ValidationError> {
    let mime_type = validate_image_request(&request)?;
    let start = Instant::now();

    match analyze::analyze_image(&request.image, &mime_type).await {
        Ok(result) => Ok(Json(AnalyzeImageResponse {
            success: true,
            questions: result.questions,
            error: None,
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
        })),
        Err(e) => {
            warn!("Image analysis failed: {e}");
            Ok(Json(AnalyzeImageResponse {
                success: false,
                questions: Vec::new(),
                error: Some(e.to_string()),
                processing_time_ms: None,
            }))
        }
    }
}

// === Crop ===

#[derive(Deserialize)]
pub struct CropImageRequest {
    pub image: String,
    pub segments: Vec<QuestionSegment>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CropImageResponse {
    pub success: bool,
    pub segments: Vec<CroppedSegment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

async fn crop_handler(
    Json(request): Json<CropImageRequest>,
) -> Result<Json<CropImageResponse>, ValidationError> {
    if request.image.trim().is_empty() {
        return Err(ValidationError::bad_request("No image provided"));
    }

    match CropEngine::shared().extract_crops_from_base64(&request.image, &request.segments) {
        Ok(segments) => Ok(Json(CropImageResponse {
            success: true,
            segments,
            error: None,
        })),
        Err(e) => {
            warn!("Crop request failed: {e}");
            Ok(Json(CropImageResponse {
                success: false,
                segments: Vec::new(),
                error: Some(e.to_string()),
            }))
        }
    }
}

// === Analyze + crop ===

/// Same request and response shape as `/api/analyze`; the returned
/// questions additionally carry `cropUrl`.
async fn analyze_with_crop_handler(
    Json(request): Json<AnalyzeImageRequest>,
) -> Result<Json<AnalyzeImageResponse>, ValidationError> {
    let mime_type = validate_image_request(&request)?;
    let start = Instant::now();

    match analyze::analyze_image_with_crop(&request.image, &mime_type).await {
        Ok(result) => Ok(Json(AnalyzeImageResponse {
            success: true,
            questions: result.questions,
            error: None,
            processing_time_ms: Some(start.elapsed().as_millis() as u64),
        })),
        Err(e) => {
            warn!("Analyze-with-crop failed: {e}");
            Ok(Json(AnalyzeImageResponse {
                success: false,
                questions: Vec::new(),
                error: Some(e.to_string()),
                processing_time_ms: None,
            }))
        }
    }
}

// === PDF analysis ===

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PdfAnalysisResponse {
    pub success: bool,
    pub task_id: String,
    pub pages: usize,
    pub all_questions: Vec<QuestionSegment>,
    pub page_results: Vec<AnalysisResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub processing_time_ms: Option<u64>,
}

async fn analyze_pdf_handler(
    mut multipart: Multipart,
) -> Result<Json<PdfAnalysisResponse>, ValidationError> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() != Some("file") {
            continue;
        }

        let file_name = field.file_name().unwrap_or_default().to_string();
        // Reject non-PDFs before buffering the body.
        if !is_pdf_filename(&file_name) {
            return Err(ValidationError::bad_request("File must be a PDF"));
        }

        let data = field
            .bytes()
            .await
            .map_err(|e| ValidationError::bad_request(format!("Failed to read upload: {e}")))?;
        upload = Some((file_name, data.to_vec()));
        break;
    }

    let (file_name, pdf_bytes) =
        upload.ok_or_else(|| ValidationError::bad_request("No file provided"))?;
    info!("PDF upload {file_name:?} ({} bytes)", pdf_bytes.len());

    match analyze::analyze_pdf(&file_name, pdf_bytes).await {
        Ok(analysis) => Ok(Json(PdfAnalysisResponse {
            success: true,
            task_id: analysis.task_id,
            pages: analysis.pages,
            all_questions: analysis.all_questions,
            page_results: analysis.page_results,
            error: None,
            processing_time_ms: Some(analysis.processing_time_ms),
        })),
        Err(e) => {
            warn!("PDF analysis failed: {e}");
            Ok(Json(PdfAnalysisResponse {
                success: false,
                task_id: String::new(),
                pages: 0,
                all_questions: Vec::new(),
                page_results: Vec::new(),
                error: Some(e.to_string()),
                processing_time_ms: None,
            }))
        }
    }
}

// === Tasks ===

async fn get_task_handler(
    Path(id): Path<String>,
) -> Result<Json<ProcessingTask>, ValidationError> {
    TaskRegistry::shared()
        .get(&id)
        .map(Json)
        .ok_or_else(|| ValidationError::not_found(format!("Task {id} not found")))
}

// === Validation helpers ===

fn validate_image_request(request: &AnalyzeImageRequest) -> Result<String, ValidationError> {
    if request.image.trim().is_empty() {
        return Err(ValidationError::bad_request("No image provided"));
    }
    Ok(request
        .mime_type
        .clone()
        .unwrap_or_else(|| "image/png".to_string()))
}

fn is_pdf_filename(name: &str) -> bool {
    name.to_ascii_lowercase().ends_with(".pdf")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pdf_filename_check_is_case_insensitive() {
        assert!(is_pdf_filename("exam.pdf"));
        assert!(is_pdf_filename("EXAM.PDF"));
        assert!(is_pdf_filename("paper.2024.Pdf"));
        assert!(!is_pdf_filename("notes.txt"));
        assert!(!is_pdf_filename("pdf"));
        assert!(!is_pdf_filename(""));
    }

    #[test]
    fn empty_image_is_rejected_before_work() {
        let request = AnalyzeImageRequest {
            image: "   ".into(),
            mime_type: None,
        };
        let err = validate_image_request(&request).unwrap_err();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
    }

    #[test]
    fn analyze_with_crop_shares_the_analyze_response_shape() {
        // The frontend parses both analysis endpoints with one decoder:
        // `questions` with `cropUrl` per question, never a `segments` list.
        use crate::types::BoundingBox;

        let response = AnalyzeImageResponse {
            success: true,
            questions: vec![QuestionSegment {
                id: "1".into(),
                bounding_box: BoundingBox::full(),
                text: "Q1".into(),
                crop_url: Some("data:image/png;base64,AAA".into()),
                image_url: None,
                source_image_url: None,
                subject: None,
                chapter: None,
                correct_answer: None,
            }],
            error: None,
            processing_time_ms: Some(12),
        };

        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["questions"][0]["cropUrl"], "data:image/png;base64,AAA");
        assert!(json.get("segments").is_none());
    }

    #[test]
    fn mime_type_defaults_to_png() {
        let request = AnalyzeImageRequest {
            image: "QUJD".into(),
            mime_type: None,
        };
        assert_eq!(validate_image_request(&request).unwrap(), "image/png");

        let request = AnalyzeImageRequest {
            image: "QUJD".into(),
            mime_type: Some("image/jpeg".into()),
        };
        assert_eq!(validate_image_request(&request).unwrap(), "image/jpeg");
    }
}
