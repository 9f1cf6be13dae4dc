//! Analysis orchestrator: composes render, segment, and crop into the
//! operations the HTTP surface exposes.
//!
//! Pages of a document are processed strictly sequentially. Per-page
//! fan-out would multiply peak memory by the page count (rendered pages
//! are large) and hammer the model API's rate limits; latency of a
//! background document job matters less than predictable resource use.
//!
//! A document failure is atomic: if any page fails to render or segment,
//! the whole job fails and no partial result is returned. The HTTP layer
//! converts that into a `success=false` payload.

use crate::error::AnalysisError;
use crate::pipeline::crop::CropEngine;
use crate::pipeline::encode;
use crate::pipeline::render::PdfRenderer;
use crate::pipeline::segment::GeminiClient;
use crate::progress::{ProgressCallback, RenderProgress};
use crate::tasks::{TaskRegistry, TaskStatus};
use crate::types::{AnalysisResult, CroppedSegment, PdfAnalysis, QuestionSegment};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Segment a single image into question records.
pub async fn analyze_image(image: &str, mime_type: &str) -> Result<AnalysisResult, AnalysisError> {
    GeminiClient::shared().analyze_image(image, mime_type).await
}

/// Segment a single image, then crop every detected question out of it.
///
/// Returns the same shape as [`analyze_image`] with `crop_url` populated
/// on each question, so both endpoints share one response contract.
pub async fn analyze_image_with_crop(
    image: &str,
    mime_type: &str,
) -> Result<AnalysisResult, AnalysisError> {
    let result = GeminiClient::shared().analyze_image(image, mime_type).await?;
    if result.questions.is_empty() {
        return Ok(result);
    }
    let crops = CropEngine::shared().extract_crops_from_base64(image, &result.questions)?;
    Ok(AnalysisResult {
        questions: attach_crops(result.questions, &crops, None),
    })
}

/// Analyse a whole PDF: render every page, segment and crop each one.
///
/// Registers a task under `pdf_<unix-seconds>` in the shared
/// [`TaskRegistry`] and keeps it updated per phase and page, so clients
/// can poll `GET /api/tasks/{id}` while the request is in flight.
pub async fn analyze_pdf(file_name: &str, pdf_bytes: Vec<u8>) -> Result<PdfAnalysis, AnalysisError> {
    let task_id = new_task_id();
    let registry = TaskRegistry::shared();
    registry.create(&task_id, file_name);

    match run_pdf_analysis(&task_id, pdf_bytes).await {
        Ok(analysis) => {
            registry.update(&task_id, |t| {
                t.status = TaskStatus::Done;
                t.progress = "Complete".to_string();
                t.questions_found = Some(analysis.all_questions.len());
            });
            Ok(analysis)
        }
        Err(e) => {
            warn!("PDF analysis {task_id} failed: {e}");
            registry.update(&task_id, |t| {
                t.status = TaskStatus::Failed;
                t.progress = "Failed".to_string();
                t.error = Some(e.to_string());
            });
            Err(e)
        }
    }
}

async fn run_pdf_analysis(
    task_id: &str,
    pdf_bytes: Vec<u8>,
) -> Result<PdfAnalysis, AnalysisError> {
    let start = Instant::now();
    let registry = TaskRegistry::shared();

    registry.update(task_id, |t| t.status = TaskStatus::Converting);
    let progress: ProgressCallback = Arc::new(TaskRenderProgress {
        task_id: task_id.to_string(),
    });
    let pages = PdfRenderer::shared()
        .render_pages(pdf_bytes, Some(progress))
        .await?;
    let total = pages.len();

    registry.update(task_id, |t| {
        t.status = TaskStatus::Processing;
        t.total_pages = Some(total);
    });

    let gemini = GeminiClient::shared();
    let crop_engine = CropEngine::shared();

    let mut all_questions = Vec::new();
    let mut page_results = Vec::with_capacity(total);

    for (index, page) in pages.iter().enumerate() {
        let page_number = index + 1;
        registry.update(task_id, |t| {
            t.current_page = Some(page_number);
            t.progress = format!("Analyzing page {page_number}/{total}");
        });

        let page_url = encode::encode_png_data_url(page)?;
        let result = gemini.analyze_image(&page_url, "image/png").await?;
        info!(
            "Page {page_number}/{total}: {} questions",
            result.questions.len()
        );

        let questions = if result.questions.is_empty() {
            Vec::new()
        } else {
            let crops = crop_engine.extract_crops(page, &result.questions);
            attach_crops(result.questions, &crops, Some(&page_url))
        };

        all_questions.extend(questions.iter().cloned());
        page_results.push(AnalysisResult { questions });

        registry.update(task_id, |t| t.questions_found = Some(all_questions.len()));
    }

    registry.update(task_id, |t| {
        t.status = TaskStatus::Saving;
        t.progress = "Finalizing results".to_string();
    });

    let processing_time_ms = start.elapsed().as_millis() as u64;
    info!(
        "PDF {task_id} analysed: {total} pages, {} questions in {processing_time_ms}ms",
        all_questions.len()
    );

    Ok(PdfAnalysis {
        task_id: task_id.to_string(),
        pages: total,
        all_questions,
        page_results,
        processing_time_ms,
    })
}

/// Attach crop artifacts (and, for the PDF path, the source page image)
/// to segmented questions.
///
/// `crops` is index-correlated with `questions`; a shorter crop list (which
/// cannot happen with the current engine, but costs nothing to tolerate)
/// leaves the trailing questions without a crop URL.
fn attach_crops(
    questions: Vec<QuestionSegment>,
    crops: &[CroppedSegment],
    page_url: Option<&str>,
) -> Vec<QuestionSegment> {
    questions
        .into_iter()
        .enumerate()
        .map(|(i, mut q)| {
            q.crop_url = crops.get(i).map(|c| c.crop_url.clone());
            q.source_image_url = page_url.map(str::to_string);
            q
        })
        .collect()
}

/// Time-derived job identifier, matching the `pdf_<unix-seconds>` ids the
/// frontend already parses.
fn new_task_id() -> String {
    let secs = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default();
    format!("pdf_{secs}")
}

/// Bridges renderer progress into the task registry.
struct TaskRenderProgress {
    task_id: String,
}

impl RenderProgress for TaskRenderProgress {
    fn on_page_rendered(&self, completed: usize, total: usize) {
        TaskRegistry::shared().update(&self.task_id, |t| {
            t.current_page = Some(completed);
            t.total_pages = Some(total);
            t.progress = format!("Rendering page {completed}/{total}");
        });
    }
}
