//! # mcq-vision
//!
//! Extract multiple-choice questions from exam paper images and PDFs using a
//! Vision Language Model (Google Gemini).
//!
//! ## Why a VLM?
//!
//! Classical segmentation (binarise, morphological open, blob detection on a
//! question-number ROI strip) is brittle on scanned papers with mixed
//! languages, handwriting, and mathematical notation. This service instead
//! sends each page image to Gemini with a fixed prompt that describes that
//! pipeline and asks the model to *simulate* it, returning one bounding box
//! per question together with the transcribed text, an inferred subject, and
//! the marked answer. No computer vision runs locally — the only geometric
//! work done here is turning the returned 0–1000-normalised boxes into
//! padded, clamped pixel crops.
//!
//! ## Pipeline Overview
//!
//! ```text
//! image / PDF bytes
//!  │
//!  ├─ 1. Render   rasterise PDF pages via pdfium (CPU-bound, spawn_blocking)
//!  ├─ 2. Encode   PNG → base64 data URL
//!  ├─ 3. Segment  Gemini structured-output call, one per page
//!  ├─ 4. Crop     bounding box → padded pixel rect → white-canvas PNG crop
//!  └─ 5. Respond  per-page results + flattened question list + timing
//! ```
//!
//! ## Quick Start (library)
//!
//! ```rust,no_run
//! use mcq_vision::analyze;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Reads GEMINI_API_KEY / GEMINI_MODEL from the environment on first use.
//!     let pdf = std::fs::read("paper.pdf")?;
//!     let analysis = analyze::analyze_pdf("paper.pdf", pdf).await?;
//!     println!(
//!         "{} pages, {} questions",
//!         analysis.pages,
//!         analysis.all_questions.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `server` | on      | Enables the `mcq-vision` HTTP binary and the [`api`] router (axum + tower-http) |
//!
//! Disable `server` when using only the library:
//! ```toml
//! mcq-vision = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod analyze;
#[cfg(feature = "server")]
pub mod api;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod tasks;
pub mod types;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use analyze::{analyze_image, analyze_image_with_crop, analyze_pdf};
pub use config::{ServiceConfig, ServiceConfigBuilder};
pub use error::AnalysisError;
pub use pipeline::crop::CropEngine;
pub use pipeline::render::PdfRenderer;
pub use pipeline::segment::GeminiClient;
pub use progress::{NoopRenderProgress, RenderProgress};
pub use tasks::{ProcessingTask, TaskRegistry, TaskStatus};
pub use types::{AnalysisResult, BoundingBox, CroppedSegment, PdfAnalysis, QuestionSegment};
