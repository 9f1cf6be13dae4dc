//! Pipeline stages for question-paper analysis.
//!
//! Each submodule implements exactly one transformation step, so every
//! stage is independently testable and swappable.
//!
//! ## Data Flow
//!
//! ```text
//! PDF bytes ──▶ render ──▶ encode ──▶ segment ──▶ crop
//!               (pdfium)   (data URL)  (Gemini)   (pixel crops)
//! ```
//!
//! 1. [`render`]  — rasterise PDF pages; runs in `spawn_blocking` because
//!    pdfium is not async-safe
//! 2. [`encode`]  — PNG/base64 data-URL conversion at every boundary
//! 3. [`segment`] — the only stage with network I/O: Gemini structured-output
//!    call plus strict decode of the returned payload
//! 4. [`crop`]    — pure in-memory geometry: normalised box → padded, clamped
//!    pixel rect → white-canvas PNG artifact

pub mod crop;
pub mod encode;
pub mod render;
pub mod segment;
