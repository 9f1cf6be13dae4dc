//! Error types for the mcq-vision library.
//!
//! One enum covers the whole pipeline, but its variants fall into distinct
//! tiers that callers are expected to handle differently:
//!
//! * **Configuration** ([`AnalysisError::ApiKeyMissing`],
//!   [`AnalysisError::InvalidConfig`]) — the service starts anyway so health
//!   checks keep working, but segmentation calls fail fast at first use.
//!
//! * **Validation** ([`AnalysisError::PageOutOfRange`]) — rejected before any
//!   expensive work; the HTTP layer maps these to 4xx responses.
//!
//! * **Upstream** (`Api*`, [`AnalysisError::EmptyResponse`],
//!   [`AnalysisError::ResponseParse`]) — the model call or its structured
//!   output went wrong. These are business failures: the HTTP layer converts
//!   them to `success=false` payloads, never to protocol errors.
//!
//! Per-segment crop failures are NOT represented here at the batch level:
//! one bad bounding box yields an empty crop artifact for that segment and a
//! warning log, and the batch continues (see [`crate::pipeline::crop`]).

use thiserror::Error;

/// All errors returned by the mcq-vision pipeline.
#[derive(Debug, Error)]
pub enum AnalysisError {
    // ── Configuration ─────────────────────────────────────────────────────
    /// GEMINI_API_KEY was not set; segmentation cannot run.
    #[error("GEMINI_API_KEY is not configured.\nSet it in the environment or a .env file.")]
    ApiKeyMissing,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Input errors ──────────────────────────────────────────────────────
    /// The supplied image payload could not be decoded.
    #[error("Invalid image payload: {detail}")]
    InvalidImage { detail: String },

    /// The supplied PDF bytes could not be opened.
    #[error("PDF could not be opened: {detail}")]
    CorruptPdf { detail: String },

    /// A page index past the end of the document was requested.
    #[error("Page {page} does not exist (PDF has {total} pages)")]
    PageOutOfRange { page: usize, total: usize },

    /// pdfium returned an error for a specific page.
    #[error("Rasterisation failed for page {page}: {detail}")]
    RenderFailed { page: usize, detail: String },

    // ── Upstream (Gemini) errors ──────────────────────────────────────────
    /// The Gemini API returned a non-success HTTP status.
    #[error("Gemini API error (status {status}): {detail}")]
    ApiRequestFailed { status: u16, detail: String },

    /// The Gemini API call exceeded the configured timeout.
    #[error("Gemini API call timed out after {elapsed_ms}ms")]
    ApiTimeout { elapsed_ms: u64 },

    /// The model returned no text content at all.
    #[error("Empty response from Gemini")]
    EmptyResponse,

    /// The model returned text that does not parse as the declared schema.
    #[error("Failed to parse Gemini response: {detail}")]
    ResponseParse { detail: String },

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl AnalysisError {
    /// Whether a retry of the upstream call could plausibly succeed.
    ///
    /// Timeouts, 429s, 5xx responses, and transport-level failures (status
    /// 0: connect/DNS errors, no HTTP status received) are transient;
    /// everything else (auth failures, malformed output, bad input) is not.
    pub fn is_transient(&self) -> bool {
        match self {
            AnalysisError::ApiTimeout { .. } => true,
            AnalysisError::ApiRequestFailed { status, .. } => {
                *status == 0 || *status == 429 || *status >= 500
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_out_of_range_display() {
        let e = AnalysisError::PageOutOfRange { page: 7, total: 3 };
        let msg = e.to_string();
        assert!(msg.contains("Page 7"), "got: {msg}");
        assert!(msg.contains("3 pages"), "got: {msg}");
    }

    #[test]
    fn api_timeout_display() {
        let e = AnalysisError::ApiTimeout { elapsed_ms: 60000 };
        assert!(e.to_string().contains("60000ms"));
    }

    #[test]
    fn transient_classification() {
        assert!(AnalysisError::ApiTimeout { elapsed_ms: 1 }.is_transient());
        assert!(AnalysisError::ApiRequestFailed {
            status: 429,
            detail: String::new()
        }
        .is_transient());
        assert!(AnalysisError::ApiRequestFailed {
            status: 503,
            detail: String::new()
        }
        .is_transient());
        assert!(AnalysisError::ApiRequestFailed {
            status: 0,
            detail: String::new()
        }
        .is_transient());
        assert!(!AnalysisError::ApiRequestFailed {
            status: 401,
            detail: String::new()
        }
        .is_transient());
        assert!(!AnalysisError::EmptyResponse.is_transient());
        assert!(!AnalysisError::ApiKeyMissing.is_transient());
    }
}
