//! Segmentation client: one Gemini structured-output call per page image.
//!
//! This is the only pipeline stage with network I/O. The request carries a
//! fixed system instruction ([`crate::prompts::SEGMENTATION_PROMPT`]), the
//! page image as inline data, and a `responseSchema` constraining the model
//! to the wire shape below. The model's JSON output is an EXTERNAL
//! contract, not an internal data structure: it is decoded defensively —
//! unknown fields tolerated, absent fields default-filled, wrong-typed
//! required fields rejected — and then mapped into [`AnalysisResult`].
//!
//! ## Retry strategy
//!
//! 429/5xx/timeout failures are transient and retried with exponential
//! backoff (`retry_backoff_ms · 2^attempt`). Malformed output is NOT
//! retried: a model that just produced garbage for an image will usually
//! do so again, and the caller surfaces it as a business failure instead.

use crate::config::ServiceConfig;
use crate::error::AnalysisError;
use crate::pipeline::encode;
use crate::prompts;
use crate::types::{AnalysisResult, BoundingBox, QuestionSegment};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

const GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Client for the Gemini generateContent API.
pub struct GeminiClient {
    http: reqwest::Client,
    api_key: Option<String>,
    model: String,
    api_timeout: Duration,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl GeminiClient {
    /// Create a client from service configuration.
    ///
    /// A missing API key is allowed here; [`Self::analyze_image`] fails
    /// with [`AnalysisError::ApiKeyMissing`] at first use instead, so the
    /// service can start and answer health checks without one.
    pub fn new(config: &ServiceConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            api_key: config.api_key.clone(),
            model: config.model.clone(),
            api_timeout: Duration::from_secs(config.api_timeout_secs),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }

    /// Process-wide shared instance, configured from the environment on
    /// first use. Holds only configuration and a connection pool; safe to
    /// share across concurrent requests.
    pub fn shared() -> &'static GeminiClient {
        static CLIENT: OnceCell<GeminiClient> = OnceCell::new();
        CLIENT.get_or_init(|| GeminiClient::new(&ServiceConfig::from_env()))
    }

    /// Whether an API key is present.
    pub fn is_configured(&self) -> bool {
        self.api_key.is_some()
    }

    /// Configured model identifier.
    pub fn model(&self) -> &str {
        &self.model
    }

    /// Segment one image into question records.
    ///
    /// `image` may carry a `data:…;base64,` prefix or be a bare payload.
    ///
    /// # Errors
    /// * [`AnalysisError::ApiKeyMissing`] — no key configured
    /// * [`AnalysisError::ApiRequestFailed`] / [`AnalysisError::ApiTimeout`]
    ///   — upstream call failed after retries
    /// * [`AnalysisError::EmptyResponse`] / [`AnalysisError::ResponseParse`]
    ///   — the model returned no text, or text that does not match the
    ///   declared schema (hard failure for this image, never treated as
    ///   zero questions)
    pub async fn analyze_image(
        &self,
        image: &str,
        mime_type: &str,
    ) -> Result<AnalysisResult, AnalysisError> {
        let api_key = self.api_key.as_deref().ok_or(AnalysisError::ApiKeyMissing)?;
        let start = Instant::now();

        let request = build_request(encode::strip_data_url_prefix(image), mime_type);
        let url = format!("{GEMINI_API_BASE}/{}:generateContent", self.model);

        let mut last_err: Option<AnalysisError> = None;
        let mut text = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = self.retry_backoff_ms * 2u64.pow(attempt - 1);
                warn!(
                    "Gemini retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                tokio::time::sleep(Duration::from_millis(backoff)).await;
            }

            match self.request_content(&url, api_key, &request).await {
                Ok(t) => {
                    text = Some(t);
                    break;
                }
                Err(e) if e.is_transient() && attempt < self.max_retries => {
                    warn!("Gemini attempt {} failed: {e}", attempt + 1);
                    last_err = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        let text = match text {
            Some(t) => t,
            None => {
                return Err(last_err
                    .unwrap_or_else(|| AnalysisError::Internal("retries exhausted".into())))
            }
        };

        let result = parse_segmentation(&text)?;
        info!(
            "Analyzed image in {}ms, found {} questions",
            start.elapsed().as_millis(),
            result.questions.len()
        );
        Ok(result)
    }

    /// One HTTP round trip; returns the concatenated candidate text.
    async fn request_content(
        &self,
        url: &str,
        api_key: &str,
        request: &GenerateContentRequest,
    ) -> Result<String, AnalysisError> {
        let started = Instant::now();

        let response = self
            .http
            .post(url)
            .header("x-goog-api-key", api_key)
            .json(request)
            .timeout(self.api_timeout)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    AnalysisError::ApiTimeout {
                        elapsed_ms: started.elapsed().as_millis() as u64,
                    }
                } else {
                    // Status 0 marks a transport-level failure (connect,
                    // DNS) rather than an HTTP status from the API.
                    AnalysisError::ApiRequestFailed {
                        status: 0,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(AnalysisError::ApiRequestFailed {
                status: status.as_u16(),
                detail: truncate(&detail, 500),
            });
        }

        let body: GenerateContentResponse =
            response
                .json()
                .await
                .map_err(|e| AnalysisError::ResponseParse {
                    detail: format!("response body: {e}"),
                })?;

        debug!("Gemini round trip took {}ms", started.elapsed().as_millis());
        Ok(body.into_text())
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut end = max;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        format!("{}…", &s[..end])
    }
}

/// Strict-parse the model's structured text into an [`AnalysisResult`].
///
/// Empty text is [`AnalysisError::EmptyResponse`]; malformed JSON or
/// wrong-typed fields are [`AnalysisError::ResponseParse`]. Absent optional
/// fields take defined defaults (missing box → whole image).
fn parse_segmentation(text: &str) -> Result<AnalysisResult, AnalysisError> {
    let text = text.trim();
    if text.is_empty() {
        return Err(AnalysisError::EmptyResponse);
    }

    let payload: SegmentationPayload =
        serde_json::from_str(text).map_err(|e| AnalysisError::ResponseParse {
            detail: format!("{e}; text: {}", truncate(text, 200)),
        })?;

    Ok(AnalysisResult {
        questions: payload.questions.into_iter().map(Into::into).collect(),
    })
}

// ── Request wire types ───────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct GenerateContentRequest {
    contents: Vec<Content>,
    #[serde(rename = "systemInstruction")]
    system_instruction: Content,
    #[serde(rename = "generationConfig")]
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
struct InlineData {
    #[serde(rename = "mimeType")]
    mime_type: String,
    data: String,
}

#[derive(Debug, Serialize)]
struct GenerationConfig {
    #[serde(rename = "responseMimeType")]
    response_mime_type: &'static str,
    #[serde(rename = "responseSchema")]
    response_schema: serde_json::Value,
}

fn build_request(image_payload: &str, mime_type: &str) -> GenerateContentRequest {
    GenerateContentRequest {
        contents: vec![Content {
            parts: vec![
                Part::Inline {
                    inline_data: InlineData {
                        mime_type: mime_type.to_string(),
                        data: image_payload.to_string(),
                    },
                },
                Part::Text {
                    text: prompts::USER_INSTRUCTION.to_string(),
                },
            ],
        }],
        system_instruction: Content {
            parts: vec![Part::Text {
                text: prompts::SEGMENTATION_PROMPT.to_string(),
            }],
        },
        generation_config: GenerationConfig {
            response_mime_type: "application/json",
            response_schema: prompts::response_schema(),
        },
    }
}

// ── Response wire types ──────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

impl GenerateContentResponse {
    /// Concatenated text parts of the first candidate.
    fn into_text(self) -> String {
        self.candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Debug, Deserialize)]
struct CandidatePart {
    #[serde(default)]
    text: String,
}

// ── Structured-output payload ────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct SegmentationPayload {
    #[serde(default)]
    questions: Vec<WireQuestion>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQuestion {
    #[serde(default)]
    id: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    subject: Option<String>,
    #[serde(default)]
    chapter: Option<String>,
    #[serde(default)]
    correct_answer: Option<String>,
    #[serde(default)]
    bounding_box: Option<WireBoundingBox>,
}

#[derive(Debug, Deserialize)]
struct WireBoundingBox {
    #[serde(default)]
    ymin: f64,
    #[serde(default)]
    xmin: f64,
    #[serde(default = "full_extent")]
    ymax: f64,
    #[serde(default = "full_extent")]
    xmax: f64,
}

fn full_extent() -> f64 {
    1000.0
}

impl From<WireQuestion> for QuestionSegment {
    fn from(q: WireQuestion) -> Self {
        let bounding_box = q
            .bounding_box
            .map(|b| BoundingBox {
                ymin: b.ymin,
                xmin: b.xmin,
                ymax: b.ymax,
                xmax: b.xmax,
            })
            .unwrap_or_else(BoundingBox::full);

        QuestionSegment {
            id: q.id,
            bounding_box,
            text: q.text,
            crop_url: None,
            image_url: None,
            source_image_url: None,
            subject: q.subject.filter(|s| !s.is_empty()),
            chapter: q.chapter.filter(|s| !s.is_empty()),
            correct_answer: q.correct_answer.filter(|s| !s.is_empty()),
        }
    }
}
