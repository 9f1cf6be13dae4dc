//! Fixed instruction payload for the segmentation model.
//!
//! Centralising the prompt and response schema here serves two purposes:
//!
//! 1. **Single source of truth** — the prompt is a system-wide invariant,
//!    fixed per deployment. Only the model name is configurable; requests
//!    cannot override what the model is asked to do.
//!
//! 2. **Testability** — the schema can be inspected without a live model,
//!    so a drifted field name is caught by a unit test rather than by an
//!    unparseable production response.

/// System instruction sent with every segmentation request.
///
/// The prompt describes a classical blob-detection pipeline and asks the
/// model to simulate its *intent*: split the page into columns, find the
/// "islands of ink" that are question numbers, and slice at their
/// Y-coordinates. None of that computer vision runs locally.
pub const SEGMENTATION_PROMPT: &str = r#"
You are a Computer Vision Simulation Engine for MCQ Extraction.
Your goal is to analyze an image of a question paper and simulate the following segmentation pipeline to identify individual questions.

Additionally, you must analyze the CONTENT of the question to predict its SUBJECT and identify the CORRECT ANSWER if it is marked (e.g., ticked, circled, or bolded).

Core Philosophy:
Do not use OCR (Optical Character Recognition) to find split points, as it is unreliable for mixed languages and mathematical symbols. Instead, use Blob Detection (Contour Analysis) on specific Regions of Interest (ROI) to visually identify "islands of ink" (question numbers) and use those coordinates to slice the document.

Pipeline Logic to Simulate:

Phase 1: Layout Analysis & Column Splitting
Goal: Detect if the page has 1, 2, or 3 columns and split them into separate vertical images.
Strategy A (Line Detection):
- Convert image to binary.
- Apply a Morphological Open operation using a tall, thin kernel.
- Find contours of these lines.
- Split the image at the X-coordinates of these lines.

Phase 2: Content Normalization (Trimming)
Goal: Remove variable whitespace margins.
Logic:
- Convert column to binary.
- Find all non-zero pixels (content).
- Calculate the Bounding Box of the content.

Phase 3: Region of Interest (ROI) Extraction
Goal: Isolate the "Question Number Zone".
Logic:
- Extract the Left 12% of the trimmed column.

Phase 4: Blob Detection & Segmentation (The Core Logic)
Goal: Identify cut points based on the position of question numbers in the ROI strip.
- Use dilation to merge digits (e.g. "1" and "0" -> "10").
- Filter noise.
- Map Y-coordinates back to the full column.
- Sort and deduplicate cut points.

Task:
Return a JSON object containing a list of detected questions.
For each question, provide:
1. The question number/ID.
2. The bounding box (ymin, xmin, ymax, xmax) normalized to a 0-1000 scale.
3. The full text content.
4. The PREDICTED SUBJECT of the question (e.g., Physics, Chemistry, Biology, Math, History, General Knowledge). Infer this from the text context.
5. The CORRECT ANSWER if visible (e.g., "A", "B", "C", "D"). If the user has ticked or circled an option in the image, extract that option. If not marked, return null or empty string.

Do not strictly adhere to pixel-perfect algorithmic kernel sizes as you are a VLM, but adhere to the *intent* of separating questions based on vertical spacing and numbering.
"#;

/// User-turn text accompanying the page image.
pub const USER_INSTRUCTION: &str =
    "Perform the MCQ segmentation and content analysis based on the system instructions.";

/// JSON schema constraining the model's structured output.
///
/// Sent as `generationConfig.responseSchema` so the API enforces the shape
/// server-side; the client still strict-parses the returned text because
/// schema enforcement does not survive truncation or refusals.
pub fn response_schema() -> serde_json::Value {
    serde_json::json!({
        "type": "object",
        "properties": {
            "questions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "properties": {
                        "id": { "type": "string", "description": "The detected question number" },
                        "text": { "type": "string", "description": "The full text content" },
                        "subject": { "type": "string", "description": "Inferred subject (Physics, Math, etc.)" },
                        "correctAnswer": { "type": "string", "description": "The marked correct answer if visible" },
                        "boundingBox": {
                            "type": "object",
                            "properties": {
                                "ymin": { "type": "number" },
                                "xmin": { "type": "number" },
                                "ymax": { "type": "number" },
                                "xmax": { "type": "number" }
                            },
                            "required": ["ymin", "xmin", "ymax", "xmax"]
                        }
                    },
                    "required": ["id", "text", "boundingBox"]
                }
            }
        },
        "required": ["questions"]
    })
}
