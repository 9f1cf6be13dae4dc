//! Data-URL encoding and decoding.
//!
//! Every image that crosses a service boundary travels as a self-describing
//! `data:<mime>;base64,<payload>` string. Inputs are accepted both with and
//! without the prefix; outputs always carry it. PNG is used throughout
//! because it is lossless — JPEG artefacts on rendered text degrade both
//! the model's box placement and the readability of crops.

use crate::error::AnalysisError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::DynamicImage;
use std::io::Cursor;
use tracing::debug;

/// Prefix emitted on every encoded PNG.
pub const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Encode an image as a PNG data URL.
pub fn encode_png_data_url(img: &DynamicImage) -> Result<String, AnalysisError> {
    let mut buf = Vec::new();
    img.write_to(&mut Cursor::new(&mut buf), image::ImageFormat::Png)
        .map_err(|e| AnalysisError::Internal(format!("PNG encoding failed: {e}")))?;

    let b64 = STANDARD.encode(&buf);
    debug!("Encoded {}x{} image → {} bytes base64", img.width(), img.height(), b64.len());
    Ok(format!("{PNG_DATA_URL_PREFIX}{b64}"))
}

/// Strip an optional `data:<mime>;base64,` prefix, returning the bare payload.
pub fn strip_data_url_prefix(payload: &str) -> &str {
    match payload.split_once("base64,") {
        Some((_, rest)) => rest,
        None => payload,
    }
}

/// Decode a base64 payload (with or without data-URL prefix) to raw bytes.
///
/// Payloads arriving from browsers occasionally lose their `=` padding in
/// transit; missing padding is restored before decoding rather than
/// rejected.
pub fn decode_base64(payload: &str) -> Result<Vec<u8>, AnalysisError> {
    let bare = strip_data_url_prefix(payload).trim();

    let padded;
    let input = match bare.len() % 4 {
        0 => bare,
        rem => {
            padded = format!("{}{}", bare, "=".repeat(4 - rem));
            &padded
        }
    };

    STANDARD
        .decode(input)
        .map_err(|e| AnalysisError::InvalidImage {
            detail: format!("base64 decode failed: {e}"),
        })
}

/// Decode a base64 image payload into a [`DynamicImage`].
pub fn decode_image(payload: &str) -> Result<DynamicImage, AnalysisError> {
    let bytes = decode_base64(payload)?;
    image::load_from_memory(&bytes).map_err(|e| AnalysisError::InvalidImage {
        detail: format!("image decode failed: {e}"),
    })
}
