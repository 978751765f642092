//! Request-frame ingestion.
//!
//! Frames arrive inside JSON request bodies as base64 payloads, either bare
//! or wrapped in a data URL (`data:image/jpeg;base64,<payload>`). This module
//! turns such a payload into an in-memory RGB image; everything downstream
//! works on decoded pixels.

use anyhow::{anyhow, Context, Result};
use base64::prelude::{Engine as _, BASE64_STANDARD};
use image::RgbImage;

/// Decode a base64 or data-URL image payload into RGB8 pixels.
///
/// The prefix before the first comma, if any, is stripped, so both raw
/// base64 and `data:...;base64,...` forms are accepted.
pub fn decode_image(payload: &str) -> Result<RgbImage> {
    let encoded = match payload.split_once(',') {
        Some((_, rest)) => rest,
        None => payload,
    };

    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .context("failed to decode base64 image")?;

    let img = image::load_from_memory(&bytes).context("failed to decode image data")?;
    let rgb = img.to_rgb8();
    if rgb.width() == 0 || rgb.height() == 0 {
        return Err(anyhow!("image has zero dimension"));
    }
    Ok(rgb)
}
