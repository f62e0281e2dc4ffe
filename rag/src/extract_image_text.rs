use std::process::Command;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use image::ImageFormat;
use tracing::debug;

use crate::config::Config;
use crate::error::{RagError, Result};

/// Outcome of running text recognition on a supplied image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ImageText {
    Text(String),
    NoText,
}

impl ImageText {
    pub fn from_ocr_output(raw: &str) -> Self {
        let text = raw.trim_end();
        if text.trim().is_empty() {
            Self::NoText
        } else {
            Self::Text(text.to_string())
        }
    }
}

/// Drops a `data:<mime>;base64,` header if present.
pub fn strip_data_uri(payload: &str) -> &str {
    match payload.split_once(',') {
        Some((_, data)) => data,
        None => payload,
    }
}

pub fn decode_image_payload(payload: &str) -> Result<Vec<u8>> {
    let data: String = strip_data_uri(payload)
        .chars()
        .filter(|c| !c.is_ascii_whitespace())
        .collect();
    STANDARD
        .decode(data.as_bytes())
        .map_err(|e| RagError::Image(format!("invalid base64 payload: {}", e)))
}

/// Decodes the payload, normalises it to PNG and runs the OCR engine on it.
pub fn extract_text_from_base64(cfg: &Config, payload: &str) -> Result<ImageText> {
    let bytes = decode_image_payload(payload)?;
    let img = image::load_from_memory(&bytes)
        .map_err(|e| RagError::Image(format!("undecodable image: {}", e)))?;
    debug!(width = img.width(), height = img.height(), "decoded image");

    let mut file = tempfile::Builder::new()
        .prefix("tds-ocr-")
        .suffix(".png")
        .tempfile()
        .map_err(|e| RagError::Image(format!("temp file: {}", e)))?;
    img.write_to(file.as_file_mut(), ImageFormat::Png)
        .map_err(|e| RagError::Image(format!("re-encode image: {}", e)))?;

    let output = Command::new(&cfg.tesseract_cmd)
        .arg(file.path())
        .arg("stdout")
        .output()
        .map_err(|e| RagError::Image(format!("failed to run {}: {}", cfg.tesseract_cmd, e)))?;
    if !output.status.success() {
        return Err(RagError::Image(format!(
            "{} exited with {}: {}",
            cfg.tesseract_cmd,
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }
    let text = ImageText::from_ocr_output(&String::from_utf8_lossy(&output.stdout));
    debug!(found_text = matches!(text, ImageText::Text(_)), "ocr finished");
    Ok(text)
}
