//! Input classification for the `Choose` step.
//!
//! Decides whether a user-supplied file enters the single-image path, the
//! batch path, or short-circuits to bulk import. Magic bytes first (via
//! `infer`), extension as a fallback for formats without a reliable
//! signature (CSV in particular).

use crate::model::{InputKind, RawInput};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClassifyError {
    #[error("Unsupported file type: {0}")]
    UnsupportedFileType(String),

    #[error("Empty file: {0}")]
    EmptyFile(String),
}

/// Spreadsheet extensions accepted by the bulk-import path.
const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "csv"];

/// Classify raw bytes into an [`InputKind`], or reject them.
pub fn classify_bytes(bytes: &[u8], original_name: &str) -> Result<InputKind, ClassifyError> {
    if bytes.is_empty() {
        return Err(ClassifyError::EmptyFile(original_name.to_string()));
    }

    if let Some(kind) = infer::get(bytes) {
        let mime = kind.mime_type();
        if mime.starts_with("image/") {
            return Ok(InputKind::Image);
        }
        if mime == "application/pdf" {
            return Ok(InputKind::Document);
        }
        // xlsx is a zip container, xls is OLE2; infer reports both under
        // their office mime types.
        if mime.contains("spreadsheet") || mime == "application/vnd.ms-excel" {
            return Ok(InputKind::Spreadsheet);
        }
        // A zip with an .xlsx extension is almost certainly a spreadsheet
        // whose inner content types infer did not inspect.
        if mime == "application/zip" && has_extension(original_name, SPREADSHEET_EXTENSIONS) {
            return Ok(InputKind::Spreadsheet);
        }
    }

    // No recognizable signature: CSVs are plain text, so fall back to the
    // extension before giving up.
    if has_extension(original_name, SPREADSHEET_EXTENSIONS) {
        return Ok(InputKind::Spreadsheet);
    }

    Err(ClassifyError::UnsupportedFileType(
        original_name.to_string(),
    ))
}

/// Build a [`RawInput`] from bytes, classifying as we go.
pub fn classify(
    bytes: Vec<u8>,
    original_name: &str,
    content_type: &str,
) -> Result<RawInput, ClassifyError> {
    let kind = classify_bytes(&bytes, original_name)?;
    Ok(RawInput::new(kind, bytes, original_name, content_type))
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    name.rsplit('.')
        .next()
        .map(|ext| extensions.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
