use std::path::Path;

use crate::statement::PdfError;

/// Abstraction over PDF text extraction.
pub trait TextExtractor: Send + Sync {
    fn extract_text(&self, path: &Path) -> Result<String, PdfError>;
}

/// Extracts the text layer with `pdf-extract`.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, path: &Path) -> Result<String, PdfError> {
        let bytes = std::fs::read(path)?;
        pdf_extract::extract_text_from_mem(&bytes).map_err(|e| PdfError::Extract(e.to_string()))
    }
}

// ── Fixed text (tests and pre-extracted statements) ──────────────────────────

/// Returns a pre-set string regardless of the file, so statement parsing can be
/// exercised without a real PDF.
#[derive(Debug, Clone)]
pub struct StaticText {
    pub text: String,
}

impl StaticText {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

impl TextExtractor for StaticText {
    fn extract_text(&self, _path: &Path) -> Result<String, PdfError> {
        Ok(self.text.clone())
    }
}
