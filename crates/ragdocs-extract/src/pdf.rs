//! PDF text extractor.

use async_trait::async_trait;
use ragdocs_core::{ContentExtractor, ExtractError};
use std::path::Path;
use tracing::debug;

/// Extractor for PDF documents, backed by `pdf-extract`.
pub struct PdfExtractor;

impl PdfExtractor {
    /// Create a new PDF extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for PdfExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for PdfExtractor {
    fn extensions(&self) -> &[&str] {
        &["pdf"]
    }

    async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        debug!("Extracting PDF: {:?}", path);
        let bytes = tokio::fs::read(path).await?;

        // pdf-extract is synchronous and can be slow on large files.
        let text = tokio::task::spawn_blocking(move || {
            pdf_extract::extract_text_from_mem(&bytes).map_err(|e| e.to_string())
        })
        .await
        .map_err(|e| ExtractError::Failed(format!("task join error: {e}")))?
        .map_err(|e| ExtractError::Parse(format!("PDF extraction failed: {e}")))?;

        Ok(text)
    }
}
