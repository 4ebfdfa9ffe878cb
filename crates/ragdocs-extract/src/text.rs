//! Plain text extractor.

use async_trait::async_trait;
use ragdocs_core::{ContentExtractor, ExtractError};
use std::path::Path;
use tokio::fs;
use tracing::warn;

/// Extractor for `.txt` files.
pub struct TextExtractor;

impl TextExtractor {
    /// Create a new text extractor.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Default for TextExtractor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ContentExtractor for TextExtractor {
    fn extensions(&self) -> &[&str] {
        &["txt"]
    }

    async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let bytes = fs::read(path).await?;
        match String::from_utf8(bytes) {
            Ok(text) => Ok(text),
            Err(e) => {
                warn!("{} is not valid UTF-8, decoding lossily", path.display());
                Ok(String::from_utf8_lossy(e.as_bytes()).into_owned())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_extract_utf8() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("notes.txt");
        std::fs::write(&path, "alpha beta gamma").unwrap();

        let text = TextExtractor::new().extract(&path).await.unwrap();
        assert_eq!(text, "alpha beta gamma");
    }

    #[tokio::test]
    async fn test_extract_invalid_utf8_is_lossy() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("latin1.txt");
        std::fs::write(&path, [b'c', b'a', b'f', 0xe9]).unwrap();

        let text = TextExtractor::new().extract(&path).await.unwrap();
        assert!(text.starts_with("caf"));
    }

    #[tokio::test]
    async fn test_missing_file_is_io_error() {
        let dir = tempdir().unwrap();
        let err = TextExtractor::new()
            .extract(&dir.path().join("missing.txt"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExtractError::Io(_)));
    }

    #[test]
    fn test_can_extract_case_insensitive() {
        let extractor = TextExtractor::new();
        assert!(extractor.can_extract(Path::new("a.TXT")));
        assert!(!extractor.can_extract(Path::new("a.pdf")));
    }
}
