//! Extractor registry for managing content extractors.

use ragdocs_core::{ContentExtractor, ExtractError};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use crate::{OfficeExtractor, PdfExtractor, TextExtractor};

/// Routes files to extractors by lowercase extension.
pub struct ExtractorRegistry {
    /// Named extractors
    extractors: HashMap<String, Arc<dyn ContentExtractor>>,
    /// Extension to extractor name mapping
    extension_mapping: HashMap<String, String>,
}

impl ExtractorRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            extractors: HashMap::new(),
            extension_mapping: HashMap::new(),
        }
    }

    /// Registry with every built-in extractor.
    #[must_use]
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("text", TextExtractor::new());
        registry.register("pdf", PdfExtractor::new());
        registry.register("office", OfficeExtractor::new());
        registry
    }

    /// Register an extractor. Later registrations win for shared extensions.
    pub fn register<E: ContentExtractor + 'static>(&mut self, name: &str, extractor: E) {
        let extractor = Arc::new(extractor);
        for ext in extractor.extensions() {
            self.extension_mapping
                .insert(ext.to_ascii_lowercase(), name.to_string());
        }
        self.extractors.insert(name.to_string(), extractor);
    }

    /// Get an extractor that can handle a file.
    #[must_use]
    pub fn get_for_file(&self, path: &Path) -> Option<Arc<dyn ContentExtractor>> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        self.extension_mapping
            .get(&ext)
            .and_then(|name| self.extractors.get(name))
            .cloned()
    }

    /// Extract plain text from a file.
    pub async fn extract(&self, path: &Path) -> Result<String, ExtractError> {
        let extractor = self.get_for_file(path).ok_or_else(|| {
            ExtractError::UnsupportedType(
                path.extension()
                    .and_then(|e| e.to_str())
                    .unwrap_or("<none>")
                    .to_string(),
            )
        })?;

        extractor.extract(path).await
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        Self::new()
    }
}
