//! Tool-facing operations for an agent layer.

use crate::retriever::Retriever;
use ragdocs_core::{Error, Result, normalize_filter};
use ragdocs_index::discover_files;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Arguments of the retrieval tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetrieveRequest {
    pub prompt: String,
    /// Restrict results to this file; empty means no restriction
    #[serde(default)]
    pub filename: Option<String>,
}

impl RetrieveRequest {
    pub fn new(prompt: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            filename: None,
        }
    }

    #[must_use]
    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// Retrieval and file listing over one watched folder.
pub struct DocumentTools {
    root: PathBuf,
    retriever: Retriever,
}

impl DocumentTools {
    pub fn new(root: PathBuf, retriever: Retriever) -> Self {
        Self { root, retriever }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn retriever(&self) -> &Retriever {
        &self.retriever
    }

    /// Context text for `request.prompt`, optionally limited to one file.
    pub async fn retrieve_text(&self, request: &RetrieveRequest) -> Result<String> {
        if request.prompt.trim().is_empty() {
            return Err(Error::InvalidInput("prompt must not be empty".to_string()));
        }
        let filter = request
            .filename
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .map(|name| normalize_filter(&self.root, name));
        debug!("retrieve_text filter: {:?}", filter);

        self.retriever
            .retrieve(&request.prompt, filter.as_deref())
            .await
    }

    /// Relative paths of every accepted file in the folder.
    pub async fn search_file_name(&self) -> Result<Vec<String>> {
        discover_files(&self.root).await
    }
}
