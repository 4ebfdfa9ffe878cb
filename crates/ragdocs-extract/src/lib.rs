//! # ragdocs-extract
//!
//! Plain-text extraction for the document formats ragdocs indexes.
//!
//! | Extractor | Formats |
//! |-----------|---------|
//! | [`TextExtractor`] | `.txt` |
//! | [`PdfExtractor`] | `.pdf` |
//! | [`OfficeExtractor`] | `.docx`, `.pptx`, `.odt`, `.epub` |
//!
//! Legacy `.doc` files are accepted by the scanner but have no extractor;
//! [`ExtractorRegistry::extract`] reports them as
//! [`ExtractError::UnsupportedType`](ragdocs_core::ExtractError::UnsupportedType)
//! and the ingestion pipeline indexes them as empty.
//!
//! ```rust,ignore
//! use ragdocs_extract::ExtractorRegistry;
//!
//! let registry = ExtractorRegistry::with_defaults();
//! let text = registry.extract(Path::new("docs/report.pdf")).await?;
//! ```

pub mod office;
pub mod pdf;
pub mod registry;
pub mod text;

pub use office::OfficeExtractor;
pub use pdf::PdfExtractor;
pub use registry::ExtractorRegistry;
pub use text::TextExtractor;
