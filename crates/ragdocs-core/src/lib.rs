//! # ragdocs-core
//!
//! Core types and traits for ragdocs, a document-folder retrieval backend.
//!
//! The ingestion path is a straight pipeline:
//!
//! ```text
//! File → ContentExtractor → splitter → fingerprint → Embedder → ChunkStore
//!                                                                  ↓
//!                                                  VectorQuery → SearchHit
//! ```
//!
//! ## Key Types
//!
//! | Type | Description |
//! |------|-------------|
//! | [`ChunkRecord`] | A stored chunk: fingerprint id, encoded payload, embedding, source file |
//! | [`FileEvent`] | Typed file system notification |
//! | [`VectorQuery`] | Parameters for a nearest-neighbour search |
//! | [`SearchHit`] | A matching record with similarity score |
//!
//! ## Key Traits
//!
//! | Trait | Purpose |
//! |-------|---------|
//! | [`ContentExtractor`] | Extract plain text from files |
//! | [`Embedder`] | Generate vector embeddings |
//! | [`ChunkStore`] | Store, deduplicate and search chunk records |
//!
//! ## Identity and paths
//!
//! [`fingerprint`] gives each chunk a content-addressed id, and
//! [`normalize_source`] gives each file a single `/`-separated key. Both are
//! pure functions; dedup and reconciliation depend on that.

pub mod error;
pub mod fingerprint;
pub mod path;
pub mod traits;
pub mod types;

pub use error::{ChunkError, CodecError, EmbedError, Error, ExtractError, Result, StoreError};
pub use fingerprint::{decode_payload, encode_payload, fingerprint};
pub use path::{ACCEPTED_EXTENSIONS, is_accepted, is_hidden, normalize_filter, normalize_source};
pub use traits::*;
pub use types::*;
