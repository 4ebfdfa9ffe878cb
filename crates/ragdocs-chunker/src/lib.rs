//! Text chunking for ragdocs.
//!
//! Chunk boundaries feed straight into content fingerprints, so splitting must
//! be deterministic: the same text and configuration always produce the same
//! sequence.

pub mod recursive;

pub use recursive::{RecursiveSplitter, SEPARATORS};
