//! Chunk storage for ragdocs.
//!
//! Two implementations of [`ChunkStore`](ragdocs_core::ChunkStore):
//!
//! - [`MemoryStore`]: in-process map, optionally persisted as a JSON snapshot.
//! - `LanceStore` (feature `lancedb`): on-disk `LanceDB` table with native
//!   cosine vector search.
//!
//! Both treat inserts as insert-if-absent keyed by chunk id, so the first
//! file to contribute a chunk keeps its attribution.
//!
//! # Example
//!
//! ```rust,ignore
//! use ragdocs_store::MemoryStore;
//! use ragdocs_core::ChunkStore;
//!
//! let store = MemoryStore::persistent("index/chunks.json".into(), 384);
//! store.init().await?;
//! let inserted = store.insert_many(&records).await?;
//! ```

#[cfg(feature = "lancedb")]
pub mod lancedb;
pub mod memory;
#[cfg(feature = "lancedb")]
pub mod schema;

#[cfg(feature = "lancedb")]
pub use lancedb::LanceStore;
pub use memory::MemoryStore;
