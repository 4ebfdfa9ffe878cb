//! Retrieval and tool-facing API for ragdocs.
//!
//! [`Retriever`] embeds a prompt and returns the nearest stored chunks;
//! [`DocumentTools`] wraps it with the two operations exposed to an agent:
//! retrieval with an optional file filter, and listing the folder's files.

pub mod retriever;
pub mod tools;

pub use retriever::{RetrievedChunk, Retriever, RetrieverConfig};
pub use tools::{DocumentTools, RetrieveRequest};
