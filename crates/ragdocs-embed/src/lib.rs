//! # ragdocs-embed
//!
//! Embedding generation for ragdocs.
//!
//! ## Cargo Features
//!
//! - `candle` (default): local sentence-transformer inference with Candle
//! - Without `candle`: only [`HashingEmbedder`] is available
//!
//! ## Components
//!
//! | Type | Description |
//! |------|-------------|
//! | [`CandleEmbedder`] | `all-MiniLM-L6-v2` embeddings, 384 dimensions (requires `candle` feature) |
//! | [`HashingEmbedder`] | Deterministic token-hashing embedder for offline use and tests |
//! | [`EmbedderPool`] | Semaphore-limited wrapper that batches and checks dimensions |
//!
//! ## Usage
//!
//! ```rust,ignore
//! use ragdocs_embed::{CandleEmbedder, EmbedderPool};
//! use ragdocs_core::EmbeddingConfig;
//! use std::sync::Arc;
//!
//! let embedder = CandleEmbedder::new(models_dir);
//! embedder.init().await?; // downloads the model on first run
//!
//! let pool = EmbedderPool::new(Arc::new(embedder), 2);
//! let vectors = pool.embed_batch(&["first chunk", "second chunk"], &EmbeddingConfig::default()).await?;
//! ```

#[cfg(feature = "candle")]
pub mod candle;
pub mod hashing;
pub mod pool;

#[cfg(feature = "candle")]
pub use candle::CandleEmbedder;
pub use hashing::HashingEmbedder;
pub use pool::EmbedderPool;
