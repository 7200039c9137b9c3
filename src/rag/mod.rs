//! Retrieval over the pre-embedded corpus
//!
//! This module provides the retrieval half of the chat pipeline:
//! - An immutable in-memory vector index built once at startup
//! - Brute-force cosine similarity search returning an ordered top-K
//! - Prompt assembly and source filtering for grounded answers
//!
//! # Examples
//!
//! ```rust,no_run
//! use ragchat::corpus;
//! use ragchat::rag::{Retriever, VectorIndex};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let chunks = corpus::read_chunks("./out/alicanteabout_chunks.json")?;
//!     let cache = corpus::load_embed_cache("./out/embeddings_cache.json")?;
//!     let index = VectorIndex::build(chunks, &cache, "text-embedding-3-small");
//!
//!     let query = vec![0.1_f32; 1536];
//!     for hit in index.search(&query, 3) {
//!         println!("{:.3} {}", hit.score, hit.chunk.url);
//!     }
//!     Ok(())
//! }
//! ```

pub mod index;
pub mod prompts;
pub mod retriever;

use std::sync::Arc;

pub use index::Entry;
pub use index::VectorIndex;
pub use prompts::PromptPolicy;
pub use retriever::Retriever;

use crate::models::Chunk;

/// A retrieved chunk with its similarity to the query
#[derive(Debug, Clone)]
pub struct ScoredChunk {
    pub chunk: Arc<Chunk>,
    pub score: f32,
}

/// Highest score among results, which arrive sorted best first.
pub fn top_score(results: &[ScoredChunk]) -> Option<f32> {
    results.first().map(|r| r.score)
}
