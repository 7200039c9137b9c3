//! Similarity search over the vector index

use crate::rag::index::dot;
use crate::rag::ScoredChunk;
use crate::rag::VectorIndex;

/// Nearest-neighbour search over embedded chunks
pub trait Retriever: Send + Sync {
    /// Return at most `k` chunks ordered by descending score.
    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk>;
}

impl Retriever for VectorIndex {
    fn search(&self, query: &[f32], k: usize) -> Vec<ScoredChunk> {
        if k == 0 || self.is_empty() {
            return Vec::new();
        }

        let mut scored: Vec<ScoredChunk> = self
            .entries()
            .iter()
            .map(|entry| ScoredChunk {
                chunk: entry.chunk.clone(),
                score: dot(query, &entry.vector),
            })
            .collect();

        // Stable sort: equal scores keep index order.
        scored.sort_by(|a, b| b.score.total_cmp(&a.score));
        scored.truncate(k);
        scored
    }
}
