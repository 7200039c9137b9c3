//! In-memory vector index of unit-normalized chunk embeddings

use std::sync::Arc;

use tracing::debug;
use tracing::warn;

use crate::corpus::text_hash;
use crate::models::Chunk;
use crate::models::EmbedCache;
use crate::models::EmbedCacheRecord;

/// A chunk paired with its normalized embedding
#[derive(Debug, Clone)]
pub struct Entry {
    pub chunk: Arc<Chunk>,
    pub vector: Vec<f32>,
}

/// Immutable set of entries, safe to share across requests.
#[derive(Debug, Default)]
pub struct VectorIndex {
    entries: Vec<Entry>,
}

impl VectorIndex {
    /// Build the index from loaded chunks and the embedding cache.
    ///
    /// Chunks without a usable cached embedding for `model` are left out.
    pub fn build(chunks: Vec<Chunk>, cache: &EmbedCache, model: &str) -> Self {
        if cache.model != model {
            warn!(
                "Embedding cache model {:?} does not match configured model {:?}",
                cache.model, model
            );
            return Self::default();
        }

        let total = chunks.len();
        let mut skipped = 0usize;
        let mut entries = Vec::with_capacity(total);
        for chunk in chunks {
            let Some(record) = cache.items.get(&chunk.chunk_id) else {
                skipped += 1;
                continue;
            };
            if !is_usable(record, &chunk) {
                skipped += 1;
                continue;
            }
            let mut vector = record.vector.clone();
            normalize(&mut vector);
            entries.push(Entry {
                chunk: Arc::new(chunk),
                vector,
            });
        }

        debug!(
            "Built vector index: {} entries, {} of {} chunks skipped",
            entries.len(),
            skipped,
            total
        );
        Self { entries }
    }

    pub fn from_entries(entries: Vec<Entry>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }
}

fn is_usable(record: &EmbedCacheRecord, chunk: &Chunk) -> bool {
    if record.vector.is_empty() {
        return false;
    }
    if record.dim > 0 && record.dim != record.vector.len() {
        return false;
    }
    // Records written without a hash cannot be checked for staleness.
    record.hash.is_empty() || record.hash == text_hash(&chunk.text)
}

/// Scale a vector to unit L2 norm in place; zero vectors are left unchanged.
pub fn normalize(vector: &mut [f32]) {
    let norm = vector
        .iter()
        .map(|&x| f64::from(x) * f64::from(x))
        .sum::<f64>()
        .sqrt();
    if norm <= 0.0 {
        return;
    }
    for x in vector.iter_mut() {
        *x = (f64::from(*x) / norm) as f32;
    }
}

/// Dot product over the common prefix of two vectors.
pub fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn chunk(id: &str, text: &str) -> Chunk {
        Chunk {
            chunk_id: id.to_string(),
            url: format!("https://example.com/{id}"),
            text: text.to_string(),
            ..Chunk::default()
        }
    }

    fn record(id: &str, hash: String, vector: Vec<f32>) -> EmbedCacheRecord {
        EmbedCacheRecord {
            id: id.to_string(),
            hash,
            dim: vector.len(),
            vector,
            updated_at: String::new(),
        }
    }

    fn cache(model: &str, records: Vec<EmbedCacheRecord>) -> EmbedCache {
        EmbedCache {
            model: model.to_string(),
            items: records
                .into_iter()
                .map(|r| (r.id.clone(), r))
                .collect::<HashMap<_, _>>(),
        }
    }

    #[test]
    fn test_normalize() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }

    #[test]
    fn test_dot_uses_shorter_length() {
        assert!((dot(&[1.0, 2.0, 3.0], &[1.0, 1.0]) - 3.0).abs() < 1e-6);
        assert!(dot(&[], &[1.0]).abs() < f32::EPSILON);
    }

    #[test]
    fn test_build_normalizes_and_filters() {
        let chunks = vec![
            chunk("fresh", "castle"),
            chunk("stale", "beach"),
            chunk("missing", "market"),
            chunk("empty", "museum"),
            chunk("unhashed", "harbour"),
        ];
        let cache = cache(
            "m",
            vec![
                record("fresh", text_hash("castle"), vec![3.0, 4.0]),
                record("stale", text_hash("old beach text"), vec![1.0, 0.0]),
                record("empty", text_hash("museum"), vec![]),
                record("unhashed", String::new(), vec![0.0, 2.0]),
            ],
        );

        let index = VectorIndex::build(chunks, &cache, "m");
        let ids: Vec<&str> = index
            .entries()
            .iter()
            .map(|e| e.chunk.chunk_id.as_str())
            .collect();
        assert_eq!(ids, vec!["fresh", "unhashed"]);
        let norm: f32 = index.entries()[0].vector.iter().map(|x| x * x).sum();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn test_build_does_not_alias_cache_vectors() {
        let cache = cache("m", vec![record("a", String::new(), vec![2.0, 0.0])]);
        let index = VectorIndex::build(vec![chunk("a", "x")], &cache, "m");
        assert_eq!(index.entries()[0].vector, vec![1.0, 0.0]);
        assert_eq!(cache.items["a"].vector, vec![2.0, 0.0]);
    }

    #[test]
    fn test_build_rejects_other_model() {
        let cache = cache("other-model", vec![record("a", String::new(), vec![1.0])]);
        let index = VectorIndex::build(vec![chunk("a", "x")], &cache, "m");
        assert!(index.is_empty());
    }

    #[test]
    fn test_build_rejects_dimension_mismatch() {
        let mut bad = record("a", String::new(), vec![1.0, 0.0]);
        bad.dim = 3;
        let cache = cache("m", vec![bad]);
        let index = VectorIndex::build(vec![chunk("a", "x")], &cache, "m");
        assert_eq!(index.len(), 0);
    }
}
