//! Loading of exported corpus chunks and their precomputed embeddings.
//!
//! Two chunk formats are accepted: a `.json` array of raw exporter records,
//! or JSON Lines (any other extension) with one full [`Chunk`] per line.

use std::io::BufRead;
use std::io::BufReader;
use std::path::Path;

use sha1::Digest;
use sha1::Sha1;
use tracing::debug;
use tracing::info;

use crate::config::AppConfig;
use crate::errors::RagChatError;
use crate::errors::Result;
use crate::models::Chunk;
use crate::models::EmbedCache;
use crate::models::RawChunk;
use crate::rag::VectorIndex;

/// Read chunks from a JSON array (`.json`) or JSON Lines file.
pub fn read_chunks<P: AsRef<Path>>(path: P) -> Result<Vec<Chunk>> {
    let path = path.as_ref();
    let is_array = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let chunks = if is_array {
        read_chunks_array(reader)?
    } else {
        read_chunks_lines(reader)?
    };
    debug!("Loaded {} chunks from {}", chunks.len(), path.display());
    Ok(chunks)
}

fn read_chunks_array<R: std::io::Read>(reader: R) -> Result<Vec<Chunk>> {
    let raw: Vec<RawChunk> = serde_json::from_reader(reader)
        .map_err(|e| RagChatError::Corpus(format!("failed to decode JSON array: {e}")))?;
    Ok(raw.into_iter().map(Chunk::from).collect())
}

fn read_chunks_lines<R: BufRead>(reader: R) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for (line_no, line) in reader.lines().enumerate() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let chunk: Chunk = serde_json::from_str(line).map_err(|e| {
            RagChatError::Corpus(format!("bad jsonl line {}: {e}", line_no + 1))
        })?;
        chunks.push(chunk);
    }
    Ok(chunks)
}

/// Load the embedding cache file; a missing file is an empty cache.
pub fn load_embed_cache<P: AsRef<Path>>(path: P) -> Result<EmbedCache> {
    let path = path.as_ref();
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!("No embedding cache at {}, starting empty", path.display());
            return Ok(EmbedCache::default());
        }
        Err(e) => return Err(e.into()),
    };
    let cache: EmbedCache = serde_json::from_slice(&bytes)
        .map_err(|e| RagChatError::Corpus(format!("failed to decode embedding cache: {e}")))?;
    Ok(cache)
}

/// Load chunks and cached embeddings from the configured paths and build the index.
///
/// Fails when no chunk has a usable embedding.
pub fn load_index(config: &AppConfig) -> Result<VectorIndex> {
    let chunks = read_chunks(&config.corpus.chunks_path)?;
    let cache = load_embed_cache(&config.corpus.cache_path)?;
    let total = chunks.len();
    let index = VectorIndex::build(chunks, &cache, &config.embeddings.model);
    if index.is_empty() {
        return Err(RagChatError::Corpus(format!(
            "no usable embeddings for {} chunks in {} (model {})",
            total, config.corpus.cache_path, config.embeddings.model
        )));
    }
    info!("📚 Vector index ready: {} of {} chunks", index.len(), total);
    Ok(index)
}

/// Hex SHA-1 of chunk text, used to detect stale cached embeddings.
pub fn text_hash(text: &str) -> String {
    hex::encode(Sha1::digest(text.as_bytes()))
}
