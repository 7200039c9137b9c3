//! Query embedding generation
//!
//! This module turns user questions into embedding vectors:
//! - OpenAI-compatible `/embeddings` endpoints
//! - Ollama (local models)
//! - A bounded LRU of recent query embeddings
//!
//! # Examples
//!
//! ```rust,no_run
//! use ragchat::config::AppConfig;
//! use ragchat::embeddings::{EmbeddingClient, Embedder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::load()?;
//!     let client = EmbeddingClient::from_app_config(&config)?;
//!
//!     let embedding = client.embed("Where can I eat paella?").await?;
//!     println!("Generated embedding with {} dimensions", embedding.len());
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod client;

use async_trait::async_trait;
pub use cache::EmbeddingResultCache;
pub use client::EmbeddingClient;
pub use client::EmbeddingProvider;

use crate::errors::Result;

/// Anything that can embed a single piece of text
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Provider name, used in query cache keys.
    fn provider(&self) -> &str;

    /// Model name, used in query cache keys.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>>;
}

/// Key under which a query embedding is cached.
pub fn query_cache_key(provider: &str, model: &str, lang: &str, question: &str) -> String {
    format!("{provider}:{model}:{lang}:{question}")
}
