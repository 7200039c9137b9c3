//! Chat request pipeline: language gate -> embed -> retrieve -> score gate -> answer
//!
//! Each stage sits behind a trait so the HTTP layer and tests can swap in
//! their own embedder, retriever or synthesizer. Every answered request,
//! fallbacks included, is handed to the audit logger when one is attached.

use std::sync::Arc;
use std::time::Instant;

use futures::StreamExt;
use tracing::debug;
use tracing::info;

use crate::audit::chat_log_record;
use crate::audit::AuditLogger;
use crate::config::AppConfig;
use crate::embeddings::query_cache_key;
use crate::embeddings::Embedder;
use crate::embeddings::EmbeddingResultCache;
use crate::errors::Result;
use crate::guard::LanguageGate;
use crate::guard::LanguageVerdict;
use crate::llm::SynthesisEvent;
use crate::llm::SynthesisStream;
use crate::llm::Synthesizer;
use crate::models::AnswerType;
use crate::models::ChatAnswer;
use crate::rag::index::normalize;
use crate::rag::top_score;
use crate::rag::Retriever;
use crate::rag::ScoredChunk;

/// Retrieval thresholds and fixed replies
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub top_k: usize,
    pub max_sources: usize,
    pub min_score: f32,
    pub fallback_answer: String,
    pub language_fallback: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from_config(&AppConfig::default())
    }
}

impl ChatSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            top_k: config.retrieval.top_k,
            max_sources: config.retrieval.max_sources,
            min_score: config.retrieval.min_score,
            fallback_answer: config.fallback_answer(),
            language_fallback: config.assistant.language_fallback.clone(),
        }
    }
}

/// Why a request was answered without the language model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FallbackReason {
    Language,
    LowScore,
}

/// Outcome of everything up to answer synthesis
#[derive(Debug, Clone)]
pub enum Prepared {
    /// Answered with a fixed phrase; already audited.
    Fallback {
        answer: ChatAnswer,
        reason: FallbackReason,
    },
    /// Results good enough to send to the synthesizer, best first.
    Ready(Vec<ScoredChunk>),
}

pub struct ChatService {
    embedder: Arc<dyn Embedder>,
    retriever: Arc<dyn Retriever>,
    synthesizer: Arc<dyn Synthesizer>,
    language_gate: LanguageGate,
    cache: Option<EmbeddingResultCache>,
    audit: Option<Arc<AuditLogger>>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        retriever: Arc<dyn Retriever>,
        synthesizer: Arc<dyn Synthesizer>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            embedder,
            retriever,
            synthesizer,
            language_gate: LanguageGate::default(),
            cache: None,
            audit: None,
            settings,
        }
    }

    #[must_use]
    pub fn with_language_gate(mut self, gate: LanguageGate) -> Self {
        self.language_gate = gate;
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Option<EmbeddingResultCache>) -> Self {
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_audit(mut self, audit: Option<Arc<AuditLogger>>) -> Self {
        self.audit = audit;
        self
    }

    pub fn settings(&self) -> &ChatSettings {
        &self.settings
    }

    pub fn cache(&self) -> Option<&EmbeddingResultCache> {
        self.cache.as_ref()
    }

    /// Run the language gate, embedding and retrieval.
    ///
    /// Errors here come from the embedding provider.
    pub async fn prepare(&self, question: &str, lang: &str, started: Instant) -> Result<Prepared> {
        if let LanguageVerdict::Reject(detected) = self.language_gate.classify(question) {
            info!(
                "Language fallback (detected: {})",
                detected.as_deref().unwrap_or("unknown")
            );
            let answer = ChatAnswer::without_sources(self.settings.language_fallback.clone());
            self.record(question, AnswerType::NoAnswer, &[], started);
            return Ok(Prepared::Fallback {
                answer,
                reason: FallbackReason::Language,
            });
        }

        let embed_started = Instant::now();
        let mut query = self.embed_query(question, lang).await?;
        normalize(&mut query);
        debug!("Embed took {:?}", embed_started.elapsed());

        let search_started = Instant::now();
        let results = self.retriever.search(&query, self.settings.top_k);
        let best = top_score(&results);
        info!(
            "Search took {:?}: {} results, top score {:.4}",
            search_started.elapsed(),
            results.len(),
            best.unwrap_or(0.0)
        );

        if !best.is_some_and(|score| score >= self.settings.min_score) {
            info!("Score fallback (min score {:.2})", self.settings.min_score);
            let answer = ChatAnswer::without_sources(self.settings.fallback_answer.clone());
            self.record(question, AnswerType::NoAnswer, &results, started);
            return Ok(Prepared::Fallback {
                answer,
                reason: FallbackReason::LowScore,
            });
        }
        Ok(Prepared::Ready(results))
    }

    async fn embed_query(&self, question: &str, lang: &str) -> Result<Vec<f32>> {
        let Some(cache) = &self.cache else {
            return self.embedder.embed(question).await;
        };
        let key = query_cache_key(self.embedder.provider(), self.embedder.model(), lang, question);
        if let Some(vector) = cache.get(&key).await {
            debug!("Embedding cache hit");
            return Ok(vector);
        }
        let vector = self.embedder.embed(question).await?;
        cache.put(key, &vector).await;
        debug!("Embedding cache miss");
        Ok(vector)
    }

    /// Blocking answer for retrieved results. Errors come from synthesis.
    pub async fn answer(
        &self,
        question: &str,
        results: &[ScoredChunk],
        started: Instant,
    ) -> Result<ChatAnswer> {
        let answer_started = Instant::now();
        let answer = self.synthesizer.answer(question, results).await?;
        let answer_type = answer.answer_type(&self.settings.fallback_answer);
        info!(
            "Answer took {:?}: {} sources, {}",
            answer_started.elapsed(),
            answer.sources.len(),
            answer_type
        );
        self.record(question, answer_type, results, started);
        Ok(answer)
    }

    /// Streamed answer. The request is audited when the final result is produced.
    pub async fn answer_stream(
        &self,
        question: &str,
        results: Vec<ScoredChunk>,
        started: Instant,
    ) -> Result<SynthesisStream> {
        let stream = self.synthesizer.answer_stream(question, &results).await?;
        let audit = self.audit.clone();
        let question = question.to_string();
        let fallback = self.settings.fallback_answer.clone();
        let max_sources = self.settings.max_sources;
        Ok(Box::pin(stream.inspect(move |event| {
            if let SynthesisEvent::Result(answer) = event {
                let answer_type = answer.answer_type(&fallback);
                info!("Streamed answer done: {} sources, {}", answer.sources.len(), answer_type);
                if let Some(audit) = &audit {
                    audit.log(chat_log_record(
                        &question,
                        answer_type,
                        &results,
                        max_sources,
                        started,
                    ));
                }
            }
        })))
    }

    fn record(&self, question: &str, answer_type: AnswerType, results: &[ScoredChunk], started: Instant) {
        if let Some(audit) = &self.audit {
            audit.log(chat_log_record(
                question,
                answer_type,
                results,
                self.settings.max_sources,
                started,
            ));
        }
    }
}

#[cfg(test)]
mod tests;
