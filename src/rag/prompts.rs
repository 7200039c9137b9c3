//! Grounded-answer prompts and validation of the model's JSON reply

use std::collections::HashMap;
use std::collections::HashSet;
use std::fmt::Write;

use serde::Deserialize;

use crate::errors::RagChatError;
use crate::errors::Result;
use crate::models::ChatAnswer;
use crate::models::SourceItem;
use crate::rag::ScoredChunk;

/// System message sent ahead of every grounded prompt
pub const SYSTEM_PROMPT: &str = "You must follow the instructions. Output JSON.";

/// The fixed answering policy for one site
#[derive(Debug, Clone)]
pub struct PromptPolicy {
    pub site_name: String,
    pub site_description: String,
    pub fallback_answer: String,
}

impl PromptPolicy {
    pub fn from_config(config: &crate::config::AppConfig) -> Self {
        Self {
            site_name: config.assistant.site_name.clone(),
            site_description: config.assistant.site_description.clone(),
            fallback_answer: config.fallback_answer(),
        }
    }
}

impl Default for PromptPolicy {
    fn default() -> Self {
        Self::from_config(&crate::config::AppConfig::default())
    }
}

/// A source excerpt offered to the model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSource {
    pub title: String,
    pub url: String,
    pub excerpt: String,
}

/// Build the grounded prompt.
///
/// Returns the prompt and the sources it offers, deduplicated by URL in
/// retrieval order and capped at `top_k`.
pub fn build_grounded_prompt(
    policy: &PromptPolicy,
    question: &str,
    hits: &[ScoredChunk],
    top_k: usize,
) -> (String, Vec<PromptSource>) {
    let mut seen = HashSet::new();
    let mut offered = Vec::with_capacity(hits.len().min(top_k));
    for hit in hits {
        if offered.len() >= top_k {
            break;
        }
        if !seen.insert(hit.chunk.url.as_str()) {
            continue;
        }
        offered.push(PromptSource {
            title: hit.chunk.title.clone(),
            url: hit.chunk.url.clone(),
            excerpt: hit.chunk.text.clone(),
        });
    }

    let mut prompt = format!(
        r#"You are a helpful assistant for {site}.com, {description}.
Use ONLY the provided sources to answer. If the answer is not in the sources, say "{fallback}".
Respond in JSON with keys: answer (string) and sources (array of {{title,url}}).
Only include sources you actually used. Do not invent sources.

Question:
{question}

Sources:
"#,
        site = policy.site_name,
        description = policy.site_description,
        fallback = policy.fallback_answer,
    );
    for (i, source) in offered.iter().enumerate() {
        let _ = write!(
            prompt,
            "\n[{}] {}\nURL: {}\nExcerpt:\n{}\n",
            i + 1,
            source.title,
            source.url,
            source.excerpt
        );
    }

    (prompt, offered)
}

/// Keep only cited sources that were actually offered, capped at `max`.
///
/// A missing title is filled from the offered source with the same URL.
pub fn filter_sources(
    offered: &[PromptSource],
    picked: Vec<SourceItem>,
    max: usize,
) -> Vec<SourceItem> {
    let titles: HashMap<&str, &str> = offered
        .iter()
        .map(|s| (s.url.as_str(), s.title.as_str()))
        .collect();

    let mut clean = Vec::with_capacity(picked.len().min(max));
    for mut source in picked {
        if clean.len() >= max {
            break;
        }
        if source.url.is_empty() {
            continue;
        }
        let Some(title) = titles.get(source.url.as_str()) else {
            continue;
        };
        if source.title.is_empty() {
            source.title = (*title).to_string();
        }
        clean.push(source);
    }
    clean
}

#[derive(Deserialize)]
struct ModelReply {
    #[serde(default)]
    answer: String,
    #[serde(default)]
    sources: Vec<SourceItem>,
}

/// Parse the model's JSON reply into a validated answer.
pub fn parse_model_reply(
    raw: &str,
    offered: &[PromptSource],
    max_sources: usize,
    fallback: &str,
) -> Result<ChatAnswer> {
    let reply: ModelReply = serde_json::from_str(raw.trim())
        .map_err(|e| RagChatError::InvalidModelOutput(format!("invalid model json: {e}")))?;

    let answer = reply.answer.trim();
    if answer.is_empty() {
        return Ok(ChatAnswer::without_sources(fallback));
    }
    Ok(ChatAnswer {
        answer: answer.to_string(),
        sources: filter_sources(offered, reply.sources, max_sources),
    })
}

/// Prompt for the offline search tool, which prints it instead of sending it.
pub fn build_search_prompt(policy: &PromptPolicy, question: &str, hits: &[ScoredChunk]) -> String {
    let (mut prompt, _) = build_grounded_prompt(policy, question, hits, hits.len());
    prompt.push_str("\nAnswer:\n");
    prompt
}
