use std::collections::HashMap;

use serde::Deserialize;
use serde::Serialize;

/// A passage of corpus content, as produced by the exporter.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Chunk {
    pub chunk_id: String,
    pub doc_id: i64,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub slug: String,
    pub title: String,
    pub url: String,
    pub modified_gmt: String,
    pub index_page: bool,
    pub text: String,
    pub char_len: usize,
}

/// One record of the exporter's flat `.json` array format.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct RawChunk {
    pub id: i64,
    #[serde(rename = "type")]
    pub doc_type: String,
    pub slug: String,
    pub title: String,
    pub url: String,
    pub modified_gmt: String,
    pub content_text: String,
}

impl From<RawChunk> for Chunk {
    fn from(raw: RawChunk) -> Self {
        let char_len = raw.content_text.len();
        Self {
            chunk_id: format!("{}-{}", raw.slug, raw.id),
            doc_id: raw.id,
            doc_type: raw.doc_type,
            slug: raw.slug,
            title: raw.title,
            url: raw.url,
            modified_gmt: raw.modified_gmt,
            index_page: false,
            text: raw.content_text,
            char_len,
        }
    }
}

/// A precomputed chunk embedding stored in the embedding cache file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedCacheRecord {
    pub id: String,
    /// Hex SHA-1 of the chunk text the vector was computed from.
    pub hash: String,
    pub dim: usize,
    pub vector: Vec<f32>,
    pub updated_at: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbedCache {
    pub model: String,
    pub items: HashMap<String, EmbedCacheRecord>,
}

/// A cited source in a chat answer
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceItem {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub url: String,
}

/// A final chat answer with the sources it cites
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatAnswer {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<SourceItem>,
}

impl ChatAnswer {
    /// An answer with no sources, used for fallbacks.
    pub fn without_sources(answer: impl Into<String>) -> Self {
        Self {
            answer: answer.into(),
            sources: Vec::new(),
        }
    }

    /// Classify the answer for the audit log.
    pub fn answer_type(&self, fallback: &str) -> AnswerType {
        if self.answer.trim() == fallback && self.sources.is_empty() {
            AnswerType::NoAnswer
        } else {
            AnswerType::Grounded
        }
    }
}

/// How a chat request was ultimately answered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Grounded,
    NoAnswer,
}

impl AnswerType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grounded => "grounded",
            Self::NoAnswer => "no_answer",
        }
    }
}

impl std::fmt::Display for AnswerType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Audit record persisted for each answered chat request.
///
/// Only the redacted question is ever stored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatLogRecord {
    pub question_redacted: String,
    pub question_hash: String,
    pub answer_type: AnswerType,
    pub top_sources: Vec<String>,
    pub top_scores: Vec<f32>,
    pub latency_ms: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_chunk_conversion() {
        let raw = RawChunk {
            id: 42,
            doc_type: "post".to_string(),
            slug: "best-beaches".to_string(),
            title: "Best beaches".to_string(),
            url: "https://alicanteabout.com/best-beaches/".to_string(),
            modified_gmt: "2024-05-01T10:00:00".to_string(),
            content_text: "Playa del Postiguet".to_string(),
        };
        let chunk = Chunk::from(raw);
        assert_eq!(chunk.chunk_id, "best-beaches-42");
        assert_eq!(chunk.doc_id, 42);
        assert_eq!(chunk.char_len, 19);
        assert!(!chunk.index_page);
    }

    #[test]
    fn test_chunk_json_uses_type_key() {
        let chunk: Chunk =
            serde_json::from_str(r#"{"chunk_id":"a-1","type":"page","text":"hi"}"#).unwrap();
        assert_eq!(chunk.doc_type, "page");
        assert_eq!(chunk.text, "hi");
        assert!(chunk.url.is_empty());
    }

    #[test]
    fn test_answer_classification() {
        let fallback = "I don't know based on AlicanteAbout content.";
        assert_eq!(
            ChatAnswer::without_sources(fallback).answer_type(fallback),
            AnswerType::NoAnswer
        );
        assert_eq!(
            ChatAnswer::without_sources(format!("  {fallback}\n")).answer_type(fallback),
            AnswerType::NoAnswer
        );

        let cited = ChatAnswer {
            answer: fallback.to_string(),
            sources: vec![SourceItem {
                title: "Beaches".to_string(),
                url: "https://alicanteabout.com/beaches/".to_string(),
            }],
        };
        assert_eq!(cited.answer_type(fallback), AnswerType::Grounded);
        assert_eq!(
            ChatAnswer::without_sources("Take tram line 4.").answer_type(fallback),
            AnswerType::Grounded
        );
    }

    #[test]
    fn test_answer_type_strings() {
        assert_eq!(AnswerType::Grounded.as_str(), "grounded");
        assert_eq!(AnswerType::NoAnswer.to_string(), "no_answer");
        assert_eq!(
            serde_json::to_string(&AnswerType::NoAnswer).unwrap(),
            "\"no_answer\""
        );
    }
}
