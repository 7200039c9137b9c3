//! Grounded answer synthesis on top of the chat-completion client

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;
use futures::StreamExt;
use tracing::debug;
use tracing::warn;

use crate::errors::Result;
use crate::llm::client::ChatMessage;
use crate::llm::client::LlmClient;
use crate::models::ChatAnswer;
use crate::rag::prompts::build_grounded_prompt;
use crate::rag::prompts::parse_model_reply;
use crate::rag::prompts::PromptPolicy;
use crate::rag::prompts::PromptSource;
use crate::rag::prompts::SYSTEM_PROMPT;
use crate::rag::ScoredChunk;

/// Client-facing message for provider failures; details go to the log.
pub const STREAM_ERROR: &str = "streaming error";

/// One step of a streamed answer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisEvent {
    /// A fragment of the raw model output
    Delta(String),
    /// The validated final answer; always the last event on success
    Result(ChatAnswer),
    /// Terminal failure
    Error(String),
}

pub type SynthesisStream = Pin<Box<dyn Stream<Item = SynthesisEvent> + Send>>;

/// Produces answers grounded in retrieved chunks
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn answer(&self, question: &str, hits: &[ScoredChunk]) -> Result<ChatAnswer>;

    /// Fails only when the stream cannot be started.
    async fn answer_stream(&self, question: &str, hits: &[ScoredChunk])
        -> Result<SynthesisStream>;
}

/// [`Synthesizer`] backed by a JSON-mode chat-completion model
pub struct LlmSynthesizer {
    client: LlmClient,
    policy: PromptPolicy,
    top_k: usize,
    max_sources: usize,
}

impl LlmSynthesizer {
    pub fn new(client: LlmClient, policy: PromptPolicy, top_k: usize, max_sources: usize) -> Self {
        Self {
            client,
            policy,
            top_k,
            max_sources,
        }
    }

    fn messages(&self, question: &str, hits: &[ScoredChunk]) -> (Vec<ChatMessage>, Vec<PromptSource>) {
        let (prompt, offered) = build_grounded_prompt(&self.policy, question, hits, self.top_k);
        (
            vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(prompt)],
            offered,
        )
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn answer(&self, question: &str, hits: &[ScoredChunk]) -> Result<ChatAnswer> {
        let (messages, offered) = self.messages(question, hits);
        let raw = self.client.complete_json(&messages).await?;
        parse_model_reply(&raw, &offered, self.max_sources, &self.policy.fallback_answer)
            .inspect_err(|e| warn!("Discarding model reply ({e}): {raw}"))
    }

    async fn answer_stream(
        &self,
        question: &str,
        hits: &[ScoredChunk],
    ) -> Result<SynthesisStream> {
        let (messages, offered) = self.messages(question, hits);
        let deltas = self.client.complete_json_stream(&messages).await?.into_stream();
        Ok(synthesis_stream(
            deltas,
            offered,
            self.max_sources,
            self.policy.fallback_answer.clone(),
        ))
    }
}

struct Accumulator {
    deltas: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
    text: String,
    offered: Vec<PromptSource>,
    max_sources: usize,
    fallback: String,
}

/// Forward every non-empty delta, then parse the accumulated text into a
/// single `Result` event, or end with an `Error` event.
pub fn synthesis_stream(
    deltas: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
    offered: Vec<PromptSource>,
    max_sources: usize,
    fallback: String,
) -> SynthesisStream {
    let state = Accumulator {
        deltas,
        text: String::new(),
        offered,
        max_sources,
        fallback,
    };
    let stream = futures::stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        loop {
            match state.deltas.next().await {
                Some(Ok(delta)) => {
                    if delta.is_empty() {
                        continue;
                    }
                    state.text.push_str(&delta);
                    return Some((SynthesisEvent::Delta(delta), Some(state)));
                }
                Some(Err(e)) => {
                    warn!("Answer stream failed: {}", e);
                    return Some((SynthesisEvent::Error(STREAM_ERROR.to_string()), None));
                }
                None => {
                    let event = match parse_model_reply(
                        &state.text,
                        &state.offered,
                        state.max_sources,
                        &state.fallback,
                    ) {
                        Ok(answer) => {
                            debug!("Streamed answer complete ({} bytes)", state.text.len());
                            SynthesisEvent::Result(answer)
                        }
                        Err(e) => {
                            warn!("Discarding streamed model reply ({e}): {}", state.text);
                            SynthesisEvent::Error("invalid model json".to_string())
                        }
                    };
                    return Some((event, None));
                }
            }
        }
    });
    Box::pin(stream)
}
