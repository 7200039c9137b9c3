//! Streaming response handling

use std::collections::VecDeque;
use std::fmt::Display;
use std::pin::Pin;

use futures::Stream;
use futures::StreamExt;
use serde::Deserialize;

use crate::errors::RagChatError;
use crate::errors::Result;

/// Streaming response from LLM
pub struct StreamingResponse {
    stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>,
}

impl StreamingResponse {
    pub fn new(stream: Pin<Box<dyn Stream<Item = Result<String>> + Send>>) -> Self {
        Self { stream }
    }

    /// Turn a raw server-sent-events body into a stream of content deltas.
    ///
    /// Reading stops at `data: [DONE]` or at the end of the body. Lines that
    /// are not `data:` lines, or whose JSON does not parse, are skipped.
    pub fn from_sse_body<S, B, E>(body: S) -> Self
    where
        S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
        B: AsRef<[u8]> + Send + 'static,
        E: Display + Send + 'static,
    {
        let state = DeltaState {
            body: Box::pin(body),
            decoder: SseLineDecoder::default(),
            pending: VecDeque::new(),
            done: false,
        };
        let stream = futures::stream::unfold(state, |mut state| async move {
            loop {
                if let Some(delta) = state.pending.pop_front() {
                    return Some((Ok(delta), state));
                }
                if state.done {
                    return None;
                }
                match state.body.next().await {
                    Some(Ok(bytes)) => {
                        let lines = state.decoder.push(bytes.as_ref());
                        state.absorb(lines);
                    }
                    Some(Err(e)) => {
                        state.done = true;
                        return Some((
                            Err(RagChatError::LlmError(format!("stream read failed: {e}"))),
                            state,
                        ));
                    }
                    None => {
                        let rest = state.decoder.finish();
                        state.absorb(rest);
                        state.done = true;
                    }
                }
            }
        });
        Self::new(Box::pin(stream))
    }

    /// Collect all chunks into a single string
    pub async fn collect_all(mut self) -> Result<String> {
        let mut result = String::new();
        while let Some(chunk) = self.stream.next().await {
            result.push_str(&chunk?);
        }
        Ok(result)
    }

    /// Get the underlying stream
    pub fn into_stream(self) -> Pin<Box<dyn Stream<Item = Result<String>> + Send>> {
        self.stream
    }
}

struct DeltaState<S> {
    body: Pin<Box<S>>,
    decoder: SseLineDecoder,
    pending: VecDeque<String>,
    done: bool,
}

impl<S> DeltaState<S> {
    fn absorb(&mut self, lines: Vec<String>) {
        for line in lines {
            if self.done {
                return;
            }
            match parse_stream_line(&line) {
                StreamLine::Delta(delta) => self.pending.push_back(delta),
                StreamLine::Done => self.done = true,
                StreamLine::Skip => {}
            }
        }
    }
}

/// Splits a byte stream into text lines, tolerating chunk boundaries
/// anywhere, including inside multi-byte characters.
#[derive(Debug, Default)]
pub struct SseLineDecoder {
    buffer: Vec<u8>,
}

impl SseLineDecoder {
    /// Feed bytes and return every line completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);
        let mut lines = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|&b| b == b'\n') {
            let raw: Vec<u8> = self.buffer.drain(..=pos).collect();
            lines.push(decode_line(&raw[..raw.len() - 1]));
        }
        lines
    }

    /// The trailing line, if the body did not end with a newline.
    pub fn finish(&mut self) -> Vec<String> {
        if self.buffer.is_empty() {
            return Vec::new();
        }
        let raw = std::mem::take(&mut self.buffer);
        vec![decode_line(&raw)]
    }
}

fn decode_line(raw: &[u8]) -> String {
    let raw = raw.strip_suffix(b"\r").unwrap_or(raw);
    String::from_utf8_lossy(raw).into_owned()
}

/// What a single SSE line from a chat-completion stream means
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamLine {
    Delta(String),
    Done,
    Skip,
}

#[derive(Deserialize)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
}

#[derive(Deserialize)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Default, Deserialize)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

pub fn parse_stream_line(line: &str) -> StreamLine {
    let Some(data) = line.strip_prefix("data:") else {
        return StreamLine::Skip;
    };
    let data = data.strip_prefix(' ').unwrap_or(data);
    if data.trim() == "[DONE]" {
        return StreamLine::Done;
    }
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(data) else {
        return StreamLine::Skip;
    };
    match chunk.choices.into_iter().next().and_then(|c| c.delta.content) {
        Some(content) if !content.is_empty() => StreamLine::Delta(content),
        _ => StreamLine::Skip,
    }
}
