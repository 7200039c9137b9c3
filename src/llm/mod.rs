//! Language-model access
//!
//! - [`client`]: JSON-mode chat completions, blocking and streamed
//! - [`streaming`]: server-sent-event decoding of streamed completions
//! - [`synthesizer`]: grounded answers built from retrieved chunks

pub mod client;
pub mod streaming;
pub mod synthesizer;

pub use client::ChatMessage;
pub use client::LlmClient;
pub use streaming::StreamingResponse;
pub use synthesizer::LlmSynthesizer;
pub use synthesizer::SynthesisEvent;
pub use synthesizer::SynthesisStream;
pub use synthesizer::Synthesizer;
pub use synthesizer::STREAM_ERROR;
