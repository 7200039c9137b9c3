//! `POST /chat`: JSON or server-sent-event answers

use std::convert::Infallible;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::rejection::BytesRejection;
use axum::extract::RawQuery;
use axum::extract::State;
use axum::http::header;
use axum::http::HeaderMap;
use axum::http::Method;
use axum::http::StatusCode;
use axum::response::sse::Event;
use axum::response::sse::KeepAlive;
use axum::response::sse::Sse;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use futures::Stream;
use futures::StreamExt;
use serde::Serialize;
use tracing::error;
use tracing::info;
use tracing::warn;

use super::AppState;
use crate::api::types::ChatRequest;
use crate::api::types::ChatResponse;
use crate::api::types::DeltaEvent;
use crate::api::types::ErrorEvent;
use crate::chat::Prepared;
use crate::errors::RagChatError;
use crate::llm::SynthesisEvent;
use crate::llm::STREAM_ERROR;
use crate::models::ChatAnswer;

const SUPPORTED_LANG: &str = "en";

pub async fn handle_chat(
    State(state): State<AppState>,
    method: Method,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Result<Bytes, BytesRejection>,
) -> Response {
    if method != Method::POST {
        return (StatusCode::METHOD_NOT_ALLOWED, "method not allowed").into_response();
    }
    let started = Instant::now();

    let body = match body {
        Ok(body) => body,
        Err(rejection) if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE => {
            return (StatusCode::PAYLOAD_TOO_LARGE, "request body too large").into_response();
        }
        Err(_) => return (StatusCode::BAD_REQUEST, "invalid json").into_response(),
    };
    let Ok(request) = serde_json::from_slice::<ChatRequest>(&body) else {
        return (StatusCode::BAD_REQUEST, "invalid json").into_response();
    };
    let question = request.question.trim();
    if question.is_empty() {
        return (StatusCode::BAD_REQUEST, "question is required").into_response();
    }
    let lang = match request.lang.as_deref().map(str::trim) {
        None | Some("") => SUPPORTED_LANG,
        Some(lang) => lang,
    };
    if lang != SUPPORTED_LANG {
        return (StatusCode::BAD_REQUEST, "only English is supported").into_response();
    }

    let stream = wants_stream(query.as_deref(), &headers);
    info!("Chat start: question_len={} stream={}", question.len(), stream);

    let results = match state.chat.prepare(question, lang, started).await {
        Ok(Prepared::Ready(results)) => results,
        Ok(Prepared::Fallback { answer, reason }) => {
            info!("Chat done in {:?}: fallback ({:?})", started.elapsed(), reason);
            return if stream {
                single_event_stream(result_event(answer)).into_response()
            } else {
                Json(ChatResponse::from(answer)).into_response()
            };
        }
        Err(e) => {
            log_failure("Embedding", &e);
            return (StatusCode::INTERNAL_SERVER_ERROR, "embedding error").into_response();
        }
    };

    if stream {
        return match state.chat.answer_stream(question, results, started).await {
            Ok(events) => sse(events.map(to_event)).into_response(),
            Err(e) => {
                log_failure("Answer stream start", &e);
                single_event_stream(error_event(STREAM_ERROR)).into_response()
            }
        };
    }

    match state.chat.answer(question, &results, started).await {
        Ok(answer) => {
            info!("Chat done in {:?}", started.elapsed());
            Json(ChatResponse::from(answer)).into_response()
        }
        Err(e) => {
            log_failure("Answer generation", &e);
            (StatusCode::INTERNAL_SERVER_ERROR, "generation error").into_response()
        }
    }
}

/// Provider outages are logged as warnings; anything else is a local fault.
fn log_failure(stage: &str, e: &RagChatError) {
    if e.is_upstream() {
        warn!("{} failed upstream: {}", stage, e);
    } else {
        error!("{} failed: {}", stage, e);
    }
}

/// `?stream=1` or an `Accept` header naming `text/event-stream`
pub fn wants_stream(query: Option<&str>, headers: &HeaderMap) -> bool {
    let by_query = query.is_some_and(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == "stream")
            .is_some_and(|(_, value)| value == "1")
    });
    by_query
        || headers
            .get(header::ACCEPT)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|accept| accept.contains("text/event-stream"))
}

fn sse<S>(events: S) -> Sse<impl Stream<Item = Result<Event, Infallible>>>
where
    S: Stream<Item = Event> + Send + 'static,
{
    Sse::new(events.map(Ok)).keep_alive(KeepAlive::default())
}

fn single_event_stream(event: Event) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    sse(futures::stream::once(async move { event }))
}

fn json_event<T: Serialize>(name: &str, payload: &T) -> Event {
    Event::default()
        .event(name)
        .json_data(payload)
        .unwrap_or_else(|e| {
            error!("Failed to encode SSE {} event: {}", name, e);
            Event::default()
                .event("error")
                .data(r#"{"error":"encoding error"}"#)
        })
}

fn result_event(answer: ChatAnswer) -> Event {
    json_event("result", &ChatResponse::from(answer))
}

fn error_event(message: &str) -> Event {
    json_event(
        "error",
        &ErrorEvent {
            error: message.to_string(),
        },
    )
}

fn to_event(event: SynthesisEvent) -> Event {
    match event {
        SynthesisEvent::Delta(delta) => json_event("delta", &DeltaEvent { delta }),
        SynthesisEvent::Result(answer) => result_event(answer),
        SynthesisEvent::Error(message) => error_event(&message),
    }
}
