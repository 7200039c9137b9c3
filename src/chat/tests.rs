use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::*;
use crate::audit::AuditLoggerConfig;
use crate::audit::ChatLogStore;
use crate::errors::RagChatError;
use crate::guard::StopWords;
use crate::models::ChatLogRecord;
use crate::models::Chunk;
use crate::models::SourceItem;
use crate::rag::Entry;
use crate::rag::VectorIndex;

struct StubEmbedder {
    vector: Vec<f32>,
    calls: AtomicUsize,
    fail: bool,
}

impl StubEmbedder {
    fn new(vector: Vec<f32>) -> Self {
        Self {
            vector,
            calls: AtomicUsize::new(0),
            fail: false,
        }
    }
}

#[async_trait]
impl Embedder for StubEmbedder {
    fn provider(&self) -> &str {
        "stub"
    }

    fn model(&self) -> &str {
        "stub-model"
    }

    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(RagChatError::EmbeddingError("provider down".to_string()));
        }
        Ok(self.vector.clone())
    }
}

#[derive(Default)]
struct StubSynthesizer {
    calls: AtomicUsize,
}

fn castle_answer() -> ChatAnswer {
    ChatAnswer {
        answer: "The castle is on Mount Benacantil.".to_string(),
        sources: vec![SourceItem {
            title: "Castle".to_string(),
            url: "https://alicanteabout.com/castle/".to_string(),
        }],
    }
}

#[async_trait]
impl Synthesizer for StubSynthesizer {
    async fn answer(&self, _question: &str, _hits: &[ScoredChunk]) -> Result<ChatAnswer> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(castle_answer())
    }

    async fn answer_stream(
        &self,
        _question: &str,
        _hits: &[ScoredChunk],
    ) -> Result<SynthesisStream> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::pin(futures::stream::iter(vec![
            SynthesisEvent::Delta("{\"answer\":".to_string()),
            SynthesisEvent::Result(castle_answer()),
        ])))
    }
}

#[derive(Default)]
struct MemoryStore {
    records: Mutex<Vec<ChatLogRecord>>,
}

#[async_trait]
impl ChatLogStore for MemoryStore {
    async fn insert_chat_logs(&self, records: &[ChatLogRecord]) -> Result<u64> {
        self.records.lock().unwrap().extend_from_slice(records);
        Ok(records.len() as u64)
    }
}

fn index() -> Arc<VectorIndex> {
    let entry = |slug: &str, vector: Vec<f32>| Entry {
        chunk: Arc::new(Chunk {
            chunk_id: format!("{slug}-1"),
            title: slug.to_string(),
            url: format!("https://alicanteabout.com/{slug}/"),
            text: format!("All about the {slug}."),
            ..Chunk::default()
        }),
        vector,
    };
    Arc::new(VectorIndex::from_entries(vec![
        entry("castle", vec![1.0, 0.0]),
        entry("beach", vec![0.0, 1.0]),
    ]))
}

struct Fixture {
    service: ChatService,
    embedder: Arc<StubEmbedder>,
    synthesizer: Arc<StubSynthesizer>,
    store: Arc<MemoryStore>,
    audit: Arc<AuditLogger>,
}

impl Fixture {
    fn new(embedder: StubEmbedder) -> Self {
        let embedder = Arc::new(embedder);
        let synthesizer = Arc::new(StubSynthesizer::default());
        let store = Arc::new(MemoryStore::default());
        let audit = Arc::new(AuditLogger::new(
            store.clone(),
            AuditLoggerConfig {
                flush_every: Duration::from_secs(3600),
                ..AuditLoggerConfig::default()
            },
        ));
        let service = ChatService::new(
            embedder.clone(),
            index(),
            synthesizer.clone(),
            ChatSettings::default(),
        )
        .with_cache(EmbeddingResultCache::new(8))
        .with_audit(Some(audit.clone()));
        Self {
            service,
            embedder,
            synthesizer,
            store,
            audit,
        }
    }

    /// Drain the audit queue and return what was persisted.
    async fn audited(&self) -> Vec<ChatLogRecord> {
        let shutdown = CancellationToken::new();
        shutdown.cancel();
        if let Some(handle) = self.audit.start(shutdown).await {
            handle.await.unwrap();
        }
        self.store.records.lock().unwrap().clone()
    }
}

#[tokio::test]
async fn test_low_score_falls_back_without_synthesis() {
    let fixture = Fixture::new(StubEmbedder::new(vec![-1.0, -1.0]));
    let prepared = fixture
        .service
        .prepare("What is the best tapas bar?", "en", Instant::now())
        .await
        .unwrap();

    let Prepared::Fallback { answer, reason } = prepared else {
        panic!("expected fallback");
    };
    assert_eq!(reason, FallbackReason::LowScore);
    assert_eq!(answer.answer, "I don't know based on AlicanteAbout content.");
    assert!(answer.sources.is_empty());
    assert_eq!(fixture.synthesizer.calls.load(Ordering::SeqCst), 0);

    let records = fixture.audited().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer_type, AnswerType::NoAnswer);
    assert_eq!(records[0].top_sources.len(), 2);
}

#[tokio::test]
async fn test_spanish_question_gets_language_fallback() {
    let fixture = Fixture::new(StubEmbedder::new(vec![1.0, 0.0]));
    let prepared = fixture
        .service
        .prepare("Hola, como llego al aeropuerto?", "en", Instant::now())
        .await
        .unwrap();

    let Prepared::Fallback { answer, reason } = prepared else {
        panic!("expected fallback");
    };
    assert_eq!(reason, FallbackReason::Language);
    assert_eq!(answer.answer, "Sorry, English only for now.");
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 0);

    let records = fixture.audited().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer_type, AnswerType::NoAnswer);
    assert!(records[0].top_sources.is_empty());
}

#[tokio::test]
async fn test_grounded_answer_is_audited() {
    let fixture = Fixture::new(StubEmbedder::new(vec![3.0, 0.5]));
    let started = Instant::now();
    let question = "Where is the castle of Santa Barbara?";
    let Prepared::Ready(results) = fixture.service.prepare(question, "en", started).await.unwrap()
    else {
        panic!("expected results");
    };
    assert_eq!(results[0].chunk.url, "https://alicanteabout.com/castle/");
    assert!(results[0].score > results[1].score);

    let answer = fixture.service.answer(question, &results, started).await.unwrap();
    assert_eq!(answer, castle_answer());

    let records = fixture.audited().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].answer_type, AnswerType::Grounded);
    assert_eq!(records[0].question_redacted, question);
    assert_eq!(
        records[0].top_sources,
        vec![
            "https://alicanteabout.com/castle/",
            "https://alicanteabout.com/beach/"
        ]
    );
}

#[tokio::test]
async fn test_repeated_question_uses_cache() {
    let fixture = Fixture::new(StubEmbedder::new(vec![1.0, 0.0]));
    for _ in 0..3 {
        fixture
            .service
            .prepare("Where is the castle?", "en", Instant::now())
            .await
            .unwrap();
    }
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 1);
    let stats = fixture.service.cache().unwrap().stats().await;
    assert_eq!(stats.hits, 2);
    assert_eq!(stats.len, 1);
}

#[tokio::test]
async fn test_embedding_failure_propagates() {
    let mut embedder = StubEmbedder::new(vec![1.0, 0.0]);
    embedder.fail = true;
    let fixture = Fixture::new(embedder);
    let err = fixture
        .service
        .prepare("Where is the castle?", "en", Instant::now())
        .await
        .unwrap_err();
    assert!(err.is_upstream());
    assert!(fixture.audited().await.is_empty());
}

#[tokio::test]
async fn test_stream_audits_on_result() {
    let fixture = Fixture::new(StubEmbedder::new(vec![1.0, 0.0]));
    let started = Instant::now();
    let Prepared::Ready(results) = fixture
        .service
        .prepare("Where is the castle?", "en", started)
        .await
        .unwrap()
    else {
        panic!("expected results");
    };

    let stream = fixture
        .service
        .answer_stream("Where is the castle?", results, started)
        .await
        .unwrap();
    assert_eq!(fixture.audit.pending(), 0);
    let events: Vec<SynthesisEvent> = stream.collect().await;
    assert_eq!(events.len(), 2);
    assert_eq!(fixture.audit.pending(), 1);

    let records = fixture.audited().await;
    assert_eq!(records[0].answer_type, AnswerType::Grounded);
}

#[tokio::test]
async fn test_custom_language_gate() {
    let mut fixture = Fixture::new(StubEmbedder::new(vec![1.0, 0.0]));
    fixture.service = fixture.service.with_language_gate(LanguageGate::new(
        StopWords::english(),
        vec![StopWords::new("de", ["wo", "ist", "die", "der", "das"])],
    ));

    let prepared = fixture
        .service
        .prepare("Wo ist die Burg?", "en", Instant::now())
        .await
        .unwrap();
    assert!(matches!(
        prepared,
        Prepared::Fallback {
            reason: FallbackReason::Language,
            ..
        }
    ));
    assert_eq!(fixture.embedder.calls.load(Ordering::SeqCst), 0);
}
