//! Asynchronous, batched audit log of chat requests
//!
//! Request handlers hand records to [`AuditLogger::log`], which never blocks:
//! when the queue is full the record is dropped and counted. A single
//! background task batches records and writes them through a
//! [`ChatLogStore`]. Persistence failures are logged and swallowed.

pub mod redact;

use std::sync::atomic::AtomicU64;
use std::sync::atomic::AtomicU8;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing::info;
use tracing::warn;

pub use redact::hash_question;
pub use redact::sanitize_question;

use crate::config::ChatLogConfig;
use crate::errors::Result;
use crate::models::AnswerType;
use crate::models::ChatLogRecord;
use crate::rag::ScoredChunk;

/// Destination for batches of chat log records
#[async_trait]
pub trait ChatLogStore: Send + Sync {
    async fn insert_chat_logs(&self, records: &[ChatLogRecord]) -> Result<u64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuditLoggerConfig {
    pub buffer: usize,
    pub batch_size: usize,
    pub flush_every: Duration,
    pub report_every: Duration,
}

impl Default for AuditLoggerConfig {
    fn default() -> Self {
        Self {
            buffer: 1000,
            batch_size: 100,
            flush_every: Duration::from_millis(500),
            report_every: Duration::from_secs(30),
        }
    }
}

impl AuditLoggerConfig {
    pub fn from_config(config: &ChatLogConfig) -> Self {
        Self {
            buffer: config.buffer,
            batch_size: config.batch_size,
            flush_every: Duration::from_millis(config.flush_every_ms),
            report_every: Duration::from_secs(config.report_every_secs),
        }
    }

    /// Any zero sizing falls back to the defaults as a whole.
    fn sanitized(self) -> Self {
        let defaults = Self::default();
        if self.buffer == 0 || self.batch_size == 0 || self.flush_every.is_zero() {
            return defaults;
        }
        if self.report_every.is_zero() {
            return Self {
                report_every: defaults.report_every,
                ..self
            };
        }
        self
    }
}

/// Lifecycle of the background consumer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum LoggerState {
    Idle = 0,
    Running = 1,
    Draining = 2,
    Stopped = 3,
}

impl LoggerState {
    const fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Idle,
            1 => Self::Running,
            2 => Self::Draining,
            _ => Self::Stopped,
        }
    }
}

pub struct AuditLogger {
    config: AuditLoggerConfig,
    store: Arc<dyn ChatLogStore>,
    sender: mpsc::Sender<ChatLogRecord>,
    receiver: Mutex<Option<mpsc::Receiver<ChatLogRecord>>>,
    dropped: AtomicU64,
    state: Arc<AtomicU8>,
}

impl AuditLogger {
    pub fn new(store: Arc<dyn ChatLogStore>, config: AuditLoggerConfig) -> Self {
        let config = config.sanitized();
        let (sender, receiver) = mpsc::channel(config.buffer);
        Self {
            config,
            store,
            sender,
            receiver: Mutex::new(Some(receiver)),
            dropped: AtomicU64::new(0),
            state: Arc::new(AtomicU8::new(LoggerState::Idle as u8)),
        }
    }

    pub fn config(&self) -> AuditLoggerConfig {
        self.config
    }

    pub fn state(&self) -> LoggerState {
        LoggerState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Records rejected because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Records queued but not yet picked up by the consumer.
    pub fn pending(&self) -> usize {
        self.config.buffer - self.sender.capacity()
    }

    /// Enqueue a record without waiting.
    pub fn log(&self, record: ChatLogRecord) {
        if self.sender.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Spawn the consumer. Only the first call starts it; later calls return `None`.
    ///
    /// Cancelling `shutdown` makes the consumer drain what is queued, flush
    /// once more and exit.
    pub async fn start(self: &Arc<Self>, shutdown: CancellationToken) -> Option<JoinHandle<()>> {
        if self
            .state
            .compare_exchange(
                LoggerState::Idle as u8,
                LoggerState::Running as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return None;
        }
        let receiver = self.receiver.lock().await.take()?;
        let logger = Arc::clone(self);
        info!(
            "Audit logger started (buffer {}, batch {}, flush every {:?})",
            self.config.buffer, self.config.batch_size, self.config.flush_every
        );
        Some(tokio::spawn(async move {
            logger.run(receiver, shutdown).await;
        }))
    }

    async fn run(&self, mut receiver: mpsc::Receiver<ChatLogRecord>, shutdown: CancellationToken) {
        let mut flush_tick = tokio::time::interval(self.config.flush_every);
        let mut report_tick = tokio::time::interval(self.config.report_every);
        // Both intervals fire immediately on the first tick.
        flush_tick.tick().await;
        report_tick.tick().await;

        let mut batch: Vec<ChatLogRecord> = Vec::with_capacity(self.config.batch_size);
        let mut last_dropped = 0u64;

        loop {
            tokio::select! {
                () = shutdown.cancelled() => {
                    self.state.store(LoggerState::Draining as u8, Ordering::Release);
                    while let Ok(record) = receiver.try_recv() {
                        batch.push(record);
                    }
                    self.flush(&mut batch).await;
                    self.state.store(LoggerState::Stopped as u8, Ordering::Release);
                    info!("Audit logger stopped ({} records dropped in total)", self.dropped());
                    return;
                }
                record = receiver.recv() => {
                    let Some(record) = record else {
                        self.flush(&mut batch).await;
                        self.state.store(LoggerState::Stopped as u8, Ordering::Release);
                        return;
                    };
                    batch.push(record);
                    if batch.len() >= self.config.batch_size {
                        self.flush(&mut batch).await;
                    }
                }
                _ = flush_tick.tick() => {
                    self.flush(&mut batch).await;
                }
                _ = report_tick.tick() => {
                    let dropped = self.dropped();
                    if dropped != last_dropped {
                        last_dropped = dropped;
                        warn!("Audit logger queue full: {} records dropped so far", dropped);
                    }
                }
            }
        }
    }

    async fn flush(&self, batch: &mut Vec<ChatLogRecord>) {
        if batch.is_empty() {
            return;
        }
        // Chunking below the batch size keeps one INSERT per flush.
        for chunk in batch.chunks(self.config.batch_size) {
            match self.store.insert_chat_logs(chunk).await {
                Ok(rows) => debug!("Persisted {} chat log records", rows),
                Err(e) => warn!("Failed to persist {} chat log records: {}", chunk.len(), e),
            }
        }
        batch.clear();
    }
}

/// Build the audit record for a finished request.
pub fn chat_log_record(
    question: &str,
    answer_type: AnswerType,
    results: &[ScoredChunk],
    max_sources: usize,
    started: Instant,
) -> ChatLogRecord {
    let question_redacted = sanitize_question(question);
    let question_hash = hash_question(&question_redacted);
    let top = &results[..results.len().min(max_sources)];
    ChatLogRecord {
        question_redacted,
        question_hash,
        answer_type,
        top_sources: top.iter().map(|r| r.chunk.url.clone()).collect(),
        top_scores: top.iter().map(|r| r.score).collect(),
        latency_ms: i64::try_from(started.elapsed().as_millis()).unwrap_or(i64::MAX),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;
    use crate::models::Chunk;

    #[derive(Default)]
    struct MemoryStore {
        batches: StdMutex<Vec<Vec<ChatLogRecord>>>,
        fail: bool,
    }

    impl MemoryStore {
        fn records(&self) -> Vec<ChatLogRecord> {
            self.batches.lock().unwrap().iter().flatten().cloned().collect()
        }

        fn batch_count(&self) -> usize {
            self.batches.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl ChatLogStore for MemoryStore {
        async fn insert_chat_logs(&self, records: &[ChatLogRecord]) -> Result<u64> {
            if self.fail {
                return Err(crate::RagChatError::Custom("db down".to_string()));
            }
            self.batches.lock().unwrap().push(records.to_vec());
            Ok(records.len() as u64)
        }
    }

    fn record(question: &str) -> ChatLogRecord {
        ChatLogRecord {
            question_redacted: question.to_string(),
            question_hash: hash_question(question),
            answer_type: AnswerType::Grounded,
            top_sources: vec![],
            top_scores: vec![],
            latency_ms: 1,
        }
    }

    fn config(buffer: usize, batch_size: usize) -> AuditLoggerConfig {
        AuditLoggerConfig {
            buffer,
            batch_size,
            flush_every: Duration::from_secs(3600),
            report_every: Duration::from_secs(3600),
        }
    }

    #[test]
    fn test_zero_sizes_fall_back_to_defaults() {
        let sanitized = config(0, 10).sanitized();
        assert_eq!(sanitized, AuditLoggerConfig::default());
        assert_eq!(config(5, 10).sanitized().buffer, 5);
    }

    #[tokio::test]
    async fn test_full_queue_drops_without_blocking() {
        let store = Arc::new(MemoryStore::default());
        let logger = AuditLogger::new(store, config(1, 10));
        logger.log(record("first"));
        logger.log(record("second"));

        assert_eq!(logger.pending(), 1);
        assert_eq!(logger.dropped(), 1);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let store = Arc::new(MemoryStore::default());
        let logger = Arc::new(AuditLogger::new(store, config(10, 10)));
        let shutdown = CancellationToken::new();

        assert_eq!(logger.state(), LoggerState::Idle);
        let handle = logger.start(shutdown.clone()).await;
        assert!(handle.is_some());
        assert!(logger.start(shutdown.clone()).await.is_none());
        assert_eq!(logger.state(), LoggerState::Running);

        shutdown.cancel();
        handle.unwrap().await.unwrap();
        assert_eq!(logger.state(), LoggerState::Stopped);
    }

    #[tokio::test]
    async fn test_flushes_when_batch_is_full() {
        let store = Arc::new(MemoryStore::default());
        let logger = Arc::new(AuditLogger::new(store.clone(), config(10, 2)));
        let shutdown = CancellationToken::new();
        let handle = logger.start(shutdown.clone()).await.unwrap();

        logger.log(record("a"));
        logger.log(record("b"));
        for _ in 0..50 {
            if store.batch_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(store.batch_count(), 1);
        assert_eq!(store.records().len(), 2);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_cancellation_drains_queue() {
        let store = Arc::new(MemoryStore::default());
        let logger = Arc::new(AuditLogger::new(store.clone(), config(10, 100)));
        for q in ["a", "b", "c"] {
            logger.log(record(q));
        }

        let shutdown = CancellationToken::new();
        shutdown.cancel();
        let handle = logger.start(shutdown).await.unwrap();
        handle.await.unwrap();

        let questions: Vec<String> = store
            .records()
            .into_iter()
            .map(|r| r.question_redacted)
            .collect();
        assert_eq!(questions, vec!["a", "b", "c"]);
        assert_eq!(store.batch_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_flush_timer_writes_partial_batch() {
        let store = Arc::new(MemoryStore::default());
        let mut cfg = config(10, 100);
        cfg.flush_every = Duration::from_millis(500);
        let logger = Arc::new(AuditLogger::new(store.clone(), cfg));
        let shutdown = CancellationToken::new();
        let handle = logger.start(shutdown.clone()).await.unwrap();

        logger.log(record("lonely"));
        tokio::time::sleep(Duration::from_millis(1200)).await;
        assert_eq!(store.records().len(), 1);

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_store_errors_are_swallowed() {
        let store = Arc::new(MemoryStore {
            fail: true,
            ..MemoryStore::default()
        });
        let logger = Arc::new(AuditLogger::new(store.clone(), config(10, 1)));
        let shutdown = CancellationToken::new();
        let handle = logger.start(shutdown.clone()).await.unwrap();
        logger.log(record("x"));
        shutdown.cancel();
        handle.await.unwrap();
        assert_eq!(logger.state(), LoggerState::Stopped);
    }

    #[test]
    fn test_chat_log_record() {
        let results: Vec<ScoredChunk> = ["a", "b", "c"]
            .iter()
            .enumerate()
            .map(|(i, slug)| ScoredChunk {
                chunk: Arc::new(Chunk {
                    url: format!("https://alicanteabout.com/{slug}/"),
                    ..Chunk::default()
                }),
                score: 0.9 - i as f32 * 0.1,
            })
            .collect();

        let rec = chat_log_record(
            "Email me at bob@example.com about the castle",
            AnswerType::Grounded,
            &results,
            2,
            Instant::now(),
        );
        assert_eq!(
            rec.question_redacted,
            "Email me at [redacted_email] about the castle"
        );
        assert_eq!(rec.question_hash, hash_question(&rec.question_redacted));
        assert_eq!(
            rec.top_sources,
            vec!["https://alicanteabout.com/a/", "https://alicanteabout.com/b/"]
        );
        assert_eq!(rec.top_scores.len(), 2);
        assert!(rec.latency_ms >= 0);
    }
}
