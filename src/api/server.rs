//! HTTP server implementation

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing::warn;

use crate::api::handlers::AppState;
use crate::api::routes;
use crate::audit::AuditLogger;
use crate::audit::AuditLoggerConfig;
use crate::chat::ChatService;
use crate::chat::ChatSettings;
use crate::config::AppConfig;
use crate::corpus;
use crate::database::Database;
use crate::embeddings::EmbeddingClient;
use crate::embeddings::EmbeddingResultCache;
use crate::llm::LlmClient;
use crate::llm::LlmSynthesizer;
use crate::rag::PromptPolicy;
use crate::Result;

/// Build the audit logger when persistence is configured.
async fn start_audit_logger(
    config: &AppConfig,
    shutdown: &CancellationToken,
) -> Result<Option<(Arc<AuditLogger>, JoinHandle<()>)>> {
    if !config.chat_log_persistence_enabled() {
        info!("💡 Chat log persistence disabled");
        return Ok(None);
    }
    let database = Database::from_config(&config.database).await?;
    if config.database.run_migrations {
        database.init_schema().await?;
    }
    let logger = Arc::new(AuditLogger::new(
        Arc::new(database),
        AuditLoggerConfig::from_config(&config.chat_log),
    ));
    Ok(logger
        .start(shutdown.clone())
        .await
        .map(|handle| (logger.clone(), handle)))
}

/// Start the chat API server and run until Ctrl-C.
pub async fn serve(config: &AppConfig) -> Result<()> {
    info!("🚀 Starting ragchat server...");

    let index = Arc::new(corpus::load_index(config)?);
    let embedder = Arc::new(EmbeddingClient::from_app_config(config)?);
    let synthesizer = Arc::new(LlmSynthesizer::new(
        LlmClient::from_app_config(config)?,
        PromptPolicy::from_config(config),
        config.retrieval.top_k,
        config.retrieval.max_sources,
    ));

    let shutdown = CancellationToken::new();
    let audit = start_audit_logger(config, &shutdown).await?;

    let chat = ChatService::new(embedder, index, synthesizer, ChatSettings::from_config(config))
        .with_cache(EmbeddingResultCache::new(config.embeddings.cache_max_entries))
        .with_audit(audit.as_ref().map(|(logger, _)| logger.clone()));

    let state = AppState::from_config(config, Arc::new(chat));
    if !state.credentials.is_configured() {
        warn!("⚠️  No auth secret configured: /chat will answer 500 until CHAT_JWT_SECRET is set");
    }
    let pruner = state.admission.clone().spawn_pruner(shutdown.clone());
    let app = routes::chat_router(state);

    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    info!("🌐 Chat server listening on http://{}", config.server.addr);
    info!("Available endpoints:");
    info!("  POST /chat     - Ask a question (JSON, or SSE with ?stream=1)");
    info!("  GET  /healthz  - Health check");

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    info!("Shutting down...");
    shutdown.cancel();
    if let Err(e) = pruner.await {
        warn!("Rate limit pruner task failed: {}", e);
    }
    if let Some((logger, handle)) = audit {
        if let Err(e) = handle.await {
            warn!("Audit logger task failed: {}", e);
        }
        if logger.dropped() > 0 {
            warn!("{} chat log records were dropped", logger.dropped());
        }
    }
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
