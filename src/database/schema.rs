use super::Database;
use crate::Result;

impl Database {
    /// Returns true if the chat_logs table exists
    pub async fn is_schema_initialized(&self) -> Result<bool> {
        let exists = sqlx::query_scalar::<_, bool>(
            r"
            SELECT EXISTS (
                SELECT FROM information_schema.tables
                WHERE table_schema = 'public'
                AND table_name = 'chat_logs'
            )
            ",
        )
        .fetch_one(&self.pool)
        .await?;
        Ok(exists)
    }

    /// Initialize database schema. Safe to run repeatedly.
    pub async fn init_schema(&self) -> Result<()> {
        sqlx::query(
            r"
            CREATE TABLE IF NOT EXISTS chat_logs (
                id BIGSERIAL PRIMARY KEY,
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                question_redacted TEXT NOT NULL,
                question_hash TEXT NOT NULL,
                answer_type TEXT NOT NULL,
                top_sources TEXT[] NOT NULL DEFAULT '{}',
                top_scores REAL[] NOT NULL DEFAULT '{}',
                latency_ms BIGINT NOT NULL
            )
            ",
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_chat_logs_created_at ON chat_logs(created_at)")
            .execute(&self.pool)
            .await?;
        sqlx::query(
            "CREATE INDEX IF NOT EXISTS idx_chat_logs_question_hash ON chat_logs(question_hash)",
        )
        .execute(&self.pool)
        .await?;

        tracing::info!("✅ chat_logs schema ready");
        Ok(())
    }
}
