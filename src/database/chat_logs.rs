use async_trait::async_trait;

use super::Database;
use crate::audit::ChatLogStore;
use crate::models::ChatLogRecord;
use crate::Result;

const PARAMS_PER_ROW: usize = 6; // question_redacted, question_hash, answer_type, top_sources, top_scores, latency_ms
const MAX_PARAMS: usize = 65000; // Keep below u16::MAX (65535)
const CHUNK_SIZE: usize = MAX_PARAMS / PARAMS_PER_ROW;

/// Build `INSERT INTO chat_logs ... VALUES ($1, ..., $6), ($7, ...)` for `rows` rows.
fn insert_statement(rows: usize) -> String {
    let mut query = String::with_capacity(150 + rows * 40);
    query.push_str(
        "INSERT INTO chat_logs (question_redacted, question_hash, answer_type, top_sources, top_scores, latency_ms) VALUES ",
    );
    for i in 0..rows {
        if i > 0 {
            query.push_str(", ");
        }
        let base = i * PARAMS_PER_ROW;
        query.push_str(&format!(
            "(${}, ${}, ${}, ${}, ${}, ${})",
            base + 1,
            base + 2,
            base + 3,
            base + 4,
            base + 5,
            base + 6
        ));
    }
    query
}

impl Database {
    /// Insert chat log records in as few statements as the parameter limit allows.
    pub async fn insert_chat_logs(&self, records: &[ChatLogRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut inserted = 0u64;
        for chunk in records.chunks(CHUNK_SIZE) {
            let query = insert_statement(chunk.len());
            let mut q = sqlx::query(&query);
            for record in chunk {
                q = q
                    .bind(&record.question_redacted)
                    .bind(&record.question_hash)
                    .bind(record.answer_type.as_str())
                    .bind(&record.top_sources)
                    .bind(&record.top_scores)
                    .bind(record.latency_ms);
            }
            inserted += q.execute(&self.pool).await?.rows_affected();
        }

        tracing::trace!("Inserted {} chat log rows", inserted);
        Ok(inserted)
    }
}

#[async_trait]
impl ChatLogStore for Database {
    async fn insert_chat_logs(&self, records: &[ChatLogRecord]) -> Result<u64> {
        Database::insert_chat_logs(self, records).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement_placeholders() {
        let sql = insert_statement(2);
        assert!(sql.starts_with("INSERT INTO chat_logs (question_redacted,"));
        assert!(sql.ends_with("VALUES ($1, $2, $3, $4, $5, $6), ($7, $8, $9, $10, $11, $12)"));
    }

    #[test]
    fn test_chunk_size_respects_parameter_limit() {
        assert!(CHUNK_SIZE * PARAMS_PER_ROW <= usize::from(u16::MAX));
    }
}
