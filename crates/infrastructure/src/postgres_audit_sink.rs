use async_trait::async_trait;
use scribe_application::AuditSink;
use scribe_core::{AppError, AppResult};
use scribe_domain::AuditRecord;
use sqlx::PgPool;

/// PostgreSQL-backed append-only audit store.
///
/// Each batch is written in its own transaction, after the audited commit.
#[derive(Clone)]
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    /// Creates a sink with the provided connection pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn append_all(&self, records: Vec<AuditRecord>) -> AppResult<()> {
        let mut transaction = self.pool.begin().await.map_err(|error| {
            AppError::Internal(format!("failed to start audit append transaction: {error}"))
        })?;

        for record in &records {
            sqlx::query(
                r#"
                INSERT INTO audit_records (
                    recorded_at,
                    entity_type_name,
                    entity_id,
                    operation,
                    field_name,
                    old_value,
                    new_value
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7)
                "#,
            )
            .bind(record.timestamp())
            .bind(record.entity_type_name())
            .bind(record.entity_id())
            .bind(record.operation().as_str())
            .bind(record.field_name())
            .bind(record.old_value())
            .bind(record.new_value())
            .execute(&mut *transaction)
            .await
            .map_err(|error| {
                AppError::Internal(format!(
                    "failed to append audit record for entity '{}' with identifier {}: {error}",
                    record.entity_type_name(),
                    record.entity_id()
                ))
            })?;
        }

        transaction.commit().await.map_err(|error| {
            AppError::Internal(format!("failed to commit audit append transaction: {error}"))
        })?;

        Ok(())
    }
}
