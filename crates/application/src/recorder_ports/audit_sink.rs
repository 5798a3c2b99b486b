use async_trait::async_trait;
use scribe_core::AppResult;
use scribe_domain::AuditRecord;

/// Port for persisting append-only audit records.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Appends every record of one commit attempt, all or nothing.
    async fn append_all(&self, records: Vec<AuditRecord>) -> AppResult<()>;
}
