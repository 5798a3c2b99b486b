use async_trait::async_trait;
use scribe_application::AuditSink;
use scribe_core::AppResult;
use scribe_domain::AuditRecord;
use tokio::sync::RwLock;

/// In-memory append-only audit store.
#[derive(Debug, Default)]
pub struct InMemoryAuditSink {
    records: RwLock<Vec<AuditRecord>>,
}

impl InMemoryAuditSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns every appended record in append order.
    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.read().await.clone()
    }
}

#[async_trait]
impl AuditSink for InMemoryAuditSink {
    async fn append_all(&self, records: Vec<AuditRecord>) -> AppResult<()> {
        self.records.write().await.extend(records);
        Ok(())
    }
}
