use async_trait::async_trait;
use scribe_core::AppResult;
use scribe_domain::{EntryHandle, PendingChange};
use serde_json::Value;
use tokio_util::sync::CancellationToken;

/// Persistence session port whose commits are audited.
#[async_trait]
pub trait UnitOfWork: Send + Sync {
    /// Returns a snapshot of every tracked entry, in tracking order.
    async fn pending_changes(&self) -> AppResult<Vec<PendingChange>>;

    /// Applies all pending writes in one underlying commit and returns the affected row count.
    ///
    /// Identifiers for added entries are assigned here.
    async fn commit(&self, cancellation: &CancellationToken) -> AppResult<u64>;

    /// Returns the key field value currently held by a tracked entry.
    ///
    /// For added entries this is only populated after a successful commit.
    async fn identifier_value(&self, handle: EntryHandle) -> AppResult<Option<Value>>;
}
