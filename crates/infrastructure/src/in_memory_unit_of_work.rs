use std::sync::Arc;

use async_trait::async_trait;
use scribe_application::{CancellationToken, UnitOfWork};
use scribe_core::{AppError, AppResult};
use scribe_domain::{EntitySchema, EntityState, EntryHandle, PendingChange};
use serde_json::{Map, Value};
use tokio::sync::Mutex;

use crate::ChangeTracker;
use crate::in_memory_entity_store::InMemoryEntityStore;

/// Unit of work over an [`InMemoryEntityStore`].
pub struct InMemoryUnitOfWork {
    store: Arc<InMemoryEntityStore>,
    tracker: Mutex<ChangeTracker>,
}

impl InMemoryUnitOfWork {
    /// Creates a unit of work for the provided schemas.
    #[must_use]
    pub fn new(
        store: Arc<InMemoryEntityStore>,
        schemas: impl IntoIterator<Item = EntitySchema>,
    ) -> Self {
        Self {
            store,
            tracker: Mutex::new(ChangeTracker::new(schemas)),
        }
    }

    /// Stages a new entity for insertion.
    pub async fn add(
        &self,
        entity_type_name: &str,
        values: Map<String, Value>,
    ) -> AppResult<EntryHandle> {
        self.tracker.lock().await.add(entity_type_name, values)
    }

    /// Loads a stored entity and starts tracking it.
    ///
    /// Returns the existing handle when the entity is already tracked.
    pub async fn load(&self, entity_type_name: &str, entity_id: i64) -> AppResult<EntryHandle> {
        let mut tracker = self.tracker.lock().await;
        if let Some(handle) = tracker.find(entity_type_name, entity_id) {
            return Ok(handle);
        }

        let row = self
            .store
            .find(entity_type_name, entity_id)
            .await
            .ok_or_else(|| {
                AppError::NotFound(format!(
                    "entity '{entity_type_name}' with identifier {entity_id} does not exist"
                ))
            })?;
        let values = row
            .iter()
            .map(|(field_name, value)| (field_name.to_owned(), value.clone()))
            .collect();

        tracker.attach(entity_type_name, values)
    }

    /// Changes one field of a tracked entity.
    pub async fn set_field(
        &self,
        handle: EntryHandle,
        field_name: &str,
        value: Value,
    ) -> AppResult<()> {
        self.tracker.lock().await.set_field(handle, field_name, value)
    }

    /// Marks a tracked entity for deletion.
    pub async fn remove(&self, handle: EntryHandle) -> AppResult<()> {
        self.tracker.lock().await.remove(handle)
    }

    /// Returns the tracking state of an entry.
    pub async fn state(&self, handle: EntryHandle) -> EntityState {
        self.tracker.lock().await.state(handle)
    }
}

#[async_trait]
impl UnitOfWork for InMemoryUnitOfWork {
    async fn pending_changes(&self) -> AppResult<Vec<PendingChange>> {
        Ok(self.tracker.lock().await.snapshot())
    }

    async fn commit(&self, cancellation: &CancellationToken) -> AppResult<u64> {
        if cancellation.is_cancelled() {
            return Err(AppError::Cancelled(
                "commit cancelled before writes were applied".to_owned(),
            ));
        }

        let mut tracker = self.tracker.lock().await;
        if !tracker.has_changes() {
            return Ok(0);
        }
        let applied = self.store.apply(&tracker.snapshot()).await?;
        for (handle, entity_id) in applied.assigned_ids {
            tracker.assign_identifier(handle, entity_id)?;
        }
        tracker.accept_changes();

        Ok(applied.affected_rows)
    }

    async fn identifier_value(&self, handle: EntryHandle) -> AppResult<Option<Value>> {
        Ok(self.tracker.lock().await.identifier_value(handle))
    }
}
