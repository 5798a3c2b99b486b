use std::collections::{BTreeMap, HashMap};

use scribe_core::{AppError, AppResult};
use scribe_domain::{
    EntitySchema, EntityState, EntryHandle, FieldValues, PendingChange, resolve_entity_id,
};
use serde_json::{Map, Value};

/// Tracked entry as seen by a storage engine.
#[derive(Debug, Clone, PartialEq)]
struct TrackedEntry {
    entity_type_name: String,
    key_field_name: String,
    state: EntityState,
    original: Option<FieldValues>,
    current: FieldValues,
}

/// Identity map and change detection for one unit of work.
///
/// Entries keep their tracking order; handles are never reused.
#[derive(Debug, Clone, Default)]
pub struct ChangeTracker {
    schemas: HashMap<String, EntitySchema>,
    entries: BTreeMap<EntryHandle, TrackedEntry>,
    next_handle: u64,
}

impl ChangeTracker {
    /// Creates a tracker that accepts entities of the provided schemas.
    #[must_use]
    pub fn new(schemas: impl IntoIterator<Item = EntitySchema>) -> Self {
        Self {
            schemas: schemas
                .into_iter()
                .map(|schema| (schema.entity_type_name().as_str().to_owned(), schema))
                .collect(),
            entries: BTreeMap::new(),
            next_handle: 1,
        }
    }

    /// Returns the registered schema for an entity type.
    pub fn schema(&self, entity_type_name: &str) -> AppResult<&EntitySchema> {
        self.schemas.get(entity_type_name).ok_or_else(|| {
            AppError::NotFound(format!("entity type '{entity_type_name}' is not registered"))
        })
    }

    /// Stages a new entity for insertion.
    ///
    /// The key field may be left null so the storage engine assigns it.
    pub fn add(
        &mut self,
        entity_type_name: &str,
        values: Map<String, Value>,
    ) -> AppResult<EntryHandle> {
        let schema = self.schema(entity_type_name)?;
        let key_field_name = schema.key_field_name().as_str().to_owned();
        let current = schema.order_values(values)?;

        Ok(self.track(TrackedEntry {
            entity_type_name: entity_type_name.to_owned(),
            key_field_name,
            state: EntityState::Added,
            original: None,
            current,
        }))
    }

    /// Starts tracking an entity that already exists in storage.
    pub fn attach(
        &mut self,
        entity_type_name: &str,
        values: Map<String, Value>,
    ) -> AppResult<EntryHandle> {
        let schema = self.schema(entity_type_name)?;
        let key_field_name = schema.key_field_name().as_str().to_owned();
        let current = schema.order_values(values)?;
        let entity_id = resolve_entity_id(
            entity_type_name,
            key_field_name.as_str(),
            current.get(key_field_name.as_str()),
        )
        .map_err(|error| AppError::Validation(error.to_string()))?;

        if self.find(entity_type_name, entity_id).is_some() {
            return Err(AppError::Conflict(format!(
                "entity '{entity_type_name}' with identifier {entity_id} is already tracked"
            )));
        }

        Ok(self.track(TrackedEntry {
            entity_type_name: entity_type_name.to_owned(),
            key_field_name,
            state: EntityState::Unchanged,
            original: Some(current.clone()),
            current,
        }))
    }

    /// Returns the handle of a tracked entity with the given identifier, if any.
    #[must_use]
    pub fn find(&self, entity_type_name: &str, entity_id: i64) -> Option<EntryHandle> {
        self.entries.iter().find_map(|(handle, entry)| {
            let matches = entry.entity_type_name == entity_type_name
                && entry
                    .current
                    .get(entry.key_field_name.as_str())
                    .and_then(Value::as_i64)
                    == Some(entity_id);
            matches.then_some(*handle)
        })
    }

    /// Changes one field of a tracked entity and recomputes its state.
    ///
    /// An unchanged entity becomes modified; a modified entity whose fields all
    /// return to their original values becomes unchanged again.
    pub fn set_field(
        &mut self,
        handle: EntryHandle,
        field_name: &str,
        value: Value,
    ) -> AppResult<()> {
        let entry = self.entry_mut(handle)?;
        if entry.state == EntityState::Deleted {
            return Err(AppError::Validation(format!(
                "cannot change field '{field_name}' of deleted {handle}"
            )));
        }
        if entry.state != EntityState::Added && field_name == entry.key_field_name {
            return Err(AppError::Validation(format!(
                "identifier field '{field_name}' of {handle} cannot change once stored"
            )));
        }

        let entity_type_name = entry.entity_type_name.clone();
        if !self.schema(entity_type_name.as_str())?.contains_field(field_name) {
            return Err(AppError::Validation(format!(
                "field '{field_name}' is not declared for entity '{entity_type_name}'"
            )));
        }

        let entry = self.entry_mut(handle)?;
        entry.current.set(field_name, value);
        if entry.state != EntityState::Added {
            entry.state = if entry.original.as_ref() == Some(&entry.current) {
                EntityState::Unchanged
            } else {
                EntityState::Modified
            };
        }

        Ok(())
    }

    /// Marks a tracked entity for deletion.
    ///
    /// Removing an entity that was only staged for insertion stops tracking it.
    pub fn remove(&mut self, handle: EntryHandle) -> AppResult<()> {
        let entry = self.entry_mut(handle)?;
        let state = entry.state;
        match state {
            EntityState::Added => {
                self.entries.remove(&handle);
            }
            EntityState::Unchanged | EntityState::Modified => {
                if let Some(original) = entry.original.clone() {
                    entry.current = original;
                }
                entry.state = EntityState::Deleted;
            }
            EntityState::Deleted | EntityState::Detached => {}
        }

        Ok(())
    }

    /// Returns the tracking state of an entry; untracked handles are detached.
    #[must_use]
    pub fn state(&self, handle: EntryHandle) -> EntityState {
        self.entries
            .get(&handle)
            .map_or(EntityState::Detached, |entry| entry.state)
    }

    /// Returns the current identifier value of an entry.
    #[must_use]
    pub fn identifier_value(&self, handle: EntryHandle) -> Option<Value> {
        self.entries
            .get(&handle)
            .and_then(|entry| entry.current.get(entry.key_field_name.as_str()))
            .cloned()
    }

    /// Snapshots every entry with a pending write, in tracking order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<PendingChange> {
        self.entries
            .iter()
            .filter(|(_, entry)| entry.state.is_pending_write())
            .map(|(handle, entry)| PendingChange {
                handle: *handle,
                entity_type_name: entry.entity_type_name.clone(),
                key_field_name: entry.key_field_name.clone(),
                state: entry.state,
                prior_values: entry.original.clone(),
                current_values: (entry.state != EntityState::Deleted)
                    .then(|| entry.current.clone()),
            })
            .collect()
    }

    /// Returns whether any entry has a pending write.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        self.entries
            .values()
            .any(|entry| entry.state.is_pending_write())
    }

    /// Writes a storage-assigned identifier back into an added entry.
    pub fn assign_identifier(&mut self, handle: EntryHandle, entity_id: i64) -> AppResult<()> {
        let entry = self.entry_mut(handle)?;
        let key_field_name = entry.key_field_name.clone();
        entry.current.set(key_field_name, Value::from(entity_id));
        Ok(())
    }

    /// Promotes staged values to original values after a successful commit.
    ///
    /// Deleted entries stop being tracked; their handles report detached.
    pub fn accept_changes(&mut self) {
        self.entries.retain(|_, entry| entry.state != EntityState::Deleted);
        for entry in self.entries.values_mut() {
            entry.original = Some(entry.current.clone());
            entry.state = EntityState::Unchanged;
        }
    }

    fn track(&mut self, entry: TrackedEntry) -> EntryHandle {
        let handle = EntryHandle::new(self.next_handle);
        self.next_handle += 1;
        self.entries.insert(handle, entry);
        handle
    }

    fn entry_mut(&mut self, handle: EntryHandle) -> AppResult<&mut TrackedEntry> {
        self.entries
            .get_mut(&handle)
            .ok_or_else(|| AppError::NotFound(format!("{handle} is not tracked")))
    }
}

#[cfg(test)]
mod tests;
