use std::collections::{BTreeMap, HashMap};

use scribe_core::{AppError, AppResult};
use scribe_domain::{EntityState, EntryHandle, FieldValues, PendingChange};
use serde_json::Value;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct EntityTable {
    last_id: i64,
    rows: BTreeMap<i64, FieldValues>,
}

/// Outcome of applying one batch of writes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppliedWrites {
    /// Number of rows inserted, updated, or deleted.
    pub affected_rows: u64,
    /// Identifiers of inserted rows by entry handle.
    pub assigned_ids: Vec<(EntryHandle, i64)>,
}

/// In-memory entity storage with per-type auto-increment identifiers.
#[derive(Debug, Default)]
pub struct InMemoryEntityStore {
    tables: RwLock<HashMap<String, EntityTable>>,
}

impl InMemoryEntityStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns one stored row.
    pub async fn find(&self, entity_type_name: &str, entity_id: i64) -> Option<FieldValues> {
        self.tables
            .read()
            .await
            .get(entity_type_name)
            .and_then(|table| table.rows.get(&entity_id))
            .cloned()
    }

    /// Returns the number of stored rows of one entity type.
    pub async fn count(&self, entity_type_name: &str) -> usize {
        self.tables
            .read()
            .await
            .get(entity_type_name)
            .map_or(0, |table| table.rows.len())
    }

    /// Applies a batch of writes atomically.
    ///
    /// The whole batch is validated before any row changes, so a conflict leaves
    /// the store untouched.
    pub async fn apply(&self, changes: &[PendingChange]) -> AppResult<AppliedWrites> {
        let mut tables = self.tables.write().await;
        let planned_ids = validate(&tables, changes)?;

        let mut applied = AppliedWrites::default();
        for change in changes {
            let table = tables.entry(change.entity_type_name.clone()).or_default();
            match change.state {
                EntityState::Added => {
                    let Some(&entity_id) = planned_ids.get(&change.handle) else {
                        continue;
                    };
                    let mut values = change.current_values.clone().unwrap_or_default();
                    table.last_id = table.last_id.max(entity_id);
                    values.set(change.key_field_name.as_str(), Value::from(entity_id));
                    table.rows.insert(entity_id, values);
                    applied.assigned_ids.push((change.handle, entity_id));
                }
                EntityState::Modified => {
                    if let (Some(entity_id), Some(values)) =
                        (stored_id(change), change.current_values.clone())
                    {
                        table.rows.insert(entity_id, values);
                    }
                }
                EntityState::Deleted => {
                    if let Some(entity_id) = stored_id(change) {
                        table.rows.remove(&entity_id);
                    }
                }
                EntityState::Unchanged | EntityState::Detached => continue,
            }
            applied.affected_rows += 1;
        }

        Ok(applied)
    }
}

/// Checks the batch against stored rows and returns the identifier each insert receives.
fn validate(
    tables: &HashMap<String, EntityTable>,
    changes: &[PendingChange],
) -> AppResult<HashMap<EntryHandle, i64>> {
    let mut planned_ids = HashMap::new();
    let mut last_ids: HashMap<&str, i64> = HashMap::new();
    let mut inserted: Vec<(&str, i64)> = Vec::new();
    for change in changes {
        let table = tables.get(change.entity_type_name.as_str());
        let exists =
            |entity_id: i64| table.is_some_and(|table| table.rows.contains_key(&entity_id));

        match change.state {
            EntityState::Added => {
                let last_id = last_ids
                    .entry(change.entity_type_name.as_str())
                    .or_insert_with(|| table.map_or(0, |table| table.last_id));
                let entity_id = match explicit_id(change) {
                    Some(entity_id) => entity_id,
                    None => {
                        if !change
                            .current_values
                            .as_ref()
                            .and_then(|values| values.get(change.key_field_name.as_str()))
                            .is_none_or(Value::is_null)
                        {
                            return Err(AppError::Validation(format!(
                                "identifier of new '{}' must be an integer or null",
                                change.entity_type_name
                            )));
                        }
                        last_id.checked_add(1).ok_or_else(|| {
                            AppError::Conflict(format!(
                                "no identifiers left for new '{}'",
                                change.entity_type_name
                            ))
                        })?
                    }
                };
                *last_id = (*last_id).max(entity_id);

                let key = (change.entity_type_name.as_str(), entity_id);
                if exists(entity_id) || inserted.contains(&key) {
                    return Err(AppError::Conflict(format!(
                        "entity '{}' with identifier {entity_id} already exists",
                        change.entity_type_name
                    )));
                }
                inserted.push(key);
                planned_ids.insert(change.handle, entity_id);
            }
            EntityState::Modified | EntityState::Deleted => match stored_id(change) {
                Some(entity_id) if exists(entity_id) => {}
                Some(entity_id) => {
                    return Err(AppError::Conflict(format!(
                        "entity '{}' with identifier {entity_id} no longer exists",
                        change.entity_type_name
                    )));
                }
                None => {
                    return Err(AppError::Validation(format!(
                        "stored '{}' has no integer identifier",
                        change.entity_type_name
                    )));
                }
            },
            EntityState::Unchanged | EntityState::Detached => {}
        }
    }

    Ok(planned_ids)
}

fn explicit_id(change: &PendingChange) -> Option<i64> {
    change
        .current_values
        .as_ref()
        .and_then(|values| values.get(change.key_field_name.as_str()))
        .and_then(Value::as_i64)
}

fn stored_id(change: &PendingChange) -> Option<i64> {
    change
        .prior_values
        .as_ref()
        .and_then(|values| values.get(change.key_field_name.as_str()))
        .and_then(Value::as_i64)
}
