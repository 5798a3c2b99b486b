use std::sync::Arc;

use chrono::{DateTime, Utc};
use scribe_core::AppResult;
use scribe_domain::{AuditOperation, AuditRecord, EntityState, PendingChange, resolve_entity_id};

use crate::recorder_ports::ValueSerializer;

/// Derives audit records from pending change snapshots.
#[derive(Clone)]
pub struct AuditSynthesizer {
    serializer: Arc<dyn ValueSerializer>,
}

impl AuditSynthesizer {
    /// Creates a synthesizer using the provided value serializer.
    #[must_use]
    pub fn new(serializer: Arc<dyn ValueSerializer>) -> Self {
        Self { serializer }
    }

    /// Synthesizes records for a change whose identifier is present in its snapshot.
    ///
    /// Deleted entries read the key from prior values, every other state from
    /// current values (falling back to prior values for unlabelled states).
    pub fn synthesize(
        &self,
        change: &PendingChange,
        state: EntityState,
        synthesized_at: DateTime<Utc>,
    ) -> AppResult<Vec<AuditRecord>> {
        if is_noop_update(change, state) {
            return Ok(Vec::new());
        }

        let key_value = match state {
            EntityState::Deleted => change.prior_values.as_ref(),
            EntityState::Added | EntityState::Modified => change.current_values.as_ref(),
            EntityState::Unchanged | EntityState::Detached => change
                .current_values
                .as_ref()
                .or(change.prior_values.as_ref()),
        }
        .and_then(|values| values.get(change.key_field_name.as_str()));

        let entity_id = resolve_entity_id(
            change.entity_type_name.as_str(),
            change.key_field_name.as_str(),
            key_value,
        )?;

        self.synthesize_resolved(change, state, entity_id, synthesized_at)
    }

    /// Synthesizes records for a change whose identifier was resolved elsewhere.
    pub fn synthesize_resolved(
        &self,
        change: &PendingChange,
        state: EntityState,
        entity_id: i64,
        synthesized_at: DateTime<Utc>,
    ) -> AppResult<Vec<AuditRecord>> {
        let operation = AuditOperation::from_state(state);
        if operation != AuditOperation::Updated {
            return Ok(vec![AuditRecord::whole_entity(
                synthesized_at,
                change.entity_type_name.as_str(),
                entity_id,
                operation,
            )]);
        }

        change
            .modified_field_names()
            .into_iter()
            .map(|field_name| {
                Ok(AuditRecord::field_change(
                    synthesized_at,
                    change.entity_type_name.as_str(),
                    entity_id,
                    field_name,
                    self.serializer.serialize(change.prior_value(field_name))?,
                    self.serializer.serialize(change.current_value(field_name))?,
                ))
            })
            .collect()
    }
}

fn is_noop_update(change: &PendingChange, state: EntityState) -> bool {
    state == EntityState::Modified && change.modified_field_names().is_empty()
}
