use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::EntityState;

/// Operation label written on audit records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AuditOperation {
    /// Entity was inserted.
    Created,
    /// Entity field was changed.
    Updated,
    /// Entity was removed.
    Deleted,
    /// Entity was recorded in a state without a dedicated label.
    Unknown,
}

impl AuditOperation {
    /// Maps a tracking state to its audit label.
    ///
    /// States other than added, modified and deleted map to `Unknown`.
    #[must_use]
    pub fn from_state(state: EntityState) -> Self {
        match state {
            EntityState::Added => Self::Created,
            EntityState::Modified => Self::Updated,
            EntityState::Deleted => Self::Deleted,
            EntityState::Unchanged | EntityState::Detached => Self::Unknown,
        }
    }

    /// Returns a stable storage value for this operation.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "Created",
            Self::Updated => "Updated",
            Self::Deleted => "Deleted",
            Self::Unknown => "Unknown",
        }
    }
}

impl Display for AuditOperation {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        formatter.write_str(self.as_str())
    }
}

/// Immutable audit log entry for one field-level or whole-entity change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    timestamp: DateTime<Utc>,
    entity_type_name: String,
    entity_id: i64,
    operation: AuditOperation,
    field_name: Option<String>,
    old_value: Option<String>,
    new_value: Option<String>,
}

impl AuditRecord {
    /// Creates a whole-entity record without field details.
    #[must_use]
    pub fn whole_entity(
        timestamp: DateTime<Utc>,
        entity_type_name: impl Into<String>,
        entity_id: i64,
        operation: AuditOperation,
    ) -> Self {
        Self {
            timestamp,
            entity_type_name: entity_type_name.into(),
            entity_id,
            operation,
            field_name: None,
            old_value: None,
            new_value: None,
        }
    }

    /// Creates a record for one changed field.
    #[must_use]
    pub fn field_change(
        timestamp: DateTime<Utc>,
        entity_type_name: impl Into<String>,
        entity_id: i64,
        field_name: impl Into<String>,
        old_value: String,
        new_value: String,
    ) -> Self {
        Self {
            timestamp,
            entity_type_name: entity_type_name.into(),
            entity_id,
            operation: AuditOperation::Updated,
            field_name: Some(field_name.into()),
            old_value: Some(old_value),
            new_value: Some(new_value),
        }
    }

    /// Returns the UTC instant the record was synthesized.
    #[must_use]
    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity_type_name(&self) -> &str {
        self.entity_type_name.as_str()
    }

    /// Returns the affected entity identifier.
    #[must_use]
    pub fn entity_id(&self) -> i64 {
        self.entity_id
    }

    /// Returns the operation label.
    #[must_use]
    pub fn operation(&self) -> AuditOperation {
        self.operation
    }

    /// Returns the changed field, or `None` for whole-entity records.
    #[must_use]
    pub fn field_name(&self) -> Option<&str> {
        self.field_name.as_deref()
    }

    /// Returns the serialized value before the change.
    #[must_use]
    pub fn old_value(&self) -> Option<&str> {
        self.old_value.as_deref()
    }

    /// Returns the serialized value after the change.
    #[must_use]
    pub fn new_value(&self) -> Option<&str> {
        self.new_value.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{AuditOperation, AuditRecord};
    use crate::EntityState;

    #[test]
    fn states_map_to_labels() {
        assert_eq!(
            AuditOperation::from_state(EntityState::Added),
            AuditOperation::Created
        );
        assert_eq!(
            AuditOperation::from_state(EntityState::Modified),
            AuditOperation::Updated
        );
        assert_eq!(
            AuditOperation::from_state(EntityState::Deleted),
            AuditOperation::Deleted
        );
        assert_eq!(
            AuditOperation::from_state(EntityState::Unchanged),
            AuditOperation::Unknown
        );
    }

    #[test]
    fn whole_entity_record_has_no_field_details() {
        let record = AuditRecord::whole_entity(Utc::now(), "customer", 2, AuditOperation::Deleted);
        assert_eq!(record.field_name(), None);
        assert_eq!(record.old_value(), None);
        assert_eq!(record.new_value(), None);
    }

    #[test]
    fn null_field_value_survives_json_roundtrip() {
        let record = AuditRecord::field_change(
            Utc::now(),
            "customer",
            1,
            "email",
            "null".to_owned(),
            "\"c@example.com\"".to_owned(),
        );

        let old_value: serde_json::Value =
            serde_json::from_str(record.old_value().unwrap_or_default())
                .unwrap_or_else(|_| unreachable!());
        assert!(old_value.is_null());
        assert_ne!(old_value, serde_json::Value::String("null".to_owned()));
    }
}
