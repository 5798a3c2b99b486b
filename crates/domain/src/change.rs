use std::fmt::{Display, Formatter};

use scribe_core::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{EntityState, FieldValues};

/// Opaque handle to one entry tracked by a unit of work.
///
/// The handle stays valid across commit, so identifiers assigned by the
/// storage engine can be read back through it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryHandle(u64);

impl EntryHandle {
    /// Creates a handle from its raw sequence value.
    #[must_use]
    pub fn new(value: u64) -> Self {
        Self(value)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl Display for EntryHandle {
    fn fmt(&self, formatter: &mut Formatter<'_>) -> std::fmt::Result {
        write!(formatter, "entry-{}", self.0)
    }
}

/// Snapshot of one entity's proposed mutation, captured before commit.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingChange {
    /// Handle to the tracked entry this change was taken from.
    pub handle: EntryHandle,
    /// Entity type name from schema metadata.
    pub entity_type_name: String,
    /// Integer identifier field name from schema metadata.
    pub key_field_name: String,
    /// Tracking state at snapshot time.
    pub state: EntityState,
    /// Values as last loaded or committed. Absent for added entities.
    pub prior_values: Option<FieldValues>,
    /// Values as currently staged. Absent for deleted entities.
    pub current_values: Option<FieldValues>,
}

impl PendingChange {
    /// Returns the fields whose current value differs from the prior value, in field order.
    ///
    /// Empty unless both prior and current values are present.
    #[must_use]
    pub fn modified_field_names(&self) -> Vec<&str> {
        let (Some(prior), Some(current)) = (&self.prior_values, &self.current_values) else {
            return Vec::new();
        };

        let mut modified: Vec<&str> = current
            .iter()
            .filter(|(name, value)| prior.get(name) != Some(*value))
            .map(|(name, _)| name)
            .collect();

        modified.extend(
            prior
                .iter()
                .filter(|(name, _)| current.get(name).is_none())
                .map(|(name, _)| name),
        );

        modified
    }

    /// Returns the value of a field before the change, or null.
    #[must_use]
    pub fn prior_value(&self, field_name: &str) -> &Value {
        self.prior_values
            .as_ref()
            .and_then(|values| values.get(field_name))
            .unwrap_or(&Value::Null)
    }

    /// Returns the value of a field after the change, or null.
    #[must_use]
    pub fn current_value(&self, field_name: &str) -> &Value {
        self.current_values
            .as_ref()
            .and_then(|values| values.get(field_name))
            .unwrap_or(&Value::Null)
    }
}

/// Converts a key field value into an entity identifier.
///
/// Absent, null and non-integer values are rejected.
pub fn resolve_entity_id(
    entity_type_name: &str,
    key_field_name: &str,
    value: Option<&Value>,
) -> AppResult<i64> {
    match value {
        None | Some(Value::Null) => Err(AppError::IdentifierResolution(format!(
            "entity '{entity_type_name}' has no value for key field '{key_field_name}'"
        ))),
        Some(value) => value.as_i64().ok_or_else(|| {
            AppError::IdentifierResolution(format!(
                "key field '{key_field_name}' of entity '{entity_type_name}' is not an integer: {value}"
            ))
        }),
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use serde_json::{Value, json};

    use super::{EntryHandle, PendingChange, resolve_entity_id};
    use crate::{EntityState, FieldValues};

    fn values(pairs: &[(&str, Value)]) -> FieldValues {
        pairs
            .iter()
            .map(|(name, value)| ((*name).to_owned(), value.clone()))
            .collect()
    }

    fn modified_change(prior: FieldValues, current: FieldValues) -> PendingChange {
        PendingChange {
            handle: EntryHandle::new(1),
            entity_type_name: "customer".to_owned(),
            key_field_name: "id".to_owned(),
            state: EntityState::Modified,
            prior_values: Some(prior),
            current_values: Some(current),
        }
    }

    #[test]
    fn modified_fields_follow_field_order() {
        let change = modified_change(
            values(&[("id", json!(1)), ("name", json!("A")), ("email", json!("a@x"))]),
            values(&[("id", json!(1)), ("name", json!("B")), ("email", json!("b@x"))]),
        );

        assert_eq!(change.modified_field_names(), vec!["name", "email"]);
    }

    #[test]
    fn added_change_has_no_modified_fields() {
        let change = PendingChange {
            handle: EntryHandle::new(2),
            entity_type_name: "customer".to_owned(),
            key_field_name: "id".to_owned(),
            state: EntityState::Added,
            prior_values: None,
            current_values: Some(values(&[("id", Value::Null), ("name", json!("C"))])),
        };

        assert!(change.modified_field_names().is_empty());
        assert_eq!(change.prior_value("name"), &Value::Null);
    }

    #[test]
    fn resolve_entity_id_accepts_integers_only() {
        assert_eq!(resolve_entity_id("customer", "id", Some(&json!(7))).ok(), Some(7));
        assert!(resolve_entity_id("customer", "id", None).is_err());
        assert!(resolve_entity_id("customer", "id", Some(&Value::Null)).is_err());
        assert!(resolve_entity_id("customer", "id", Some(&json!("7"))).is_err());
        assert!(resolve_entity_id("customer", "id", Some(&json!(7.5))).is_err());
    }

    proptest! {
        #[test]
        fn modified_count_matches_changed_fields(
            changed in prop::collection::vec(any::<bool>(), 1..12),
        ) {
            let prior: FieldValues = changed
                .iter()
                .enumerate()
                .map(|(index, _)| (format!("field_{index}"), json!(index)))
                .collect();
            let current: FieldValues = changed
                .iter()
                .enumerate()
                .map(|(index, is_changed)| {
                    let value = if *is_changed {
                        json!(format!("new-{index}"))
                    } else {
                        json!(index)
                    };
                    (format!("field_{index}"), value)
                })
                .collect();

            let change = modified_change(prior, current);
            let expected: Vec<String> = changed
                .iter()
                .enumerate()
                .filter(|(_, is_changed)| **is_changed)
                .map(|(index, _)| format!("field_{index}"))
                .collect();

            prop_assert_eq!(change.modified_field_names(), expected);
        }
    }
}
