use std::collections::HashSet;

use scribe_core::{AppError, AppResult, NonEmptyString};
use serde_json::{Map, Value};

use crate::FieldValues;

/// Schema metadata for one tracked entity type.
///
/// Field order is significant: snapshots and audit records follow it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntitySchema {
    entity_type_name: NonEmptyString,
    key_field_name: NonEmptyString,
    field_names: Vec<NonEmptyString>,
}

impl EntitySchema {
    /// Creates validated schema metadata.
    ///
    /// The key field must be one of the declared fields and field names must be unique.
    pub fn new(
        entity_type_name: impl Into<String>,
        key_field_name: impl Into<String>,
        field_names: impl IntoIterator<Item = impl Into<String>>,
    ) -> AppResult<Self> {
        let entity_type_name = NonEmptyString::new(entity_type_name)?;
        let key_field_name = NonEmptyString::new(key_field_name)?;
        let field_names = field_names
            .into_iter()
            .map(NonEmptyString::new)
            .collect::<AppResult<Vec<_>>>()?;

        let mut seen = HashSet::new();
        for field_name in &field_names {
            if !seen.insert(field_name.as_str()) {
                return Err(AppError::Validation(format!(
                    "field '{}' is declared twice on entity '{}'",
                    field_name, entity_type_name
                )));
            }
        }

        if !seen.contains(key_field_name.as_str()) {
            return Err(AppError::Validation(format!(
                "key field '{}' is not declared on entity '{}'",
                key_field_name, entity_type_name
            )));
        }

        Ok(Self {
            entity_type_name,
            key_field_name,
            field_names,
        })
    }

    /// Returns the entity type name.
    #[must_use]
    pub fn entity_type_name(&self) -> &NonEmptyString {
        &self.entity_type_name
    }

    /// Returns the integer identifier field name.
    #[must_use]
    pub fn key_field_name(&self) -> &NonEmptyString {
        &self.key_field_name
    }

    /// Returns field names in metadata order.
    #[must_use]
    pub fn field_names(&self) -> &[NonEmptyString] {
        &self.field_names
    }

    /// Returns whether the schema declares the field.
    #[must_use]
    pub fn contains_field(&self, field_name: &str) -> bool {
        self.field_names
            .iter()
            .any(|declared| declared.as_str() == field_name)
    }

    /// Arranges raw values in metadata order.
    ///
    /// Declared fields without a value are filled with null. Undeclared fields are rejected.
    pub fn order_values(&self, mut values: Map<String, Value>) -> AppResult<FieldValues> {
        let ordered: FieldValues = self
            .field_names
            .iter()
            .map(|field_name| {
                let value = values.remove(field_name.as_str()).unwrap_or(Value::Null);
                (field_name.as_str().to_owned(), value)
            })
            .collect();

        if let Some(unknown) = values.keys().next() {
            return Err(AppError::Validation(format!(
                "field '{unknown}' is not declared on entity '{}'",
                self.entity_type_name
            )));
        }

        Ok(ordered)
    }
}
