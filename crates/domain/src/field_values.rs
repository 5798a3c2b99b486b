use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field values of one entity, kept in schema metadata order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FieldValues(Vec<(String, Value)>);

impl FieldValues {
    /// Creates an empty value set.
    #[must_use]
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Returns the value stored for a field.
    #[must_use]
    pub fn get(&self, field_name: &str) -> Option<&Value> {
        self.0
            .iter()
            .find_map(|(name, value)| (name == field_name).then_some(value))
    }

    /// Sets a field value, appending the field when it is not present yet.
    pub fn set(&mut self, field_name: impl Into<String>, value: Value) {
        let field_name = field_name.into();
        match self.0.iter_mut().find(|(name, _)| *name == field_name) {
            Some((_, slot)) => *slot = value,
            None => self.0.push((field_name, value)),
        }
    }

    /// Removes a field and returns its previous value.
    pub fn remove(&mut self, field_name: &str) -> Option<Value> {
        let position = self.0.iter().position(|(name, _)| name == field_name)?;
        Some(self.0.remove(position).1)
    }

    /// Iterates fields in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.0.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Converts the values into a JSON object.
    #[must_use]
    pub fn to_json_object(&self) -> Value {
        let object: Map<String, Value> = self
            .0
            .iter()
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Value::Object(object)
    }
}

impl FromIterator<(String, Value)> for FieldValues {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        let mut values = Self::new();
        for (name, value) in iter {
            values.set(name, value);
        }
        values
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::FieldValues;

    #[test]
    fn set_replaces_in_place_and_keeps_order() {
        let mut values = FieldValues::new();
        values.set("id", json!(1));
        values.set("name", json!("A"));
        values.set("id", json!(2));

        let names: Vec<&str> = values.iter().map(|(name, _)| name).collect();
        assert_eq!(names, vec!["id", "name"]);
        assert_eq!(values.get("id"), Some(&json!(2)));
    }

    #[test]
    fn remove_returns_previous_value() {
        let mut values: FieldValues = [("id".to_owned(), json!(4))].into_iter().collect();
        assert_eq!(values.remove("id"), Some(json!(4)));
        assert_eq!(values.iter().count(), 0);
        assert_eq!(values.remove("id"), None);
    }
}
