use scribe_application::ValueSerializer;
use scribe_core::{AppError, AppResult};
use serde_json::Value;

/// Renders audited field values as compact JSON text.
///
/// Absent values are rendered as the literal `null`.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonValueSerializer;

impl ValueSerializer for JsonValueSerializer {
    fn serialize(&self, value: &Value) -> AppResult<String> {
        serde_json::to_string(value).map_err(|error| {
            AppError::Serialization(format!("failed to serialize field value: {error}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use scribe_application::ValueSerializer;
    use serde_json::{Value, json};

    use super::JsonValueSerializer;

    #[test]
    fn strings_are_quoted_and_null_is_literal() {
        let serializer = JsonValueSerializer;

        assert_eq!(
            serializer.serialize(&json!("Ada")).unwrap_or_default(),
            "\"Ada\""
        );
        assert_eq!(serializer.serialize(&Value::Null).unwrap_or_default(), "null");
        assert_eq!(
            serializer
                .serialize(&json!({"a": [1, 2]}))
                .unwrap_or_default(),
            "{\"a\":[1,2]}"
        );
    }
}
