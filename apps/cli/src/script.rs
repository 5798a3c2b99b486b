use scribe_core::{AppError, AppResult};
use scribe_domain::EntitySchema;
use serde::Deserialize;
use serde_json::{Map, Value};

/// JSON change script accepted by `scribe apply`.
#[derive(Debug, Clone, Deserialize)]
pub struct ChangeScript {
    pub schemas: Vec<SchemaDefinition>,
    #[serde(default)]
    pub steps: Vec<ScriptStep>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SchemaDefinition {
    pub entity_type_name: String,
    pub key_field_name: String,
    pub field_names: Vec<String>,
}

/// One staged change, or `save` to commit everything staged so far.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ScriptStep {
    Create {
        entity_type_name: String,
        #[serde(default)]
        values: Map<String, Value>,
    },
    Update {
        entity_type_name: String,
        id: i64,
        values: Map<String, Value>,
    },
    Delete {
        entity_type_name: String,
        id: i64,
    },
    Save,
}

impl ChangeScript {
    pub fn parse(text: &str) -> AppResult<Self> {
        serde_json::from_str(text)
            .map_err(|error| AppError::Validation(format!("invalid change script: {error}")))
    }

    pub fn entity_schemas(&self) -> AppResult<Vec<EntitySchema>> {
        self.schemas
            .iter()
            .map(|definition| {
                EntitySchema::new(
                    definition.entity_type_name.as_str(),
                    definition.key_field_name.as_str(),
                    definition.field_names.iter().map(String::as_str),
                )
            })
            .collect()
    }
}
