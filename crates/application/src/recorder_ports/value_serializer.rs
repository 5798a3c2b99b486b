use scribe_core::AppResult;
use serde_json::Value;

/// Converts field values into their textual audit representation.
pub trait ValueSerializer: Send + Sync {
    /// Serializes one value. Null must serialize to the literal null representation.
    fn serialize(&self, value: &Value) -> AppResult<String>;
}
