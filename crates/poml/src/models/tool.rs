use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};

use super::content::describe;

/// A tool the model may call, as declared in the markup.
///
/// The renderer's object is kept exactly as emitted so `dict` and `langchain`
/// pass it through untouched. Defaults for missing keys are applied only when
/// building a provider request.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(transparent)]
pub struct ToolDefinition(Map<String, Value>);

impl ToolDefinition {
    /// Create a new function tool with the given name and description
    pub fn new<N, D>(name: N, description: D, parameters: Value) -> Self
    where
        N: Into<String>,
        D: Into<String>,
    {
        let mut object = Map::new();
        object.insert("type".to_string(), json!("function"));
        object.insert("name".to_string(), Value::String(name.into()));
        object.insert("description".to_string(), Value::String(description.into()));
        object.insert("parameters".to_string(), parameters);
        ToolDefinition(object)
    }

    pub fn from_object(object: Map<String, Value>) -> Self {
        ToolDefinition(object)
    }

    pub fn as_object(&self) -> &Map<String, Value> {
        &self.0
    }

    /// The declared name, if the renderer emitted a string one
    pub fn name(&self) -> Option<&str> {
        self.0.get("name").and_then(Value::as_str)
    }

    /// The value under `key`, or `default` when the key is absent
    pub fn field_or(&self, key: &str, default: Value) -> Value {
        self.0.get(key).cloned().unwrap_or(default)
    }
}

impl<'de> Deserialize<'de> for ToolDefinition {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match Value::deserialize(deserializer)? {
            Value::Object(object) => Ok(ToolDefinition(object)),
            other => Err(serde::de::Error::custom(format!(
                "tool definition must be an object, got {}",
                describe(&other)
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_roundtrip_keeps_every_key() {
        let wire = json!({
            "type": "function",
            "name": "search",
            "description": "Search for information",
            "parameters": {"type": "object", "properties": {"query": {"type": "string"}}}
        });
        let tool: ToolDefinition = serde_json::from_value(wire.clone()).unwrap();
        assert_eq!(tool.name(), Some("search"));
        assert_eq!(serde_json::to_value(&tool).unwrap(), wire);
        assert_eq!(
            tool,
            ToolDefinition::new(
                "search",
                "Search for information",
                json!({"type": "object", "properties": {"query": {"type": "string"}}})
            )
        );
    }

    #[test]
    fn test_missing_keys_are_not_filled_in() {
        let tool: ToolDefinition = serde_json::from_value(json!({"name": "ping"})).unwrap();
        assert_eq!(serde_json::to_value(&tool).unwrap(), json!({"name": "ping"}));
        assert_eq!(tool.field_or("description", json!("")), json!(""));
        assert_eq!(tool.field_or("name", json!("")), json!("ping"));
    }

    #[test]
    fn test_nameless_tool_is_accepted() {
        let tool: ToolDefinition =
            serde_json::from_value(json!({"description": "anonymous"})).unwrap();
        assert_eq!(tool.name(), None);
    }

    #[test]
    fn test_non_object_is_rejected() {
        assert!(serde_json::from_value::<ToolDefinition>(json!("search")).is_err());
    }
}
