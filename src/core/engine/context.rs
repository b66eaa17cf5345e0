use serde::Serialize;
use serde_json::{Map, Value};

/// Shared key/value state for one run. Later writes win; nothing is rolled back.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    pub fn new(seed: Map<String, Value>) -> Self {
        Self { values: seed }
    }

    /// Merge a step output into the context, overwriting existing keys.
    pub fn merge(&mut self, output: &Map<String, Value>) {
        for (key, value) in output {
            self.values.insert(key.clone(), value.clone());
        }
    }

    pub fn insert(&mut self, key: &str, value: Value) {
        self.values.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.values.get(key).and_then(|v| v.as_str())
    }

    /// Owned copy handed to a step as its input.
    pub fn snapshot(&self) -> Map<String, Value> {
        self.values.clone()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Truthiness of a step output: present and non-empty.
pub fn is_truthy(output: Option<&Map<String, Value>>) -> bool {
    output.map(|o| !o.is_empty()).unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_is_last_writer_wins() {
        let mut ctx = ExecutionContext::new(map(json!({"package": "anaconda", "a": 0})));
        ctx.merge(&map(json!({"a": 1, "b": true})));
        ctx.merge(&map(json!({"a": 2})));

        assert_eq!(ctx.get("a"), Some(&json!(2)));
        assert_eq!(ctx.get("b"), Some(&json!(true)));
        assert_eq!(ctx.get_str("package"), Some("anaconda"));
    }

    #[test]
    fn snapshot_is_detached() {
        let mut ctx = ExecutionContext::new(Map::new());
        let before = ctx.snapshot();
        ctx.insert("x", json!(1));
        assert!(before.is_empty());
        assert_eq!(ctx.len(), 1);
    }

    #[test]
    fn truthiness() {
        assert!(!is_truthy(None));
        assert!(!is_truthy(Some(&Map::new())));
        assert!(is_truthy(Some(&map(json!({"builds": []})))));
    }
}
