use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Per-run variable store fed by step outputs.
///
/// Created empty for each run and owned by it; entries are only added or
/// replaced by an explicit `output_variable` binding.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Context {
    values: HashMap<String, Value>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Binds `name`, returning the value it replaced.
    pub fn bind(&mut self, name: &str, value: Value) -> Option<Value> {
        self.values.insert(name.to_string(), value)
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.values.get(name)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bound names, sorted so error messages are stable.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.values.keys().cloned().collect();
        names.sort();
        names
    }

    /// Convert the context to JSON for storage or transmission
    pub fn to_json(&self) -> Value {
        Value::Object(
            self.values
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bind_overwrites_and_reports_previous() {
        let mut context = Context::new();
        assert_eq!(context.bind("sum", json!(5)), None);
        assert_eq!(context.bind("sum", json!(7)), Some(json!(5)));
        assert_eq!(context.get("sum"), Some(&json!(7)));
        assert_eq!(context.len(), 1);
    }

    #[test]
    fn test_to_json_and_sorted_names() {
        let mut context = Context::new();
        context.bind("b", json!([1, 2]));
        context.bind("a", json!({"x": true}));
        assert_eq!(context.names(), vec!["a".to_string(), "b".to_string()]);
        assert_eq!(context.to_json(), json!({"a": {"x": true}, "b": [1, 2]}));
    }
}
