//! Variable scope shared across the nodes of a run.

use std::collections::HashMap;

use serde::{Deserialize, Serialize, de::DeserializeOwned};
use serde_json::{Map, Value};

/// A flat, JSON-valued variable map.
///
/// Node outputs are merged into the run's `Vars` with last-write-wins semantics.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vars {
    inner: Map<String, Value>,
}

impl Vars {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with<T: Serialize>(
        mut self,
        key: &str,
        value: T,
    ) -> Self {
        self.set(key, value);
        self
    }

    pub fn set<T: Serialize>(
        &mut self,
        key: &str,
        value: T,
    ) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.inner.insert(key.to_string(), value);
    }

    /// Get a value and deserialize it into `T`.
    pub fn get<T: DeserializeOwned>(
        &self,
        key: &str,
    ) -> Option<T> {
        self.inner.get(key).and_then(|v| serde_json::from_value(v.clone()).ok())
    }

    pub fn get_value(
        &self,
        key: &str,
    ) -> Option<&Value> {
        self.inner.get(key)
    }

    pub fn contains_key(
        &self,
        key: &str,
    ) -> bool {
        self.inner.contains_key(key)
    }

    pub fn remove(
        &mut self,
        key: &str,
    ) -> Option<Value> {
        self.inner.remove(key)
    }

    /// Merge `other` into self; keys in `other` win.
    pub fn merge(
        &mut self,
        other: &Vars,
    ) {
        for (k, v) in other.inner.iter() {
            self.inner.insert(k.clone(), v.clone());
        }
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }

    pub fn iter(&self) -> serde_json::map::Iter<'_> {
        self.inner.iter()
    }

    pub fn keys(&self) -> impl Iterator<Item = &String> {
        self.inner.keys()
    }
}

impl From<Value> for Vars {
    /// Objects become the variable map; any other value yields an empty scope.
    fn from(value: Value) -> Self {
        match value {
            Value::Object(inner) => Self {
                inner,
            },
            _ => Self::default(),
        }
    }
}

impl From<Map<String, Value>> for Vars {
    fn from(inner: Map<String, Value>) -> Self {
        Self {
            inner,
        }
    }
}

impl From<HashMap<String, Value>> for Vars {
    fn from(map: HashMap<String, Value>) -> Self {
        map.into_iter().collect()
    }
}

impl From<Vars> for Value {
    fn from(vars: Vars) -> Self {
        Value::Object(vars.inner)
    }
}

impl FromIterator<(String, Value)> for Vars {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            inner: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_vars_set_get() {
        let mut vars = Vars::new();
        vars.set("name", "Alice");
        vars.set("age", 30);

        assert_eq!(vars.get::<String>("name"), Some("Alice".to_string()));
        assert_eq!(vars.get::<i64>("age"), Some(30));
        assert_eq!(vars.get::<String>("age"), None);
        assert!(vars.get_value("missing").is_none());
    }

    #[test]
    fn test_vars_merge_last_write_wins() {
        let mut vars = Vars::new().with("a", 1).with("b", 2);
        vars.merge(&Vars::new().with("b", 3).with("c", 4));

        assert_eq!(Value::from(vars), json!({"a": 1, "b": 3, "c": 4}));
    }

    #[test]
    fn test_vars_from_value() {
        let vars = Vars::from(json!({"x": [1, 2]}));
        assert_eq!(vars.get_value("x"), Some(&json!([1, 2])));
        assert!(Vars::from(json!("text")).is_empty());
    }
}
