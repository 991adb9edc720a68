//! Shared Store
//!
//! The mutable key-value context threaded through every step of one
//! top-level run, including nested flows. Values are JSON values so any
//! `Serialize` type can be stored and read back with its own type.
//!
//! The store enforces no schema. Steps document the keys they read in
//! `prepare` and write in `post`; producers must write before consumers read.

use std::collections::HashMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{FlowError, Result};

/// Key-value context shared by all steps of a run.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(transparent)]
pub struct SharedStore {
    values: HashMap<String, Value>,
}

impl SharedStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store from existing values.
    pub fn from_map(values: HashMap<String, Value>) -> Self {
        Self { values }
    }

    /// Serializes `value` and stores it under `key`, replacing any previous value.
    pub fn set<T: Serialize + ?Sized>(&mut self, key: impl Into<String>, value: &T) -> Result<()> {
        let key = key.into();
        let value = serde_json::to_value(value).map_err(|source| FlowError::Serialize {
            key: key.clone(),
            source,
        })?;
        self.values.insert(key, value);
        Ok(())
    }

    /// Stores a raw JSON value, returning the previous one.
    pub fn insert_value(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.values.insert(key.into(), value)
    }

    /// Reads and deserializes the value under `key`.
    ///
    /// Fails with [`FlowError::MissingKey`] when the key is absent and
    /// [`FlowError::TypeMismatch`] when the value has a different shape.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> Result<T> {
        let value = self
            .values
            .get(key)
            .ok_or_else(|| FlowError::MissingKey(key.to_string()))?;

        T::deserialize(value).map_err(|source| FlowError::TypeMismatch {
            key: key.to_string(),
            source,
        })
    }

    /// Like [`get`](Self::get) but returns `None` on a missing key or wrong type.
    pub fn try_get<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        self.values.get(key).and_then(|v| T::deserialize(v).ok())
    }

    /// Reads `key`, falling back to `default` when absent or mistyped.
    pub fn get_or<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        self.try_get(key).unwrap_or(default)
    }

    pub fn get_value(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.contains_key(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn into_inner(self) -> HashMap<String, Value> {
        self.values
    }
}

impl FromIterator<(String, Value)> for SharedStore {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_and_get_typed() {
        let mut store = SharedStore::new();
        store.set("count", &3u32).unwrap();
        store.set("texts", &vec!["a", "b"]).unwrap();

        assert_eq!(store.get::<u32>("count").unwrap(), 3);
        assert_eq!(store.get::<Vec<String>>("texts").unwrap(), vec!["a", "b"]);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn test_get_missing_key() {
        let store = SharedStore::new();
        let err = store.get::<String>("absent").unwrap_err();
        assert!(matches!(err, FlowError::MissingKey(ref k) if k == "absent"));
    }

    #[test]
    fn test_get_type_mismatch() {
        let mut store = SharedStore::new();
        store.set("score", "high").unwrap();

        let err = store.get::<i64>("score").unwrap_err();
        assert!(matches!(err, FlowError::TypeMismatch { .. }));
        assert!(store.try_get::<i64>("score").is_none());
    }

    #[test]
    fn test_get_or_default() {
        let mut store = SharedStore::new();
        assert_eq!(store.get_or("attempt", 0u32), 0);
        store.set("attempt", &2u32).unwrap();
        assert_eq!(store.get_or("attempt", 0u32), 2);
    }

    #[test]
    fn test_overwrite_and_remove() {
        let mut store = SharedStore::new();
        store.insert_value("k", json!(1));
        let previous = store.insert_value("k", json!(2));

        assert_eq!(previous, Some(json!(1)));
        assert_eq!(store.remove("k"), Some(json!(2)));
        assert!(store.is_empty());
    }

    #[test]
    fn test_from_iterator_and_json_shape() {
        let store: SharedStore = vec![("prompt".to_string(), json!("hello"))]
            .into_iter()
            .collect();

        assert!(store.contains_key("prompt"));
        assert_eq!(serde_json::to_value(&store).unwrap(), json!({"prompt": "hello"}));
    }
}
