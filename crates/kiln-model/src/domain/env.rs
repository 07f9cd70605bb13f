use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::KeyValue;

/// Environment section of a job submission.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvPlan {
    /// Named environment sets, applied in order.
    #[serde(default, rename = "use")]
    pub use_sets: Vec<String>,
    /// Explicit keys applied after every named set.
    #[serde(default, rename = "override")]
    pub overrides: BTreeMap<String, String>,
}

/// Layered list of environment variables.
///
/// Internally stored as a list of key–value pairs; later entries shadow earlier ones.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvLayers(Vec<KeyValue>);

impl EnvLayers {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KeyValue> {
        self.0.iter()
    }

    /// Get the value for a key, returning the last matching entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0
            .iter()
            .rev()
            .find(|kv| kv.key() == key)
            .map(|kv| kv.value())
    }

    /// Append a key–value pair; it overrides earlier entries with the same key.
    pub fn push<K, V>(&mut self, key: K, value: V)
    where
        K: Into<String>,
        V: Into<String>,
    {
        self.0.push(KeyValue::new(key, value));
    }

    /// Append every pair of a map as a new layer.
    pub fn extend_map(&mut self, map: &BTreeMap<String, String>) {
        for (k, v) in map {
            self.push(k.clone(), v.clone());
        }
    }

    /// Combine two layer stacks; entries from `other` override `self`.
    pub fn merged(&self, other: &EnvLayers) -> EnvLayers {
        let mut out = self.0.clone();
        out.extend(other.0.iter().cloned());
        EnvLayers(out)
    }

    /// Collapse the layers into a map with unique keys, last entry wins.
    pub fn flatten(&self) -> EnvironmentMap {
        let mut out = BTreeMap::new();
        for kv in &self.0 {
            out.insert(kv.key().to_string(), kv.value().to_string());
        }
        EnvironmentMap(out)
    }
}

/// Final environment applied to a running job.
///
/// Keys are unique; ordering carries no meaning for consumers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EnvironmentMap(BTreeMap<String, String>);

impl EnvironmentMap {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for EnvironmentMap {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}
