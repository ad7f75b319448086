//! In-memory entity collections handed to mappers and filters.
//!
//! A `Cache` holds the instances of one knowledge base: each instance is a
//! URI plus a multi-valued property map. Ordered containers keep iteration
//! (and therefore every mapper built on top of it) deterministic.

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub uri: String,
    #[serde(default)]
    pub properties: BTreeMap<String, BTreeSet<String>>,
}

impl Instance {
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            uri: uri.into(),
            properties: BTreeMap::new(),
        }
    }

    pub fn add_property(&mut self, property: &str, value: impl Into<String>) {
        self.properties
            .entry(property.to_string())
            .or_default()
            .insert(value.into());
    }

    /// Values of `property`; empty when the instance does not carry it.
    pub fn values(&self, property: &str) -> BTreeSet<String> {
        self.properties.get(property).cloned().unwrap_or_default()
    }

    pub fn property_names(&self) -> impl Iterator<Item = &str> {
        self.properties.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cache {
    instances: BTreeMap<String, Instance>,
}

impl Cache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a cache from a JSON array of instances.
    pub fn from_json_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let instances: Vec<Instance> = serde_json::from_str(&text)?;
        Ok(instances.into_iter().collect())
    }

    /// Record one `(uri, property, value)` triple, creating the instance on demand.
    pub fn add_triple(&mut self, uri: &str, property: &str, value: impl Into<String>) {
        self.instances
            .entry(uri.to_string())
            .or_insert_with(|| Instance::new(uri))
            .add_property(property, value);
    }

    /// Insert an instance, merging its values into an existing one with the same URI.
    pub fn add_instance(&mut self, instance: Instance) {
        match self.instances.get_mut(&instance.uri) {
            Some(existing) => {
                for (property, values) in instance.properties {
                    existing.properties.entry(property).or_default().extend(values);
                }
            }
            None => {
                self.instances.insert(instance.uri.clone(), instance);
            }
        }
    }

    pub fn instance(&self, uri: &str) -> Option<&Instance> {
        self.instances.get(uri)
    }

    pub fn contains_uri(&self, uri: &str) -> bool {
        self.instances.contains_key(uri)
    }

    pub fn instances(&self) -> impl Iterator<Item = &Instance> {
        self.instances.values()
    }

    pub fn uris(&self) -> impl Iterator<Item = &str> {
        self.instances.keys().map(String::as_str)
    }

    pub fn size(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }
}

impl FromIterator<Instance> for Cache {
    fn from_iter<I: IntoIterator<Item = Instance>>(iter: I) -> Self {
        let mut cache = Cache::new();
        for instance in iter {
            cache.add_instance(instance);
        }
        cache
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn triples_accumulate_values_per_property() {
        let mut cache = Cache::new();
        cache.add_triple("ex:a", "name", "Berlin");
        cache.add_triple("ex:a", "name", "Berlin, Germany");
        cache.add_triple("ex:a", "pop", "3.6M");
        cache.add_triple("ex:b", "name", "Paris");

        assert_eq!(cache.size(), 2);
        let a = cache.instance("ex:a").unwrap();
        assert_eq!(a.values("name").len(), 2);
        assert!(a.values("missing").is_empty());
        assert_eq!(cache.uris().collect::<Vec<_>>(), vec!["ex:a", "ex:b"]);
    }

    #[test]
    fn add_instance_merges_same_uri() {
        let mut first = Instance::new("ex:a");
        first.add_property("name", "A");
        let mut second = Instance::new("ex:a");
        second.add_property("name", "Alpha");
        second.add_property("label", "a");

        let cache: Cache = [first, second].into_iter().collect();
        assert_eq!(cache.size(), 1);
        let a = cache.instance("ex:a").unwrap();
        assert_eq!(a.values("name").len(), 2);
        assert_eq!(a.property_names().collect::<Vec<_>>(), vec!["label", "name"]);
    }

    #[test]
    fn loads_json_array() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("source.json");
        fs::write(
            &path,
            r#"[{"uri": "ex:a", "properties": {"name": ["Berlin"]}}, {"uri": "ex:b"}]"#,
        )
        .unwrap();
        let cache = Cache::from_json_path(&path).unwrap();
        assert_eq!(cache.size(), 2);
        assert!(cache.contains_uri("ex:b"));
        assert!(cache.instance("ex:b").unwrap().properties.is_empty());
    }
}
