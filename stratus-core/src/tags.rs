//! Resource tags
//!
//! Tags flow through three filters on their way to and from the API: provider
//! default tags are merged under the resource's own tags on write, and the
//! `aws:` system tags plus any configured ignore rules are dropped on read.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::resource::Value;

const AWS_TAG_PREFIX: &str = "aws:";

/// Tags to leave out of state, as configured on the provider
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IgnoreTagsConfig {
    pub keys: Vec<String>,
    pub key_prefixes: Vec<String>,
}

impl IgnoreTagsConfig {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty() && self.key_prefixes.is_empty()
    }

    fn ignores(&self, key: &str) -> bool {
        self.keys.iter().any(|k| k == key) || self.key_prefixes.iter().any(|p| key.starts_with(p))
    }
}

/// Ordered key/value tag set
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KeyValueTags(BTreeMap<String, String>);

impl KeyValueTags {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Drop the reserved `aws:` tags
    pub fn ignore_aws(self) -> Self {
        Self(
            self.0
                .into_iter()
                .filter(|(k, _)| !k.starts_with(AWS_TAG_PREFIX))
                .collect(),
        )
    }

    /// Drop the tags matched by `config`
    pub fn ignore_config(self, config: &IgnoreTagsConfig) -> Self {
        if config.is_empty() {
            return self;
        }
        Self(self.0.into_iter().filter(|(k, _)| !config.ignores(k)).collect())
    }

    /// The tags `ignore_aws` and `ignore_config` drop. Updates that replace the
    /// whole tag set send these back unchanged.
    pub fn unmanaged(&self, config: &IgnoreTagsConfig) -> Self {
        Self(
            self.0
                .iter()
                .filter(|(k, _)| k.starts_with(AWS_TAG_PREFIX) || config.ignores(k))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )
    }

    /// Overlay `other`; its values win on conflict
    pub fn extend(&mut self, other: &KeyValueTags) {
        for (k, v) in other.iter() {
            self.insert(k, v);
        }
    }

    /// Tags from a `Value::Map` of strings. Non-string values are skipped.
    pub fn from_value(value: &Value) -> Self {
        let mut tags = Self::new();
        if let Value::Map(map) = value {
            for (k, v) in map {
                if let Value::String(s) = v {
                    tags.insert(k.clone(), s.clone());
                }
            }
        }
        tags
    }

    pub fn to_value(&self) -> Value {
        Value::Map(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), Value::String(v.clone())))
                .collect::<HashMap<_, _>>(),
        )
    }

    /// Tags from the API's `[{"Key": .., "Value": ..}]` list form
    pub fn from_aws_list(list: &[serde_json::Value]) -> Self {
        let mut tags = Self::new();
        for tag in list {
            if let (Some(key), Some(value)) = (
                tag.get("Key").and_then(|v| v.as_str()),
                tag.get("Value").and_then(|v| v.as_str()),
            ) {
                tags.insert(key, value);
            }
        }
        tags
    }

    pub fn to_aws_list(&self) -> Vec<serde_json::Value> {
        self.0
            .iter()
            .map(|(k, v)| json!({"Key": k, "Value": v}))
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<BTreeMap<String, String>> for KeyValueTags {
    fn from(map: BTreeMap<String, String>) -> Self {
        Self(map)
    }
}

impl From<HashMap<String, String>> for KeyValueTags {
    fn from(map: HashMap<String, String>) -> Self {
        Self(map.into_iter().collect())
    }
}

/// Provider default tags overlaid with the resource's tags
pub fn merge_default_tags(defaults: &KeyValueTags, resource: &KeyValueTags) -> KeyValueTags {
    let mut merged = defaults.clone();
    merged.extend(resource);
    merged
}
