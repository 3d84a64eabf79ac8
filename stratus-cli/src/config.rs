//! Configuration file
//!
//! A JSON document with a `provider` block, managed `resources` and `data`
//! sources. String values of the form `${name.attribute}` reference another
//! block's attribute and are resolved before each provider call.

use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;

use serde::Deserialize;
use stratus_core::config::ProviderConfig;
use stratus_core::resource::{Resource, Value};

#[derive(Debug, Deserialize)]
struct ConfigFile {
    #[serde(default)]
    provider: serde_json::Value,
    #[serde(default)]
    resources: Vec<Block>,
    #[serde(default)]
    data: Vec<Block>,
}

#[derive(Debug, Deserialize)]
struct Block {
    #[serde(rename = "type")]
    resource_type: String,
    name: String,
    #[serde(default)]
    attributes: serde_json::Map<String, serde_json::Value>,
}

/// A parsed configuration. `resources` holds managed resources and data
/// sources (`read_only`) together, ordered so every block follows the blocks
/// it references.
#[derive(Debug)]
pub struct Configuration {
    pub provider: ProviderConfig,
    pub resources: Vec<Resource>,
}

impl Configuration {
    pub fn managed(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| !r.is_data_source())
    }

    pub fn data_sources(&self) -> impl Iterator<Item = &Resource> {
        self.resources.iter().filter(|r| r.is_data_source())
    }
}

pub fn load(path: &Path) -> Result<Configuration, String> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
    parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
}

pub fn parse(content: &str) -> Result<Configuration, String> {
    let file: ConfigFile =
        serde_json::from_str(content).map_err(|e| format!("Parse error: {}", e))?;

    let provider = if file.provider.is_null() {
        ProviderConfig::default()
    } else {
        ProviderConfig::from_json(&file.provider).map_err(|e| e.to_string())?
    };
    let provider = provider.with_env_overrides().map_err(|e| e.to_string())?;

    let mut names = HashSet::new();
    let mut resources = Vec::new();
    let blocks = file
        .resources
        .into_iter()
        .map(|b| (b, false))
        .chain(file.data.into_iter().map(|b| (b, true)));
    for (block, read_only) in blocks {
        if !names.insert(block.name.clone()) {
            return Err(format!("Duplicate name '{}'", block.name));
        }
        let mut resource = Resource::new(block.resource_type, block.name).with_read_only(read_only);
        for (key, json) in &block.attributes {
            if let Some(value) = from_json(json) {
                resource.attributes.insert(key.clone(), value);
            }
        }
        resources.push(resource);
    }

    Ok(Configuration {
        provider,
        resources: sort_by_dependencies(&resources)?,
    })
}

/// Like [`Value::from_json`], turning `${name.attribute}` strings into references
fn from_json(json: &serde_json::Value) -> Option<Value> {
    match json {
        serde_json::Value::String(s) => Some(match parse_reference(s) {
            Some((name, attr)) => Value::ResourceRef(name.to_string(), attr.to_string()),
            None => Value::String(s.clone()),
        }),
        serde_json::Value::Array(items) => {
            Some(Value::List(items.iter().filter_map(from_json).collect()))
        }
        serde_json::Value::Object(map) => Some(Value::Map(
            map.iter()
                .filter_map(|(k, v)| from_json(v).map(|v| (k.clone(), v)))
                .collect(),
        )),
        other => Value::from_json(other),
    }
}

pub fn parse_reference(s: &str) -> Option<(&str, &str)> {
    let inner = s.strip_prefix("${")?.strip_suffix('}')?;
    let (name, attr) = inner.split_once('.')?;
    let valid = |part: &str| {
        !part.is_empty()
            && part
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    };
    (valid(name) && valid(attr)).then_some((name, attr))
}

/// Names of the blocks a resource references
pub fn dependencies(resource: &Resource) -> HashSet<String> {
    let mut deps = HashSet::new();
    for value in resource.attributes.values() {
        collect_dependencies(value, &mut deps);
    }
    deps
}

fn collect_dependencies(value: &Value, deps: &mut HashSet<String>) {
    match value {
        Value::ResourceRef(name, _) => {
            deps.insert(name.clone());
        }
        Value::List(items) => {
            for item in items {
                collect_dependencies(item, deps);
            }
        }
        Value::Map(map) => {
            for v in map.values() {
                collect_dependencies(v, deps);
            }
        }
        _ => {}
    }
}

/// Order resources so that each one follows everything it references.
/// Unknown names and cycles are errors.
pub fn sort_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, String> {
    let by_name: HashMap<&str, &Resource> =
        resources.iter().map(|r| (r.id.name.as_str(), r)).collect();

    fn visit<'a>(
        resource: &'a Resource,
        by_name: &HashMap<&str, &'a Resource>,
        visited: &mut HashSet<&'a str>,
        visiting: &mut Vec<&'a str>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), String> {
        let name = resource.id.name.as_str();
        if visited.contains(name) {
            return Ok(());
        }
        if visiting.contains(&name) {
            let mut cycle: Vec<&str> = visiting.clone();
            cycle.push(name);
            return Err(format!("Dependency cycle: {}", cycle.join(" -> ")));
        }
        visiting.push(name);

        let mut deps: Vec<String> = dependencies(resource).into_iter().collect();
        deps.sort();
        for dep in deps {
            let target = by_name.get(dep.as_str()).copied().ok_or_else(|| {
                format!("{}: reference to unknown name '{}'", resource.id, dep)
            })?;
            visit(target, by_name, visited, visiting, sorted)?;
        }

        visiting.pop();
        visited.insert(name);
        sorted.push(resource.clone());
        Ok(())
    }

    let mut sorted = Vec::new();
    let mut visited = HashSet::new();
    let mut visiting = Vec::new();
    for resource in resources {
        visit(resource, &by_name, &mut visited, &mut visiting, &mut sorted)?;
    }
    Ok(sorted)
}

/// Known attributes of every block, by name
#[derive(Debug, Default)]
pub struct Bindings(HashMap<String, HashMap<String, Value>>);

impl Bindings {
    /// Record attributes for `name`. Values already known are kept unless
    /// `overwrite` is set.
    pub fn record(&mut self, name: &str, attributes: &HashMap<String, Value>, overwrite: bool) {
        let entry = self.0.entry(name.to_string()).or_default();
        for (k, v) in attributes {
            if overwrite || !entry.contains_key(k) {
                entry.insert(k.clone(), v.clone());
            }
        }
    }

    pub fn resolve(&self, value: &Value) -> Value {
        match value {
            Value::ResourceRef(name, attr) => match self.0.get(name).and_then(|a| a.get(attr)) {
                Some(v) => self.resolve(v),
                None => value.clone(),
            },
            Value::List(items) => Value::List(items.iter().map(|v| self.resolve(v)).collect()),
            Value::Map(map) => Value::Map(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.resolve(v)))
                    .collect(),
            ),
            _ => value.clone(),
        }
    }

    pub fn resolve_resource(&self, resource: &Resource) -> Resource {
        let mut resolved = resource.clone();
        resolved.attributes = resource
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), self.resolve(v)))
            .collect();
        resolved
    }
}

/// First reference left in a resolved resource, as `${name.attribute}`
pub fn unresolved(resource: &Resource) -> Option<String> {
    fn find(value: &Value) -> Option<String> {
        match value {
            Value::ResourceRef(name, attr) => Some(format!("${{{}.{}}}", name, attr)),
            Value::List(items) => items.iter().find_map(find),
            Value::Map(map) => map.values().find_map(find),
            _ => None,
        }
    }
    let mut keys: Vec<&String> = resource.attributes.keys().collect();
    keys.sort();
    keys.into_iter().find_map(|k| find(&resource.attributes[k]))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"{
        "provider": {"region": "us-east-1", "default_tags": {"Env": "dev"}},
        "resources": [
            {"type": "ec2_subnet", "name": "a", "attributes": {
                "vpc_id": "${main.id}", "cidr_block": "10.0.1.0/24"}},
            {"type": "ec2_vpc", "name": "main", "attributes": {
                "cidr_block": "10.0.0.0/16", "enable_dns_hostnames": true}}
        ],
        "data": [{"type": "ec2_vpc", "name": "default", "attributes": {"id": "vpc-123"}}]
    }"#;

    #[test]
    fn parses_blocks_and_orders_by_reference() {
        let config = parse(CONFIG).unwrap();
        assert_eq!(config.provider.default_tags.get("Env").map(String::as_str), Some("dev"));
        let names: Vec<&str> = config.resources.iter().map(|r| r.id.name.as_str()).collect();
        assert_eq!(names, vec!["main", "a", "default"]);
        assert_eq!(
            config.resources[1].attributes.get("vpc_id"),
            Some(&Value::ResourceRef("main".to_string(), "id".to_string()))
        );
        assert_eq!(config.data_sources().count(), 1);
        assert_eq!(config.managed().count(), 2);
    }

    #[test]
    fn references_need_a_name_and_attribute() {
        assert_eq!(parse_reference("${main.id}"), Some(("main", "id")));
        assert_eq!(parse_reference("${main}"), None);
        assert_eq!(parse_reference("prefix-${main.id}"), None);
        assert_eq!(parse_reference("10.0.0.0/16"), None);
    }

    #[test]
    fn cycles_and_unknown_names_are_rejected() {
        let a = Resource::new("t", "a")
            .with_attribute("x", Value::ResourceRef("b".to_string(), "id".to_string()));
        let b = Resource::new("t", "b")
            .with_attribute("x", Value::ResourceRef("a".to_string(), "id".to_string()));
        let err = sort_by_dependencies(&[a.clone(), b]).unwrap_err();
        assert!(err.contains("a -> b -> a"), "{}", err);

        let err = sort_by_dependencies(&[a]).unwrap_err();
        assert!(err.contains("unknown name 'b'"));
    }

    #[test]
    fn duplicate_names_are_rejected() {
        let err = parse(
            r#"{"resources": [{"type": "ec2_vpc", "name": "x"}],
                "data": [{"type": "ec2_vpc", "name": "x"}]}"#,
        )
        .unwrap_err();
        assert!(err.contains("Duplicate name 'x'"));
    }

    #[test]
    fn bindings_resolve_nested_references() {
        let mut bindings = Bindings::default();
        let mut vpc = HashMap::new();
        vpc.insert("id".to_string(), Value::String("vpc-1".to_string()));
        bindings.record("main", &vpc, false);

        let subnet = Resource::new("ec2_subnet", "a")
            .with_attribute("vpc_id", Value::ResourceRef("main".to_string(), "id".to_string()))
            .with_attribute(
                "ids",
                Value::List(vec![Value::ResourceRef("main".to_string(), "arn".to_string())]),
            );
        let resolved = bindings.resolve_resource(&subnet);
        assert_eq!(
            resolved.attributes.get("vpc_id"),
            Some(&Value::String("vpc-1".to_string()))
        );
        assert_eq!(unresolved(&resolved), Some("${main.arn}".to_string()));
    }
}
