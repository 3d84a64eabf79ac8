//! Conversion between attribute values and Cloud Control properties
//!
//! Attributes are snake_case; Cloud Control properties are PascalCase. An
//! attribute's `provider_name` wins over the derived name.

use std::collections::HashMap;

use heck::{ToSnakeCase, ToUpperCamelCase};
use serde_json::{Map, Value as Json};
use stratus_core::resource::{State, Value};
use stratus_core::schema::{AttributeSchema, AttributeType, ResourceSchema, enum_variant, types};
use stratus_core::tags::KeyValueTags;
use stratus_core::timeouts::Timeouts;

/// Attribute holding the configured tags
pub const TAGS: &str = "tags";
/// Computed attribute holding every tag on the object, default tags included
pub const TAGS_ALL: &str = "tags_all";
/// Property carrying tags in Cloud Control
pub const TAGS_PROPERTY: &str = "Tags";
/// Computed attribute holding the Cloud Control identifier
pub const ID: &str = "id";

pub fn wire_name(attr: &AttributeSchema) -> String {
    attr.provider_name
        .clone()
        .unwrap_or_else(|| attr.name.to_upper_camel_case())
}

/// Attributes that are never sent as properties
fn is_engine_attribute(name: &str) -> bool {
    name.starts_with('_') || matches!(name, ID | TAGS | TAGS_ALL | Timeouts::ATTRIBUTE)
}

pub fn value_to_json(value: &Value, attr_type: &AttributeType) -> Option<Json> {
    match (attr_type, value) {
        (AttributeType::Custom { name, .. }, Value::String(s)) if name == types::JSON_DOCUMENT => {
            Some(serde_json::from_str(s).unwrap_or_else(|_| Json::String(s.clone())))
        }
        (AttributeType::Custom { base, .. }, v) => value_to_json(v, base),
        (AttributeType::Enum(variants), Value::String(s)) => {
            Some(Json::String(enum_variant(s, variants).to_string()))
        }
        (AttributeType::List(inner) | AttributeType::Set(inner), Value::List(items)) => Some(
            Json::Array(items.iter().filter_map(|v| value_to_json(v, inner)).collect()),
        ),
        (AttributeType::Map(inner), Value::Map(map)) => {
            let mut obj = Map::new();
            for (k, v) in map {
                if let Some(v) = value_to_json(v, inner) {
                    obj.insert(k.clone(), v);
                }
            }
            Some(Json::Object(obj))
        }
        (AttributeType::Block(fields), Value::Map(map)) => {
            let mut obj = Map::new();
            for (k, v) in map {
                let field = fields.iter().find(|f| &f.name == k);
                let key = field.map(wire_name).unwrap_or_else(|| k.to_upper_camel_case());
                let converted = match field {
                    Some(f) => value_to_json(v, &f.attr_type),
                    None => v.to_json(),
                };
                if let Some(v) = converted {
                    obj.insert(key, v);
                }
            }
            Some(Json::Object(obj))
        }
        (_, v) => v.to_json(),
    }
}

pub fn json_to_value(json: &Json, attr_type: &AttributeType) -> Option<Value> {
    match (attr_type, json) {
        (AttributeType::Custom { name, .. }, Json::Object(_) | Json::Array(_))
            if name == types::JSON_DOCUMENT =>
        {
            serde_json::to_string(json).ok().map(Value::String)
        }
        (AttributeType::Custom { base, .. }, j) => json_to_value(j, base),
        (AttributeType::List(inner) | AttributeType::Set(inner), Json::Array(items)) => Some(
            Value::List(items.iter().filter_map(|j| json_to_value(j, inner)).collect()),
        ),
        (AttributeType::Map(inner), Json::Object(obj)) => Some(Value::Map(
            obj.iter()
                .filter_map(|(k, j)| json_to_value(j, inner).map(|v| (k.clone(), v)))
                .collect(),
        )),
        (AttributeType::Block(fields), Json::Object(obj)) => {
            let mut map = HashMap::new();
            for (key, j) in obj {
                let field = fields.iter().find(|f| wire_name(f) == *key);
                let name = field.map(|f| f.name.clone()).unwrap_or_else(|| key.to_snake_case());
                let converted = match field {
                    Some(f) => json_to_value(j, &f.attr_type),
                    None => Value::from_json(j),
                };
                if let Some(v) = converted {
                    map.insert(name, v);
                }
            }
            Some(Value::Map(map))
        }
        (_, j) => Value::from_json(j),
    }
}

/// Properties for the configurable attributes in `attributes`. Tags are left
/// to the caller.
pub fn to_properties(schema: &ResourceSchema, attributes: &HashMap<String, Value>) -> Map<String, Json> {
    let mut props = Map::new();
    for (name, value) in attributes {
        if is_engine_attribute(name) {
            continue;
        }
        let Some(attr) = schema.attributes.get(name) else {
            continue;
        };
        if attr.is_computed_only() {
            continue;
        }
        if let Some(json) = value_to_json(value, &attr.attr_type) {
            props.insert(wire_name(attr), json);
        }
    }
    props
}

/// Attributes for every schema attribute present in `properties`
pub fn from_properties(schema: &ResourceSchema, properties: &Json) -> HashMap<String, Value> {
    let mut attrs = HashMap::new();
    for attr in schema.attributes.values() {
        if is_engine_attribute(&attr.name) {
            continue;
        }
        if let Some(value) = properties
            .get(wire_name(attr))
            .and_then(|j| json_to_value(j, &attr.attr_type))
        {
            attrs.insert(attr.name.clone(), value);
        }
    }
    attrs
}

/// Tags that belong in the `tags` attribute: everything on the object except
/// default tags carrying their default value. Keys in `declared` are kept even
/// when they match a default.
pub fn resource_tags(
    all: &KeyValueTags,
    defaults: &KeyValueTags,
    declared: &KeyValueTags,
) -> KeyValueTags {
    let mut tags = KeyValueTags::new();
    for (k, v) in all.iter() {
        if defaults.get(k) != Some(v) || declared.get(k).is_some() {
            tags.insert(k, v);
        }
    }
    tags
}

/// Reconcile a state read from the API with the attributes last applied to it.
///
/// Write-only attributes keep their applied values and `tags` keeps the
/// default-valued tags the configuration declares itself.
pub fn settle(
    schema: &ResourceSchema,
    defaults: &KeyValueTags,
    mut state: State,
    applied: &HashMap<String, Value>,
) -> State {
    if !state.exists {
        return state;
    }
    schema.carry_write_only(applied, &mut state.attributes);
    if let Some(all) = state.attributes.get(TAGS_ALL) {
        let declared = applied
            .get(TAGS)
            .map(KeyValueTags::from_value)
            .unwrap_or_default();
        let own = resource_tags(&KeyValueTags::from_value(all), defaults, &declared);
        state.attributes.insert(TAGS.to_string(), own.to_value());
    }
    state
}
