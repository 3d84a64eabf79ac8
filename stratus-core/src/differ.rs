//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the desired state from the host configuration with the current
//! state read through the Provider, and produces the Effects needed to
//! converge. Attributes the configuration leaves out are not drift: they are
//! either computed or left to the cloud's default.

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::{AttributeType, ResourceSchema, enum_variant, types};
use crate::timeouts::Timeouts;

/// Result of a diff operation
#[derive(Debug, Clone, PartialEq)]
pub enum Diff {
    /// Resource does not exist -> needs creation
    Create(Resource),
    /// Resource exists with differences -> needs update
    Update {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// A force-new attribute changed -> delete and recreate
    Replace {
        id: ResourceId,
        from: State,
        to: Resource,
        changed_attributes: Vec<String>,
    },
    /// Resource exists with no differences -> no action needed
    NoChange(ResourceId),
}

impl Diff {
    /// Returns whether this Diff involves a change
    pub fn is_change(&self) -> bool {
        !matches!(self, Diff::NoChange(_))
    }
}

/// Compare desired state with current state to compute a Diff
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);
    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let force_new: HashSet<&str> = schema
        .map(ResourceSchema::force_new_attributes)
        .unwrap_or_default();
    let replace = changed.iter().any(|name| force_new.contains(name.as_str()));

    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired.clone(),
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state, sorted by name
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') || key == Timeouts::ATTRIBUTE {
            continue;
        }

        let attr_type = schema
            .and_then(|s| s.attributes.get(key))
            .map(|a| &a.attr_type);
        match current.get(key) {
            Some(current_value) if values_equal(desired_value, current_value, attr_type) => {}
            _ => changed.push(key.clone()),
        }
    }

    changed.sort();
    changed
}

/// Type-aware equality: sets ignore order, enums ignore a `Type.` prefix and
/// nested blocks only compare the fields the configuration sets.
fn values_equal(desired: &Value, current: &Value, attr_type: Option<&AttributeType>) -> bool {
    match (attr_type, desired, current) {
        (Some(AttributeType::Custom { name, .. }), Value::String(d), Value::String(c))
            if name == types::JSON_DOCUMENT =>
        {
            json_equal(d, c)
        }
        (Some(AttributeType::Custom { base, .. }), _, _) => {
            values_equal(desired, current, Some(base))
        }
        (Some(AttributeType::Enum(variants)), Value::String(d), Value::String(c)) => {
            enum_variant(d, variants) == enum_variant(c, variants)
        }
        (Some(AttributeType::Set(inner)), Value::List(d), Value::List(c)) => {
            d.len() == c.len()
                && d.iter()
                    .all(|dv| c.iter().any(|cv| values_equal(dv, cv, Some(inner))))
        }
        (Some(AttributeType::List(inner)), Value::List(d), Value::List(c)) => {
            d.len() == c.len()
                && d.iter()
                    .zip(c)
                    .all(|(dv, cv)| values_equal(dv, cv, Some(inner)))
        }
        (Some(AttributeType::Block(fields)), Value::Map(d), Value::Map(c)) => {
            d.iter().all(|(k, dv)| {
                let field = fields.iter().find(|f| &f.name == k).map(|f| &f.attr_type);
                c.get(k).is_some_and(|cv| values_equal(dv, cv, field))
            })
        }
        (_, Value::Int(d), Value::Float(c)) | (_, Value::Float(c), Value::Int(d)) => {
            (*d as f64) == *c
        }
        _ => desired == current,
    }
}

fn json_equal(a: &str, b: &str) -> bool {
    match (
        serde_json::from_str::<serde_json::Value>(a),
        serde_json::from_str::<serde_json::Value>(b),
    ) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// Compute Diffs for every desired resource and generate a Plan.
///
/// Data sources become `Read` effects. Resources present in `current_states`
/// but absent from `desired` are deleted.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read(resource.clone()));
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));
        let schema = schemas.get(&resource.id.resource_type);

        match diff(resource, &current, schema) {
            Diff::Create(r) => plan.add(Effect::Create(r)),
            Diff::Update {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => plan.add(Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            }),
            Diff::NoChange(_) => {}
        }
    }

    let desired_ids: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !desired_ids.contains(&s.id))
        .collect();
    orphans.sort_by(|a, b| a.id.cmp(&b.id));
    for state in orphans {
        plan.add(Effect::delete_state(state));
    }

    plan
}
