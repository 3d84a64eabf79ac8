//! Plan display

use std::collections::{HashMap, HashSet};

use colored::Colorize;
use similar::{ChangeTag, TextDiff};
use stratus_core::effect::Effect;
use stratus_core::plan::Plan;
use stratus_core::resource::{Resource, State, Value};
use stratus_core::schema::ResourceSchema;

const KNOWN_AFTER_APPLY: &str = "(known after apply)";
const SENSITIVE: &str = "(sensitive)";

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if plan.mutation_count() == 0 {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        match effect {
            Effect::Read(_) => {}
            Effect::Create(r) => {
                println!("  {} {}", "+".green().bold(), r.id.to_string().cyan().bold());
                print_attributes(r, schema);
            }
            Effect::Update {
                id,
                from,
                to,
                changed_attributes,
            } => {
                println!("  {} {}", "~".yellow().bold(), id.to_string().cyan().bold());
                print_changes(from, to, changed_attributes, schema, &HashSet::new());
            }
            Effect::Replace {
                id,
                from,
                to,
                changed_attributes,
            } => {
                println!(
                    "  {} {}",
                    "-/+".magenta().bold(),
                    id.to_string().cyan().bold()
                );
                let force_new = schema
                    .map(ResourceSchema::force_new_attributes)
                    .unwrap_or_default();
                print_changes(from, to, changed_attributes, schema, &force_new);
            }
            Effect::Delete { id, identifier, .. } => {
                println!("  {} {}", "-".red().bold(), id.to_string().cyan().bold());
                println!("      {}: {}", "identifier".bold(), identifier.red());
            }
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to add, {} to change, {} to replace, {} to destroy.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

fn print_attributes(resource: &Resource, schema: Option<&ResourceSchema>) {
    let mut keys: Vec<&String> = resource
        .attributes
        .keys()
        .filter(|k| !k.starts_with('_'))
        .collect();
    keys.sort();
    for key in keys {
        let value = display_value(&resource.attributes[key], is_sensitive(schema, key));
        println!("      {}: {}", key, value.green());
    }
}

fn print_changes(
    from: &State,
    to: &Resource,
    changed: &[String],
    schema: Option<&ResourceSchema>,
    force_new: &HashSet<&str>,
) {
    for key in changed {
        let sensitive = is_sensitive(schema, key);
        let old = from
            .attributes
            .get(key)
            .map(|v| display_value(v, sensitive))
            .unwrap_or_else(|| "(none)".to_string());
        let new = to
            .attributes
            .get(key)
            .map(|v| display_value(v, sensitive))
            .unwrap_or_else(|| "(none)".to_string());
        let marker = if force_new.contains(key.as_str()) {
            format!(" {}", "# forces replacement".magenta())
        } else {
            String::new()
        };

        if old.contains('\n') || new.contains('\n') {
            println!("      {}:{}", key, marker);
            for (tag, line) in line_diff(&old, &new) {
                match tag {
                    ChangeTag::Delete => println!("        {} {}", "-".red(), line.red()),
                    ChangeTag::Insert => println!("        {} {}", "+".green(), line.green()),
                    ChangeTag::Equal => println!("          {}", line),
                }
            }
        } else {
            println!("      {}: {} → {}{}", key, old.red(), new.green(), marker);
        }
    }
}

fn is_sensitive(schema: Option<&ResourceSchema>, key: &str) -> bool {
    schema
        .and_then(|s| s.attributes.get(key))
        .is_some_and(|a| a.sensitive)
}

/// Lines of `old` and `new`, tagged by how they changed
pub fn line_diff(old: &str, new: &str) -> Vec<(ChangeTag, String)> {
    TextDiff::from_lines(old, new)
        .iter_all_changes()
        .map(|change| {
            (
                change.tag(),
                change.value().trim_end_matches('\n').to_string(),
            )
        })
        .collect()
}

/// Render a value for the plan. JSON documents are pretty-printed so that
/// changes inside them diff line by line.
pub fn display_value(value: &Value, sensitive: bool) -> String {
    if sensitive {
        return SENSITIVE.to_string();
    }
    match value {
        Value::String(s) => match serde_json::from_str::<serde_json::Value>(s) {
            Ok(json @ (serde_json::Value::Object(_) | serde_json::Value::Array(_))) => {
                serde_json::to_string_pretty(&json).unwrap_or_else(|_| s.clone())
            }
            _ => format!("\"{}\"", s),
        },
        Value::Int(i) => i.to_string(),
        Value::Float(f) => f.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(|v| display_value(v, false)).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let entries: Vec<String> = entries
                .into_iter()
                .map(|(k, v)| format!("{}: {}", k, display_value(v, false)))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::ResourceRef(_, _) => KNOWN_AFTER_APPLY.to_string(),
    }
}

/// One-line description of an effect for progress output
pub fn format_effect(effect: &Effect) -> String {
    match effect {
        Effect::Read(r) => format!("Read {}", r.id),
        Effect::Create(r) => format!("Create {}", r.id),
        Effect::Update { id, .. } => format!("Update {}", id),
        Effect::Replace { id, .. } => format!("Replace {}", id),
        Effect::Delete { id, .. } => format!("Delete {}", id),
    }
}
