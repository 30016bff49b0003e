//! Plan and state rendering

use std::collections::HashMap;

use colored::Colorize;

use keel_core::effect::Effect;
use keel_core::plan::Plan;
use keel_core::resource::{Resource, State, Value};
use keel_core::schema::ResourceSchema;

const SENSITIVE: &str = "(sensitive)";

pub fn print_plan(plan: &Plan, schemas: &HashMap<String, ResourceSchema>) {
    if !plan.has_changes() {
        println!("{}", "No changes. Infrastructure is up-to-date.".green());
        return;
    }

    println!("{}", "Execution Plan:".cyan().bold());
    println!();

    for effect in plan.effects() {
        let schema = schemas.get(&effect.resource_id().resource_type);
        let colored_symbol = match effect {
            Effect::Read { .. } => effect.symbol().normal(),
            Effect::Create(_) => effect.symbol().green().bold(),
            Effect::Update { .. } => effect.symbol().yellow().bold(),
            Effect::Replace { .. } => effect.symbol().magenta().bold(),
            Effect::Delete { .. } => effect.symbol().red().bold(),
        };
        println!(
            "  {} {}",
            colored_symbol,
            effect.resource_id().to_string().cyan().bold()
        );

        for line in effect_lines(effect, schema) {
            println!("      {}", line);
        }
    }

    println!();
    let summary = plan.summary();
    println!(
        "Plan: {} to create, {} to update, {} to replace, {} to delete.",
        summary.create.to_string().green(),
        summary.update.to_string().yellow(),
        summary.replace.to_string().magenta(),
        summary.delete.to_string().red()
    );
}

/// Attribute lines shown under an effect
pub fn effect_lines(effect: &Effect, schema: Option<&ResourceSchema>) -> Vec<String> {
    match effect {
        Effect::Read { resource } | Effect::Create(resource) => sorted_keys(&resource.attributes)
            .into_iter()
            .map(|key| {
                format!(
                    "{}: {}",
                    key,
                    display_value(key, &resource.attributes[key], schema)
                )
            })
            .collect(),
        Effect::Update {
            from,
            to,
            changed_attributes,
            ..
        }
        | Effect::Replace {
            from,
            to,
            changed_attributes,
            ..
        } => {
            let force_new = schema.map(|s| s.force_new_attributes()).unwrap_or_default();
            changed_attributes
                .iter()
                .map(|key| change_line(key, from, to, schema, force_new.contains(&key.as_str())))
                .collect()
        }
        Effect::Delete { from, .. } => from
            .identifier
            .iter()
            .map(|identifier| format!("id: {}", identifier))
            .collect(),
    }
}

fn change_line(
    key: &str,
    from: &State,
    to: &Resource,
    schema: Option<&ResourceSchema>,
    forces_replacement: bool,
) -> String {
    let old = from
        .attributes
        .get(key)
        .map(|v| display_value(key, v, schema))
        .unwrap_or_else(|| "(none)".to_string());
    let new = to
        .attributes
        .get(key)
        .map(|v| display_value(key, v, schema))
        .unwrap_or_else(|| "(none)".to_string());
    let line = format!("{}: {} → {}", key, old, new);
    if forces_replacement {
        format!("{} # forces replacement", line)
    } else {
        line
    }
}

/// `name` first, then alphabetical
fn sorted_keys(attributes: &HashMap<String, Value>) -> Vec<&String> {
    let mut keys: Vec<_> = attributes.keys().filter(|k| !k.starts_with('_')).collect();
    keys.sort_by(|a, b| match (a.as_str(), b.as_str()) {
        ("name", _) => std::cmp::Ordering::Less,
        (_, "name") => std::cmp::Ordering::Greater,
        _ => a.cmp(b),
    });
    keys
}

fn display_value(key: &str, value: &Value, schema: Option<&ResourceSchema>) -> String {
    if schema.is_some_and(|s| s.is_sensitive(key)) {
        return SENSITIVE.to_string();
    }
    format_value(value)
}

pub fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => format!("\"{}\"", s),
        Value::Int(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::List(items) => {
            let strs: Vec<_> = items.iter().map(format_value).collect();
            format!("[{}]", strs.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let strs: Vec<_> = entries
                .iter()
                .map(|(k, v)| format!("{}: {}", k, format_value(v)))
                .collect();
            format!("{{{}}}", strs.join(", "))
        }
        Value::ResourceRef(binding, attr) => format!("{}.{} (known after apply)", binding, attr),
    }
}

/// Attributes of a state, sensitive ones masked
pub fn print_state(state: &State, schema: Option<&ResourceSchema>) {
    println!("{}", state.id.to_string().cyan().bold());
    if let Some(identifier) = &state.identifier {
        println!("  {}: {}", "id".bold(), identifier);
    }
    for key in sorted_keys(&state.attributes) {
        println!(
            "  {}: {}",
            key,
            display_value(key, &state.attributes[key], schema)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keel_core::resource::ResourceId;
    use keel_core::schema::{AttributeSchema, AttributeType};

    fn schema() -> ResourceSchema {
        ResourceSchema::new("aws_iam_role")
            .attribute(AttributeSchema::new("name", AttributeType::String).force_new())
            .attribute(AttributeSchema::new("description", AttributeType::String))
            .attribute(AttributeSchema::new("secret", AttributeType::String).sensitive())
    }

    #[test]
    fn format_nested_values() {
        let mut map = HashMap::new();
        map.insert("b".to_string(), Value::Int(2));
        map.insert("a".to_string(), Value::from("x"));
        let value = Value::List(vec![Value::Map(map), Value::Bool(true)]);
        assert_eq!(format_value(&value), "[{a: \"x\", b: 2}, true]");
        assert_eq!(
            format_value(&Value::ResourceRef(
                "aws_iam_role.r".to_string(),
                "arn".to_string()
            )),
            "aws_iam_role.r.arn (known after apply)"
        );
    }

    #[test]
    fn create_lists_name_first_and_masks_secrets() {
        let resource = Resource::new("aws_iam_role", "r")
            .with_attribute("secret", "hunter2")
            .with_attribute("description", "d")
            .with_attribute("name", "test-role");
        let lines = effect_lines(&Effect::Create(resource), Some(&schema()));
        assert_eq!(
            lines,
            vec![
                "name: \"test-role\"",
                "description: \"d\"",
                "secret: (sensitive)",
            ]
        );
    }

    #[test]
    fn replace_marks_force_new_attributes() {
        let id = ResourceId::new("aws_iam_role", "r");
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("old"));
        let effect = Effect::Replace {
            id: id.clone(),
            from: State::existing(id, attrs),
            to: Resource::new("aws_iam_role", "r").with_attribute("name", "new"),
            changed_attributes: vec!["name".to_string()],
        };
        assert_eq!(
            effect_lines(&effect, Some(&schema())),
            vec!["name: \"old\" → \"new\" # forces replacement"]
        );
    }

    #[test]
    fn delete_shows_identifier() {
        let id = ResourceId::new("aws_s3_bucket", "b");
        let effect = Effect::Delete {
            id: id.clone(),
            from: State::existing(id, HashMap::new()).with_identifier("my-bucket"),
        };
        assert_eq!(effect_lines(&effect, None), vec!["id: my-bucket"]);
    }
}
