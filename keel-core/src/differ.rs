//! Differ - Compare desired state with current state to generate a Plan
//!
//! Compares the "desired state" declared in the manifest with the "current
//! state" fetched from the Provider, and generates the Effects required to
//! converge them (Plan).

use std::collections::{HashMap, HashSet};

use crate::effect::Effect;
use crate::plan::Plan;
use crate::resource::{Resource, ResourceId, State, Value};
use crate::schema::ResourceSchema;

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
    /// A force-new attribute changed -> delete and create again
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
///
/// When a schema is given, defaults are applied to the desired side, computed
/// attributes are ignored, set-typed attributes compare without order and a
/// change to a force-new attribute yields `Replace`.
pub fn diff(desired: &Resource, current: &State, schema: Option<&ResourceSchema>) -> Diff {
    if !current.exists {
        return Diff::Create(desired.clone());
    }

    let desired = match schema {
        Some(schema) => Resource {
            attributes: schema.apply_defaults(&desired.attributes),
            ..desired.clone()
        },
        None => desired.clone(),
    };

    let changed = find_changed_attributes(&desired.attributes, &current.attributes, schema);

    if changed.is_empty() {
        return Diff::NoChange(desired.id.clone());
    }

    let replace = schema.is_some_and(|s| {
        changed
            .iter()
            .any(|name| s.attributes.get(name).is_some_and(|a| a.force_new))
    });

    if replace {
        Diff::Replace {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired,
            changed_attributes: changed,
        }
    } else {
        Diff::Update {
            id: desired.id.clone(),
            from: current.clone(),
            to: desired,
            changed_attributes: changed,
        }
    }
}

/// Find changed attributes between desired and current state
fn find_changed_attributes(
    desired: &HashMap<String, Value>,
    current: &HashMap<String, Value>,
    schema: Option<&ResourceSchema>,
) -> Vec<String> {
    let mut changed = Vec::new();

    for (key, desired_value) in desired {
        // Skip internal attributes (starting with _)
        if key.starts_with('_') {
            continue;
        }
        let attr = schema.and_then(|s| s.attributes.get(key));
        if attr.is_some_and(|a| a.computed) {
            continue;
        }

        // Unresolved references are only known after apply
        if desired_value.has_refs() {
            changed.push(key.clone());
            continue;
        }

        let equal = match (current.get(key), attr) {
            (Some(current_value), Some(attr)) => {
                attr.attr_type.values_equal(desired_value, current_value)
            }
            (Some(current_value), None) => desired_value.semantically_eq(current_value),
            (None, _) => desired_value.is_empty_like(),
        };
        if !equal {
            changed.push(key.clone());
        }
    }

    // Attributes removed from the declaration but still set remotely
    if let Some(schema) = schema {
        for (key, current_value) in current {
            if desired.contains_key(key) || current_value.is_empty_like() {
                continue;
            }
            if schema
                .attributes
                .get(key)
                .is_some_and(|a| !a.computed && a.default.is_none())
            {
                changed.push(key.clone());
            }
        }
    }

    changed.sort();
    changed
}

/// Compute Diff for multiple resources and generate a Plan
///
/// `desired` must already be in dependency order. Resources present in
/// `current_states` but no longer declared are deleted, after everything else.
pub fn create_plan(
    desired: &[Resource],
    current_states: &HashMap<ResourceId, State>,
    schemas: &HashMap<String, ResourceSchema>,
) -> Plan {
    let mut plan = Plan::new();

    for resource in desired {
        if resource.is_data_source() {
            plan.add(Effect::Read {
                resource: resource.clone(),
            });
            continue;
        }

        let current = current_states
            .get(&resource.id)
            .cloned()
            .unwrap_or_else(|| State::not_found(resource.id.clone()));

        let d = diff(
            resource,
            &current,
            schemas.get(&resource.id.resource_type),
        );

        match d {
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

    let declared: HashSet<&ResourceId> = desired.iter().map(|r| &r.id).collect();
    let mut orphans: Vec<&State> = current_states
        .values()
        .filter(|s| s.exists && !declared.contains(&s.id))
        .collect();
    orphans.sort_by(|a, b| b.id.cmp(&a.id));
    for state in orphans.into_iter().filter(|s| s.identifier.is_some()) {
        plan.add(Effect::Delete {
            id: state.id.clone(),
            from: state.clone(),
        });
    }

    plan
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{AttributeSchema, AttributeType};

    fn bucket_schema() -> ResourceSchema {
        ResourceSchema::new("aws_s3_bucket")
            .attribute(
                AttributeSchema::new("bucket", AttributeType::String)
                    .required()
                    .force_new(),
            )
            .attribute(
                AttributeSchema::new("force_destroy", AttributeType::Bool)
                    .with_default(Value::Bool(false)),
            )
            .attribute(AttributeSchema::new("versioning", AttributeType::Bool))
            .attribute(AttributeSchema::new(
                "tags",
                AttributeType::Map(Box::new(AttributeType::String)),
            ))
            .attribute(AttributeSchema::new(
                "security_groups",
                AttributeType::Set(Box::new(AttributeType::String)),
            ))
            .attribute(AttributeSchema::new("arn", AttributeType::String).computed())
    }

    fn existing(attrs: &[(&str, Value)]) -> State {
        let attrs = attrs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        State::existing(ResourceId::new("aws_s3_bucket", "test"), attrs).with_identifier("b")
    }

    #[test]
    fn diff_create_when_not_exists() {
        let desired = Resource::new("aws_s3_bucket", "test");
        let current = State::not_found(ResourceId::new("aws_s3_bucket", "test"));

        let result = diff(&desired, &current, None);
        assert!(matches!(result, Diff::Create(_)));
    }

    #[test]
    fn diff_no_change_when_same() {
        let schema = bucket_schema();
        let desired =
            Resource::new("aws_s3_bucket", "test").with_attribute("bucket", Value::from("b"));
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("force_destroy", Value::Bool(false)),
            ("arn", Value::from("arn:aws:s3:::b")),
        ]);

        let result = diff(&desired, &current, Some(&schema));
        assert!(matches!(result, Diff::NoChange(_)));
    }

    #[test]
    fn diff_update_when_different() {
        let schema = bucket_schema();
        let desired = Resource::new("aws_s3_bucket", "test")
            .with_attribute("bucket", Value::from("b"))
            .with_attribute("versioning", Value::Bool(true));
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("versioning", Value::Bool(false)),
            ("force_destroy", Value::Bool(false)),
        ]);

        match diff(&desired, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["versioning".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn force_new_change_is_replace() {
        let schema = bucket_schema();
        let desired =
            Resource::new("aws_s3_bucket", "test").with_attribute("bucket", Value::from("renamed"));
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("force_destroy", Value::Bool(false)),
        ]);

        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::Replace { .. }
        ));
    }

    #[test]
    fn absent_and_empty_compare_equal() {
        let schema = bucket_schema();
        let desired = Resource::new("aws_s3_bucket", "test")
            .with_attribute("bucket", Value::from("b"))
            .with_attribute("tags", Value::Map(HashMap::new()));
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("force_destroy", Value::Bool(false)),
        ]);

        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn removed_attribute_is_a_change() {
        let schema = bucket_schema();
        let desired =
            Resource::new("aws_s3_bucket", "test").with_attribute("bucket", Value::from("b"));
        let mut tags = HashMap::new();
        tags.insert("env".to_string(), Value::from("test"));
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("force_destroy", Value::Bool(false)),
            ("tags", Value::Map(tags)),
        ]);

        match diff(&desired, &current, Some(&schema)) {
            Diff::Update {
                changed_attributes, ..
            } => assert_eq!(changed_attributes, vec!["tags".to_string()]),
            other => panic!("Expected Update, got {:?}", other),
        }
    }

    #[test]
    fn set_order_is_ignored() {
        let schema = bucket_schema();
        let desired = Resource::new("aws_s3_bucket", "test")
            .with_attribute("bucket", Value::from("b"))
            .with_attribute(
                "security_groups",
                Value::List(vec![Value::from("sg-2"), Value::from("sg-1")]),
            );
        let current = existing(&[
            ("bucket", Value::from("b")),
            ("force_destroy", Value::Bool(false)),
            (
                "security_groups",
                Value::List(vec![Value::from("sg-1"), Value::from("sg-2")]),
            ),
        ]);

        assert!(matches!(
            diff(&desired, &current, Some(&schema)),
            Diff::NoChange(_)
        ));
    }

    #[test]
    fn unresolved_reference_counts_as_change() {
        let desired = Resource::new("aws_s3_bucket", "test").with_attribute(
            "bucket",
            Value::ResourceRef("aws_s3_bucket.other".to_string(), "bucket".to_string()),
        );
        let current = existing(&[("bucket", Value::from("b"))]);
        assert!(diff(&desired, &current, None).is_change());
    }

    #[test]
    fn create_plan_from_resources() {
        let resources = vec![
            Resource::new("aws_s3_bucket", "new-bucket"),
            Resource::new("aws_s3_bucket", "existing-bucket")
                .with_attribute("versioning", Value::Bool(true)),
            Resource::new("aws_efs_mount_target", "lookup").with_read_only(true),
        ];

        let mut current_states = HashMap::new();
        let mut attrs = HashMap::new();
        attrs.insert("versioning".to_string(), Value::Bool(false));
        current_states.insert(
            ResourceId::new("aws_s3_bucket", "existing-bucket"),
            State::existing(ResourceId::new("aws_s3_bucket", "existing-bucket"), attrs),
        );
        current_states.insert(
            ResourceId::new("aws_s3_bucket", "orphan"),
            State::existing(ResourceId::new("aws_s3_bucket", "orphan"), HashMap::new())
                .with_identifier("orphan-bucket"),
        );

        let plan = create_plan(&resources, &current_states, &HashMap::new());

        assert_eq!(plan.effects().len(), 4);
        assert!(matches!(plan.effects()[0], Effect::Create(_)));
        assert!(matches!(plan.effects()[1], Effect::Update { .. }));
        assert!(matches!(plan.effects()[2], Effect::Read { .. }));
        match &plan.effects()[3] {
            Effect::Delete { from, .. } => {
                assert_eq!(from.identifier.as_deref(), Some("orphan-bucket"))
            }
            other => panic!("Expected Delete, got {:?}", other),
        }
    }
}
