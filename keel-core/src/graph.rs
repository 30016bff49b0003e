//! Reference graph between declared resources
//!
//! Resources refer to each other with `ResourceRef(binding, attribute)`.
//! This module orders resources so that every dependency comes first, and
//! substitutes references with known attribute values.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::resource::{Resource, ResourceId, State, Value, interpolations};

/// binding (`<type>.<name>`) -> attributes
pub type BindingMap = HashMap<String, HashMap<String, Value>>;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    #[error("{from} refers to undeclared resource '{binding}'")]
    UnknownReference { from: String, binding: String },

    #[error("Dependency cycle: {}", .0.join(" -> "))]
    Cycle(Vec<String>),
}

/// Bindings a resource depends on
pub fn dependencies(resource: &Resource) -> BTreeSet<String> {
    let mut deps = BTreeSet::new();
    for value in resource.attributes.values() {
        collect_dependencies(value, &mut deps);
    }
    deps
}

fn collect_dependencies(value: &Value, deps: &mut BTreeSet<String>) {
    match value {
        Value::ResourceRef(binding, _) => {
            deps.insert(binding.clone());
        }
        Value::String(s) => {
            deps.extend(interpolations(s).into_iter().map(|(binding, _)| binding));
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

/// Sort resources topologically based on dependencies
///
/// Declaration order is kept among resources that do not depend on each other.
pub fn sort_by_dependencies(resources: &[Resource]) -> Result<Vec<Resource>, GraphError> {
    let by_binding: HashMap<String, &Resource> =
        resources.iter().map(|r| (r.id.binding(), r)).collect();

    for resource in resources {
        for dep in dependencies(resource) {
            if !by_binding.contains_key(&dep) {
                return Err(GraphError::UnknownReference {
                    from: resource.id.binding(),
                    binding: dep,
                });
            }
        }
    }

    let mut sorted = Vec::new();
    let mut visited: HashSet<String> = HashSet::new();
    let mut path: Vec<String> = Vec::new();

    fn visit(
        resource: &Resource,
        by_binding: &HashMap<String, &Resource>,
        visited: &mut HashSet<String>,
        path: &mut Vec<String>,
        sorted: &mut Vec<Resource>,
    ) -> Result<(), GraphError> {
        let binding = resource.id.binding();
        if visited.contains(&binding) {
            return Ok(());
        }
        if let Some(start) = path.iter().position(|b| b == &binding) {
            let mut cycle = path[start..].to_vec();
            cycle.push(binding);
            return Err(GraphError::Cycle(cycle));
        }

        path.push(binding.clone());
        for dep in dependencies(resource) {
            if let Some(dep_resource) = by_binding.get(&dep) {
                visit(dep_resource, by_binding, visited, path, sorted)?;
            }
        }
        path.pop();

        visited.insert(binding);
        sorted.push(resource.clone());
        Ok(())
    }

    for resource in resources {
        visit(resource, &by_binding, &mut visited, &mut path, &mut sorted)?;
    }

    Ok(sorted)
}

/// Build the binding map from declarations merged with known state.
///
/// Declared values win; state fills in computed attributes such as `arn`.
pub fn build_bindings(resources: &[Resource], states: &HashMap<ResourceId, State>) -> BindingMap {
    let mut bindings = BindingMap::new();
    for resource in resources {
        let mut attrs = resource.attributes.clone();
        if let Some(state) = states.get(&resource.id)
            && state.exists
        {
            for (k, v) in &state.attributes {
                if !attrs.contains_key(k) {
                    attrs.insert(k.clone(), v.clone());
                }
            }
        }
        bindings.insert(resource.id.binding(), attrs);
    }
    bindings
}

/// Record the attributes a resource has after an apply step
pub fn record_state(bindings: &mut BindingMap, resource: &Resource, state: &State) {
    let mut attrs = resource.attributes.clone();
    for (k, v) in &state.attributes {
        attrs.insert(k.clone(), v.clone());
    }
    bindings.insert(resource.id.binding(), attrs);
}

/// Substitute references with known values, leaving unknown ones in place
pub fn resolve_ref_value(value: &Value, bindings: &BindingMap) -> Value {
    match value {
        Value::ResourceRef(binding, attr) => {
            if let Some(attrs) = bindings.get(binding)
                && let Some(attr_value) = attrs.get(attr)
                && attr_value != value
            {
                return resolve_ref_value(attr_value, bindings);
            }
            value.clone()
        }
        Value::String(s) => Value::String(interpolate(s, bindings)),
        Value::List(items) => Value::List(
            items
                .iter()
                .map(|v| resolve_ref_value(v, bindings))
                .collect(),
        ),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), resolve_ref_value(v, bindings)))
                .collect(),
        ),
        _ => value.clone(),
    }
}

/// Replace known `${binding.attr}` placeholders with scalar values
fn interpolate(s: &str, bindings: &BindingMap) -> String {
    let mut out = s.to_string();
    for (binding, attr) in interpolations(s) {
        let rendered = match bindings.get(&binding).and_then(|attrs| attrs.get(&attr)) {
            Some(Value::String(v)) if interpolations(v).is_empty() => v.clone(),
            Some(Value::Int(i)) => i.to_string(),
            Some(Value::Bool(b)) => b.to_string(),
            _ => continue,
        };
        out = out.replace(&format!("${{{}.{}}}", binding, attr), &rendered);
    }
    out
}

/// Resolve every attribute of a resource
pub fn resolve_resource(resource: &Resource, bindings: &BindingMap) -> Resource {
    Resource {
        attributes: resource
            .attributes
            .iter()
            .map(|(k, v)| (k.clone(), resolve_ref_value(v, bindings)))
            .collect(),
        ..resource.clone()
    }
}
