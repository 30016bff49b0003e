//! Resource tags and the tag/untag calls needed to converge them

use std::collections::BTreeMap;

use keel_core::resource::Value;

pub type Tags = BTreeMap<String, String>;

/// Tags to set and tag keys to remove
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TagChanges {
    /// New tags and tags whose value changed
    pub to_add: Tags,
    pub to_remove: Vec<String>,
}

impl TagChanges {
    pub fn between(observed: &Tags, desired: &Tags) -> Self {
        let to_add = desired
            .iter()
            .filter(|(k, v)| observed.get(*k) != Some(*v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let to_remove = observed
            .keys()
            .filter(|k| !desired.contains_key(*k))
            .cloned()
            .collect();
        Self { to_add, to_remove }
    }

    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

/// Read the `tags` attribute; non-string values are ignored
pub fn from_value(value: Option<&Value>) -> Tags {
    value
        .and_then(Value::as_map)
        .map(|map| {
            map.iter()
                .filter_map(|(k, v)| v.as_str().map(|s| (k.clone(), s.to_string())))
                .collect()
        })
        .unwrap_or_default()
}

pub fn to_value(tags: &Tags) -> Value {
    Value::Map(
        tags.iter()
            .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
            .collect(),
    )
}
