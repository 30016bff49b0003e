//! Resource - Representing resources and their state

use std::collections::HashMap;

/// Unique identifier for a resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId {
    /// Resource type (e.g., "aws_codepipeline", "aws_iam_role")
    pub resource_type: String,
    /// Resource name (local name given in the manifest)
    pub name: String,
}

impl ResourceId {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            name: name.into(),
        }
    }

    /// Binding used by references: `<type>.<name>`
    pub fn binding(&self) -> String {
        format!("{}.{}", self.resource_type, self.name)
    }
}

impl std::fmt::Display for ResourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.resource_type, self.name)
    }
}

/// Attribute value of a resource
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    List(Vec<Value>),
    Map(HashMap<String, Value>),
    /// Reference to another resource's attribute (binding, attribute_name)
    ///
    /// The binding is `<type>.<name>` of the referenced resource.
    ResourceRef(String, String),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(s.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&HashMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Zero values: empty string, empty list, empty map
    pub fn is_empty_like(&self) -> bool {
        match self {
            Value::String(s) => s.is_empty(),
            Value::List(items) => items.is_empty(),
            Value::Map(map) => map.is_empty(),
            _ => false,
        }
    }

    /// Returns true if the value still contains unresolved references
    pub fn has_refs(&self) -> bool {
        match self {
            Value::ResourceRef(_, _) => true,
            Value::String(s) => !interpolations(s).is_empty(),
            Value::List(items) => items.iter().any(Value::has_refs),
            Value::Map(map) => map.values().any(Value::has_refs),
            _ => false,
        }
    }

    /// Equality where a missing map key and a zero value are the same thing.
    ///
    /// Nested blocks read back from an API omit unset fields, while the
    /// desired side may spell them out as `""` or `[]`.
    pub fn semantically_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Map(a), Value::Map(b)) => maps_semantically_eq(a, b),
            (Value::List(a), Value::List(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.semantically_eq(y))
            }
            _ => self == other,
        }
    }

    /// Convert a JSON value. `{"ref": "a.b.c"}` becomes a `ResourceRef`.
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(|f| Value::Int(f as i64))
                }
            }
            serde_json::Value::Array(arr) => {
                Some(Value::List(arr.iter().filter_map(Value::from_json).collect()))
            }
            serde_json::Value::Object(obj) => {
                if obj.len() == 1
                    && let Some(serde_json::Value::String(path)) = obj.get("ref")
                    && let Some((binding, attr)) = path.rsplit_once('.')
                {
                    return Some(Value::ResourceRef(binding.to_string(), attr.to_string()));
                }
                Some(Value::Map(
                    obj.iter()
                        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
                        .collect(),
                ))
            }
            serde_json::Value::Null => None,
        }
    }

    /// Convert to JSON. References are written back in `{"ref": ...}` form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::String(s) => serde_json::Value::String(s.clone()),
            Value::Int(i) => serde_json::Value::from(*i),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::List(items) => {
                serde_json::Value::Array(items.iter().map(Value::to_json).collect())
            }
            Value::Map(map) => serde_json::Value::Object(
                map.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
            Value::ResourceRef(binding, attr) => {
                serde_json::json!({ "ref": format!("{}.{}", binding, attr) })
            }
        }
    }
}

/// `${<type>.<name>.<attr>}` placeholders inside a string, as (binding, attribute)
pub fn interpolations(s: &str) -> Vec<(String, String)> {
    let mut found = Vec::new();
    let mut rest = s;
    while let Some(start) = rest.find("${") {
        let after = &rest[start + 2..];
        let Some(end) = after.find('}') else {
            break;
        };
        let path = &after[..end];
        if let Some((binding, attr)) = path.rsplit_once('.')
            && binding.contains('.')
            && !path.contains(char::is_whitespace)
        {
            found.push((binding.to_string(), attr.to_string()));
        }
        rest = &after[end + 1..];
    }
    found
}

fn maps_semantically_eq(a: &HashMap<String, Value>, b: &HashMap<String, Value>) -> bool {
    let keys = a.keys().chain(b.keys());
    for key in keys {
        match (a.get(key), b.get(key)) {
            (Some(x), Some(y)) => {
                if !x.semantically_eq(y) {
                    return false;
                }
            }
            (Some(v), None) | (None, Some(v)) => {
                if !v.is_empty_like() {
                    return false;
                }
            }
            (None, None) => {}
        }
    }
    true
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

/// Desired state declared in the manifest
#[derive(Debug, Clone, PartialEq)]
pub struct Resource {
    pub id: ResourceId,
    pub attributes: HashMap<String, Value>,
    /// If true, this is a data source (read-only) that won't be modified
    pub read_only: bool,
}

impl Resource {
    pub fn new(resource_type: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: ResourceId::new(resource_type, name),
            attributes: HashMap::new(),
            read_only: false,
        }
    }

    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    /// Returns true if this resource is a data source (read-only)
    pub fn is_data_source(&self) -> bool {
        self.read_only
    }

    /// String attribute, if present
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Current state fetched from actual infrastructure
#[derive(Debug, Clone, PartialEq)]
pub struct State {
    pub id: ResourceId,
    /// Provider-side identifier (pipeline name, connection ARN, ...)
    pub identifier: Option<String>,
    pub attributes: HashMap<String, Value>,
    /// Whether this state exists
    pub exists: bool,
}

impl State {
    pub fn not_found(id: ResourceId) -> Self {
        Self {
            id,
            identifier: None,
            attributes: HashMap::new(),
            exists: false,
        }
    }

    pub fn existing(id: ResourceId, attributes: HashMap<String, Value>) -> Self {
        Self {
            id,
            identifier: None,
            attributes,
            exists: true,
        }
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn binding_joins_type_and_name() {
        let id = ResourceId::new("aws_iam_role", "codepipeline_role");
        assert_eq!(id.binding(), "aws_iam_role.codepipeline_role");
        assert_eq!(id.to_string(), "aws_iam_role.codepipeline_role");
    }

    #[test]
    fn ref_object_becomes_resource_ref() {
        let v = Value::from_json(&json!({"ref": "aws_iam_role.codepipeline_role.arn"})).unwrap();
        assert_eq!(
            v,
            Value::ResourceRef("aws_iam_role.codepipeline_role".to_string(), "arn".to_string())
        );
        assert!(v.has_refs());
        assert_eq!(
            v.to_json(),
            json!({"ref": "aws_iam_role.codepipeline_role.arn"})
        );
    }

    #[test]
    fn interpolations_are_found_in_strings() {
        let s = r#"{"Resource": ["${aws_s3_bucket.test.arn}", "${aws_s3_bucket.test.arn}/*"]}"#;
        let found = interpolations(s);
        assert_eq!(found.len(), 2);
        assert_eq!(
            found[0],
            ("aws_s3_bucket.test".to_string(), "arn".to_string())
        );
        assert!(Value::from(s).has_refs());

        // CodePipeline variable syntax and malformed placeholders are left alone
        assert!(interpolations("#{SourceVariables.CommitId}").is_empty());
        assert!(interpolations("${novalue}").is_empty());
        assert!(interpolations("${unterminated.x.y").is_empty());
    }

    #[test]
    fn null_is_dropped_from_objects() {
        let v = Value::from_json(&json!({"a": null, "b": "x"})).unwrap();
        let map = v.as_map().unwrap();
        assert_eq!(map.len(), 1);
        assert_eq!(map.get("b"), Some(&Value::from("x")));
    }

    #[test]
    fn missing_key_equals_empty_value() {
        let mut a = HashMap::new();
        a.insert("name".to_string(), Value::from("Build"));
        a.insert("output_artifacts".to_string(), Value::List(vec![]));
        a.insert("region".to_string(), Value::from(""));

        let mut b = HashMap::new();
        b.insert("name".to_string(), Value::from("Build"));

        assert!(Value::Map(a).semantically_eq(&Value::Map(b)));
    }

    #[test]
    fn list_length_difference_is_not_equal() {
        let a = Value::List(vec![Value::from("test"), Value::from("")]);
        let b = Value::List(vec![Value::from("test")]);
        assert!(!a.semantically_eq(&b));
    }
}
