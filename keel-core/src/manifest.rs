//! Manifest - JSON declaration of providers, backend and resources
//!
//! ```json
//! {
//!   "provider": { "aws": { "region": "us-west-2" } },
//!   "backend": { "type": "local", "path": "keel.state.json" },
//!   "resource": {
//!     "aws_iam_role": { "codepipeline_role": { "name": "test-role", ... } },
//!     "aws_codepipeline": {
//!       "test": { "role_arn": { "ref": "aws_iam_role.codepipeline_role.arn" }, ... }
//!     }
//!   },
//!   "data": { "aws_efs_mount_target": { "by_id": { "mount_target_id": "fsmt-..." } } }
//! }
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;

use serde::Deserialize;

use crate::resource::{Resource, Value};

#[derive(Debug, thiserror::Error)]
pub enum ManifestError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid manifest: {0}")]
    Json(#[from] serde_json::Error),

    #[error("'{0}' is declared both as a resource and as a data source")]
    DuplicateBinding(String),

    #[error("'{binding}' must be an object")]
    NotAnObject { binding: String },
}

/// Attributes of one block, as written in the file
type Block = serde_json::Map<String, serde_json::Value>;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawManifest {
    #[serde(default)]
    provider: BTreeMap<String, Block>,
    #[serde(default)]
    backend: Option<Block>,
    #[serde(default)]
    resource: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
    #[serde(default)]
    data: BTreeMap<String, BTreeMap<String, serde_json::Value>>,
}

/// Provider block (`"provider": { "aws": { ... } }`)
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderConfig {
    pub name: String,
    pub attributes: HashMap<String, Value>,
}

impl ProviderConfig {
    pub fn get_str(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).and_then(Value::as_str)
    }
}

/// Backend block (`"backend": { "type": "local", ... }`)
#[derive(Debug, Clone, PartialEq)]
pub struct BackendBlock {
    pub backend_type: String,
    pub attributes: HashMap<String, Value>,
}

/// Parsed manifest
#[derive(Debug, Clone, Default)]
pub struct Manifest {
    pub providers: Vec<ProviderConfig>,
    pub backend: Option<BackendBlock>,
    /// Resources and data sources, in file order (type, then name)
    pub resources: Vec<Resource>,
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self, ManifestError> {
        let content = std::fs::read_to_string(path).map_err(|source| ManifestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, ManifestError> {
        let raw: RawManifest = serde_json::from_str(content)?;

        let providers = raw
            .provider
            .into_iter()
            .map(|(name, block)| ProviderConfig {
                name,
                attributes: block_attributes(&block),
            })
            .collect();

        let backend = raw.backend.map(|block| {
            let mut attributes = block_attributes(&block);
            let backend_type = match attributes.remove("type") {
                Some(Value::String(t)) => t,
                _ => "local".to_string(),
            };
            BackendBlock {
                backend_type,
                attributes,
            }
        });

        let mut resources = Vec::new();
        let mut seen = HashSet::new();
        for (read_only, section) in [(false, &raw.resource), (true, &raw.data)] {
            for (resource_type, instances) in section {
                for (name, body) in instances {
                    let binding = format!("{}.{}", resource_type, name);
                    let serde_json::Value::Object(block) = body else {
                        return Err(ManifestError::NotAnObject { binding });
                    };
                    if !seen.insert(binding.clone()) {
                        return Err(ManifestError::DuplicateBinding(binding));
                    }
                    let mut resource = Resource::new(resource_type, name).with_read_only(read_only);
                    resource.attributes = block_attributes(block);
                    resources.push(resource);
                }
            }
        }

        Ok(Self {
            providers,
            backend,
            resources,
        })
    }

    pub fn provider(&self, name: &str) -> Option<&ProviderConfig> {
        self.providers.iter().find(|p| p.name == name)
    }
}

fn block_attributes(block: &Block) -> HashMap<String, Value> {
    block
        .iter()
        .filter_map(|(k, v)| Value::from_json(v).map(|v| (k.clone(), v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const MANIFEST: &str = r#"{
        "provider": { "aws": { "region": "us-west-2" } },
        "backend": { "type": "local", "path": "state.json" },
        "resource": {
            "aws_iam_role": {
                "codepipeline_role": { "name": "test-role", "max_session_duration": 3600 }
            },
            "aws_codepipeline": {
                "test": {
                    "name": "test-pipeline",
                    "role_arn": { "ref": "aws_iam_role.codepipeline_role.arn" },
                    "stage": [{ "name": "Source", "action": [] }]
                }
            }
        },
        "data": {
            "aws_efs_mount_target": { "by_id": { "mount_target_id": "fsmt-12345678" } }
        }
    }"#;

    #[test]
    fn parse_full_manifest() {
        let manifest = Manifest::parse(MANIFEST).unwrap();

        let aws = manifest.provider("aws").unwrap();
        assert_eq!(aws.get_str("region"), Some("us-west-2"));

        let backend = manifest.backend.unwrap();
        assert_eq!(backend.backend_type, "local");
        assert_eq!(backend.attributes["path"], Value::from("state.json"));

        let bindings: Vec<String> = manifest.resources.iter().map(|r| r.id.binding()).collect();
        assert_eq!(
            bindings,
            vec![
                "aws_codepipeline.test",
                "aws_iam_role.codepipeline_role",
                "aws_efs_mount_target.by_id",
            ]
        );
        assert!(manifest.resources[2].read_only);

        let pipeline = &manifest.resources[0];
        assert_eq!(
            pipeline.attributes["role_arn"],
            Value::ResourceRef("aws_iam_role.codepipeline_role".to_string(), "arn".to_string())
        );
        assert_eq!(
            manifest.resources[1].attributes["max_session_duration"],
            Value::Int(3600)
        );
    }

    #[test]
    fn unknown_top_level_key_is_rejected() {
        let err = Manifest::parse(r#"{ "resources": {} }"#).unwrap_err();
        assert!(matches!(err, ManifestError::Json(_)));
    }

    #[test]
    fn resource_body_must_be_object() {
        let err = Manifest::parse(r#"{ "resource": { "aws_s3_bucket": { "b": 3 } } }"#)
            .unwrap_err();
        assert_eq!(err.to_string(), "'aws_s3_bucket.b' must be an object");
    }

    #[test]
    fn same_binding_in_resource_and_data_is_rejected() {
        let err = Manifest::parse(
            r#"{
                "resource": { "aws_s3_bucket": { "b": {} } },
                "data": { "aws_s3_bucket": { "b": {} } }
            }"#,
        )
        .unwrap_err();
        assert!(matches!(err, ManifestError::DuplicateBinding(_)));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(MANIFEST.as_bytes()).unwrap();
        let manifest = Manifest::load(file.path()).unwrap();
        assert_eq!(manifest.resources.len(), 3);

        let err = Manifest::load(Path::new("/nonexistent/keel.json")).unwrap_err();
        assert!(err.to_string().starts_with("Failed to read /nonexistent/keel.json"));
    }
}
