//! Typed pipeline declaration
//!
//! Attributes are expanded into these types before talking to the API and
//! flattened back after reading, so the reconciler and validation can work
//! on plain Rust values instead of attribute maps.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Placeholder the API returns instead of secret configuration values
pub const MASKED_SECRET: &str = "****";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDeclaration {
    pub name: String,
    pub role_arn: String,
    /// One store without region, or one store per region
    pub artifact_stores: Vec<ArtifactStore>,
    pub stages: Vec<Stage>,
    pub execution_mode: ExecutionMode,
    pub pipeline_type: PipelineType,
    pub variables: Vec<Variable>,
    /// Assigned by the API, incremented on every update
    pub version: Option<i32>,
}

impl PipelineDeclaration {
    /// Stores are keyed by region
    pub fn is_multi_region(&self) -> bool {
        self.artifact_stores.iter().any(|s| s.region.is_some())
    }

    /// Store for `region`; `None` looks up the single-region store
    pub fn artifact_store(&self, region: Option<&str>) -> Option<&ArtifactStore> {
        self.artifact_stores
            .iter()
            .find(|s| s.region.as_deref() == region)
    }

    /// Copy secret configuration values from `known` wherever this
    /// declaration only carries the masked placeholder.
    ///
    /// Values without a counterpart in `known` stay masked and compare
    /// unequal to any declared secret.
    pub fn retain_masked_secrets(&mut self, known: &PipelineDeclaration) {
        for stage in &mut self.stages {
            let Some(known_stage) = known.stages.iter().find(|s| s.name == stage.name) else {
                continue;
            };
            for action in &mut stage.actions {
                let Some(known_action) = known_stage.actions.iter().find(|a| a.name == action.name)
                else {
                    continue;
                };
                for (key, value) in action.configuration.iter_mut() {
                    if value == MASKED_SECRET
                        && let Some(known_value) = known_action.configuration.get(key)
                    {
                        *value = known_value.clone();
                    }
                }
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactStore {
    pub location: String,
    /// Only "S3" is accepted by the API
    pub store_type: String,
    pub region: Option<String>,
    pub encryption_key: Option<EncryptionKey>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionKey {
    pub id: String,
    pub key_type: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stage {
    pub name: String,
    pub actions: Vec<Action>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Action {
    pub name: String,
    pub category: String,
    pub owner: String,
    pub provider: String,
    pub version: String,
    pub input_artifacts: Vec<String>,
    pub output_artifacts: Vec<String>,
    pub configuration: BTreeMap<String, String>,
    pub run_order: i32,
    pub region: Option<String>,
    pub namespace: Option<String>,
    pub role_arn: Option<String>,
}

impl Action {
    pub const DEFAULT_RUN_ORDER: i32 = 1;
}

/// Pipeline variable, only valid on V2 pipelines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variable {
    pub name: String,
    pub description: Option<String>,
    pub default_value: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    Queued,
    #[default]
    Superseded,
    Parallel,
}

impl ExecutionMode {
    pub const ALL: [&'static str; 3] = ["QUEUED", "SUPERSEDED", "PARALLEL"];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExecutionMode::Queued => "QUEUED",
            ExecutionMode::Superseded => "SUPERSEDED",
            ExecutionMode::Parallel => "PARALLEL",
        }
    }
}

impl FromStr for ExecutionMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "QUEUED" => Ok(ExecutionMode::Queued),
            "SUPERSEDED" => Ok(ExecutionMode::Superseded),
            "PARALLEL" => Ok(ExecutionMode::Parallel),
            other => Err(format!("unknown execution mode '{}'", other)),
        }
    }
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PipelineType {
    #[default]
    V1,
    V2,
}

impl PipelineType {
    pub const ALL: [&'static str; 2] = ["V1", "V2"];

    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineType::V1 => "V1",
            PipelineType::V2 => "V2",
        }
    }
}

impl FromStr for PipelineType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "V1" => Ok(PipelineType::V1),
            "V2" => Ok(PipelineType::V2),
            other => Err(format!("unknown pipeline type '{}'", other)),
        }
    }
}

impl fmt::Display for PipelineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    pub fn source_action(token: &str) -> Action {
        let mut configuration = BTreeMap::new();
        configuration.insert("Owner".to_string(), "lifesum-terraform".to_string());
        configuration.insert("Repo".to_string(), "test".to_string());
        configuration.insert("Branch".to_string(), "main".to_string());
        configuration.insert("OAuthToken".to_string(), token.to_string());
        Action {
            name: "Source".to_string(),
            category: "Source".to_string(),
            owner: "ThirdParty".to_string(),
            provider: "GitHub".to_string(),
            version: "1".to_string(),
            input_artifacts: vec![],
            output_artifacts: vec!["test".to_string()],
            configuration,
            run_order: Action::DEFAULT_RUN_ORDER,
            region: None,
            namespace: None,
            role_arn: None,
        }
    }

    pub fn build_action() -> Action {
        let mut configuration = BTreeMap::new();
        configuration.insert("ProjectName".to_string(), "test".to_string());
        Action {
            name: "Build".to_string(),
            category: "Build".to_string(),
            owner: "AWS".to_string(),
            provider: "CodeBuild".to_string(),
            version: "1".to_string(),
            input_artifacts: vec!["test".to_string()],
            output_artifacts: vec![],
            configuration,
            run_order: Action::DEFAULT_RUN_ORDER,
            region: None,
            namespace: None,
            role_arn: None,
        }
    }

    pub fn pipeline() -> PipelineDeclaration {
        PipelineDeclaration {
            name: "tf-test-pipeline".to_string(),
            role_arn: "arn:aws:iam::123456789012:role/codepipeline-role".to_string(),
            artifact_stores: vec![ArtifactStore {
                location: "tf-test-pipeline-bucket".to_string(),
                store_type: "S3".to_string(),
                region: None,
                encryption_key: Some(EncryptionKey {
                    id: "1234".to_string(),
                    key_type: "KMS".to_string(),
                }),
            }],
            stages: vec![
                Stage {
                    name: "Source".to_string(),
                    actions: vec![source_action("secret-token")],
                },
                Stage {
                    name: "Build".to_string(),
                    actions: vec![build_action()],
                },
            ],
            execution_mode: ExecutionMode::default(),
            pipeline_type: PipelineType::default(),
            variables: vec![],
            version: None,
        }
    }
}
