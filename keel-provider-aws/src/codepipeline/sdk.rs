//! Mapping between `PipelineDeclaration` and the CodePipeline SDK types

use std::collections::HashMap;

use aws_sdk_codepipeline::types;

use super::model::{Action, ArtifactStore, EncryptionKey, PipelineDeclaration, Stage, Variable};

/// Request shape for CreatePipeline / UpdatePipeline
pub fn to_sdk(pipeline: &PipelineDeclaration) -> Result<types::PipelineDeclaration, String> {
    let mut builder = types::PipelineDeclaration::builder()
        .name(&pipeline.name)
        .role_arn(&pipeline.role_arn)
        .execution_mode(types::ExecutionMode::from(pipeline.execution_mode.as_str()))
        .pipeline_type(types::PipelineType::from(pipeline.pipeline_type.as_str()))
        .set_version(pipeline.version);

    if pipeline.is_multi_region() {
        let mut stores = HashMap::new();
        for store in &pipeline.artifact_stores {
            if let Some(region) = &store.region {
                stores.insert(region.clone(), artifact_store_to_sdk(store)?);
            }
        }
        builder = builder.set_artifact_stores(Some(stores));
    } else if let Some(store) = pipeline.artifact_stores.first() {
        builder = builder.artifact_store(artifact_store_to_sdk(store)?);
    }

    for stage in &pipeline.stages {
        builder = builder.stages(stage_to_sdk(stage)?);
    }

    for variable in &pipeline.variables {
        builder = builder.variables(
            types::PipelineVariableDeclaration::builder()
                .name(&variable.name)
                .set_description(variable.description.clone())
                .set_default_value(variable.default_value.clone())
                .build()
                .map_err(|e| format!("variable '{}': {}", variable.name, e))?,
        );
    }

    builder.build().map_err(|e| e.to_string())
}

fn artifact_store_to_sdk(store: &ArtifactStore) -> Result<types::ArtifactStore, String> {
    let encryption_key = match &store.encryption_key {
        Some(key) => Some(
            types::EncryptionKey::builder()
                .id(&key.id)
                .r#type(types::EncryptionKeyType::from(key.key_type.as_str()))
                .build()
                .map_err(|e| format!("encryption_key: {}", e))?,
        ),
        None => None,
    };
    types::ArtifactStore::builder()
        .r#type(types::ArtifactStoreType::from(store.store_type.as_str()))
        .location(&store.location)
        .set_encryption_key(encryption_key)
        .build()
        .map_err(|e| format!("artifact_store '{}': {}", store.location, e))
}

fn stage_to_sdk(stage: &Stage) -> Result<types::StageDeclaration, String> {
    let actions = stage
        .actions
        .iter()
        .map(action_to_sdk)
        .collect::<Result<Vec<_>, _>>()?;
    types::StageDeclaration::builder()
        .name(&stage.name)
        .set_actions(Some(actions))
        .build()
        .map_err(|e| format!("stage '{}': {}", stage.name, e))
}

fn action_to_sdk(action: &Action) -> Result<types::ActionDeclaration, String> {
    let type_id = types::ActionTypeId::builder()
        .category(types::ActionCategory::from(action.category.as_str()))
        .owner(types::ActionOwner::from(action.owner.as_str()))
        .provider(&action.provider)
        .version(&action.version)
        .build()
        .map_err(action_error(action))?;

    let inputs = action
        .input_artifacts
        .iter()
        .map(|name| types::InputArtifact::builder().name(name).build())
        .collect::<Result<Vec<_>, _>>()
        .map_err(action_error(action))?;
    let outputs = action
        .output_artifacts
        .iter()
        .map(|name| types::OutputArtifact::builder().name(name).build())
        .collect::<Result<Vec<_>, _>>()
        .map_err(action_error(action))?;

    let configuration = (!action.configuration.is_empty()).then(|| {
        action
            .configuration
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect::<HashMap<_, _>>()
    });

    types::ActionDeclaration::builder()
        .name(&action.name)
        .action_type_id(type_id)
        .run_order(action.run_order)
        .set_configuration(configuration)
        .set_input_artifacts((!inputs.is_empty()).then_some(inputs))
        .set_output_artifacts((!outputs.is_empty()).then_some(outputs))
        .set_region(action.region.clone())
        .set_namespace(action.namespace.clone())
        .set_role_arn(action.role_arn.clone())
        .build()
        .map_err(action_error(action))
}

fn action_error<E: std::fmt::Display>(action: &Action) -> impl Fn(E) -> String + '_ {
    move |e| format!("action '{}': {}", action.name, e)
}

/// Declaration as reported by GetPipeline
pub fn from_sdk(pipeline: &types::PipelineDeclaration) -> PipelineDeclaration {
    let mut artifact_stores = Vec::new();
    if let Some(store) = pipeline.artifact_store() {
        artifact_stores.push(artifact_store_from_sdk(store, None));
    }
    if let Some(stores) = pipeline.artifact_stores() {
        let mut regions: Vec<&String> = stores.keys().collect();
        regions.sort();
        for region in regions {
            artifact_stores.push(artifact_store_from_sdk(&stores[region], Some(region.clone())));
        }
    }

    PipelineDeclaration {
        name: pipeline.name().to_string(),
        role_arn: pipeline.role_arn().to_string(),
        artifact_stores,
        stages: pipeline.stages().iter().map(stage_from_sdk).collect(),
        execution_mode: pipeline
            .execution_mode()
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or_default(),
        pipeline_type: pipeline
            .pipeline_type()
            .and_then(|t| t.as_str().parse().ok())
            .unwrap_or_default(),
        variables: pipeline
            .variables()
            .iter()
            .map(|v| Variable {
                name: v.name().to_string(),
                description: v.description().map(str::to_string),
                default_value: v.default_value().map(str::to_string),
            })
            .collect(),
        version: pipeline.version(),
    }
}

fn artifact_store_from_sdk(store: &types::ArtifactStore, region: Option<String>) -> ArtifactStore {
    ArtifactStore {
        location: store.location().to_string(),
        store_type: store.r#type().as_str().to_string(),
        region,
        encryption_key: store.encryption_key().map(|key| EncryptionKey {
            id: key.id().to_string(),
            key_type: key.r#type().as_str().to_string(),
        }),
    }
}

fn stage_from_sdk(stage: &types::StageDeclaration) -> Stage {
    Stage {
        name: stage.name().to_string(),
        actions: stage.actions().iter().map(action_from_sdk).collect(),
    }
}

fn action_from_sdk(action: &types::ActionDeclaration) -> Action {
    let type_id = action.action_type_id();
    Action {
        name: action.name().to_string(),
        category: type_id
            .map(|t| t.category().as_str().to_string())
            .unwrap_or_default(),
        owner: type_id
            .map(|t| t.owner().as_str().to_string())
            .unwrap_or_default(),
        provider: type_id
            .map(|t| t.provider().to_string())
            .unwrap_or_default(),
        version: type_id.map(|t| t.version().to_string()).unwrap_or_default(),
        input_artifacts: action
            .input_artifacts()
            .iter()
            .map(|a| a.name().to_string())
            .collect(),
        output_artifacts: action
            .output_artifacts()
            .iter()
            .map(|a| a.name().to_string())
            .collect(),
        configuration: action
            .configuration()
            .map(|c| c.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default(),
        run_order: action.run_order().unwrap_or(Action::DEFAULT_RUN_ORDER),
        region: action.region().map(str::to_string),
        namespace: action.namespace().map(str::to_string),
        role_arn: action.role_arn().map(str::to_string),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codepipeline::model::PipelineType;
    use crate::codepipeline::model::fixtures::pipeline;

    #[test]
    fn single_region_uses_artifact_store() {
        let request = to_sdk(&pipeline()).unwrap();
        assert!(request.artifact_stores().is_none());
        let store = request.artifact_store().unwrap();
        assert_eq!(store.location(), "tf-test-pipeline-bucket");
        assert_eq!(store.encryption_key().unwrap().id(), "1234");
        assert_eq!(request.stages().len(), 2);
        assert_eq!(
            request.execution_mode(),
            Some(&types::ExecutionMode::Superseded)
        );
        assert_eq!(request.pipeline_type(), Some(&types::PipelineType::V1));
    }

    #[test]
    fn multi_region_uses_artifact_stores_map() {
        let mut p = pipeline();
        p.artifact_stores = vec![
            ArtifactStore {
                location: "bucket-west".to_string(),
                store_type: "S3".to_string(),
                region: Some("us-west-2".to_string()),
                encryption_key: None,
            },
            ArtifactStore {
                location: "bucket-east".to_string(),
                store_type: "S3".to_string(),
                region: Some("us-east-1".to_string()),
                encryption_key: None,
            },
        ];
        p.stages[1].actions[0].region = Some("us-east-1".to_string());

        let request = to_sdk(&p).unwrap();
        assert!(request.artifact_store().is_none());
        let stores = request.artifact_stores().unwrap();
        assert_eq!(stores["us-east-1"].location(), "bucket-east");
        assert_eq!(
            request.stages()[1].actions()[0].region(),
            Some("us-east-1")
        );

        // Regions come back as map keys and are sorted on the way in
        let back = from_sdk(&request);
        assert_eq!(back.artifact_stores[0].region.as_deref(), Some("us-east-1"));
        assert_eq!(back.artifact_stores[1].region.as_deref(), Some("us-west-2"));
    }

    #[test]
    fn request_round_trips_through_sdk_types() {
        let mut p = pipeline();
        p.pipeline_type = PipelineType::V2;
        p.variables.push(Variable {
            name: "test_var1".to_string(),
            description: Some("This is test pipeline variable 1.".to_string()),
            default_value: Some("value1".to_string()),
        });
        p.stages[0].actions[0].namespace = Some("SourceVariables".to_string());
        assert_eq!(from_sdk(&to_sdk(&p).unwrap()), p);
    }
}
