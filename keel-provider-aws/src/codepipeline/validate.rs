//! Checks the API would otherwise reject with a less helpful message

use std::collections::HashSet;

use thiserror::Error;

use super::model::{PipelineDeclaration, PipelineType};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum PipelineError {
    #[error("Missing required attribute '{0}'")]
    MissingAttribute(String),

    #[error("Invalid value for '{attribute}': {message}")]
    InvalidAttribute { attribute: String, message: String },

    #[error("A pipeline needs at least 2 stages, found {0}")]
    TooFewStages(usize),

    #[error("Duplicate stage name '{0}'")]
    DuplicateStage(String),

    #[error("Duplicate action name '{action}' in stage '{stage}'")]
    DuplicateAction { stage: String, action: String },

    #[error("At least one artifact_store is required")]
    NoArtifactStore,

    #[error("region cannot be set for a single-region pipeline")]
    RegionOnSingleStore,

    #[error("Only one artifact_store may omit region")]
    MultipleDefaultArtifactStores,

    #[error("artifact_store blocks must either all set region or none may")]
    MixedArtifactStores,

    #[error("Duplicate artifact_store for region '{0}'")]
    DuplicateArtifactStoreRegion(String),

    #[error("Action '{action}' runs in region '{region}' which has no artifact_store")]
    MissingRegionalStore { action: String, region: String },

    #[error("variable blocks require pipeline_type = \"V2\"")]
    VariablesRequireV2,

    #[error("run_order of action '{action}' must be between 1 and 999, got {run_order}")]
    RunOrderOutOfRange { action: String, run_order: i32 },
}

/// Every rule violation, in declaration order
pub fn validate(pipeline: &PipelineDeclaration) -> Result<(), Vec<PipelineError>> {
    let mut errors = Vec::new();

    check_artifact_stores(pipeline, &mut errors);

    if pipeline.stages.len() < 2 {
        errors.push(PipelineError::TooFewStages(pipeline.stages.len()));
    }

    let mut stage_names = HashSet::new();
    for stage in &pipeline.stages {
        if !stage_names.insert(stage.name.as_str()) {
            errors.push(PipelineError::DuplicateStage(stage.name.clone()));
        }

        let mut action_names = HashSet::new();
        for action in &stage.actions {
            if !action_names.insert(action.name.as_str()) {
                errors.push(PipelineError::DuplicateAction {
                    stage: stage.name.clone(),
                    action: action.name.clone(),
                });
            }
            if !(1..=999).contains(&action.run_order) {
                errors.push(PipelineError::RunOrderOutOfRange {
                    action: action.name.clone(),
                    run_order: action.run_order,
                });
            }
            if pipeline.is_multi_region()
                && let Some(region) = &action.region
                && pipeline.artifact_store(Some(region)).is_none()
            {
                errors.push(PipelineError::MissingRegionalStore {
                    action: action.name.clone(),
                    region: region.clone(),
                });
            }
        }
    }

    if !pipeline.variables.is_empty() && pipeline.pipeline_type != PipelineType::V2 {
        errors.push(PipelineError::VariablesRequireV2);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn check_artifact_stores(pipeline: &PipelineDeclaration, errors: &mut Vec<PipelineError>) {
    let stores = &pipeline.artifact_stores;
    if stores.is_empty() {
        errors.push(PipelineError::NoArtifactStore);
        return;
    }

    let without_region = stores.iter().filter(|s| s.region.is_none()).count();
    if stores.len() == 1 && without_region == 0 {
        errors.push(PipelineError::RegionOnSingleStore);
    } else if without_region > 0 && without_region < stores.len() {
        errors.push(PipelineError::MixedArtifactStores);
    } else if without_region > 1 {
        errors.push(PipelineError::MultipleDefaultArtifactStores);
    }

    let mut regions = HashSet::new();
    for region in stores.iter().filter_map(|s| s.region.as_deref()) {
        if !regions.insert(region) {
            errors.push(PipelineError::DuplicateArtifactStoreRegion(region.to_string()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codepipeline::model::fixtures::{build_action, pipeline};
    use crate::codepipeline::model::{ArtifactStore, Stage, Variable};

    fn regional_store(region: &str) -> ArtifactStore {
        ArtifactStore {
            location: format!("bucket-{}", region),
            store_type: "S3".to_string(),
            region: Some(region.to_string()),
            encryption_key: None,
        }
    }

    #[test]
    fn fixture_pipeline_is_valid() {
        assert_eq!(validate(&pipeline()), Ok(()));
    }

    #[test]
    fn one_stage_is_too_few() {
        let mut p = pipeline();
        p.stages.truncate(1);
        assert_eq!(validate(&p), Err(vec![PipelineError::TooFewStages(1)]));
    }

    #[test]
    fn duplicate_names_are_reported() {
        let mut p = pipeline();
        p.stages[1].name = "Source".to_string();
        p.stages[1].actions.push(build_action());
        let errors = validate(&p).unwrap_err();
        assert_eq!(
            errors,
            vec![
                PipelineError::DuplicateStage("Source".to_string()),
                PipelineError::DuplicateAction {
                    stage: "Source".to_string(),
                    action: "Build".to_string(),
                },
            ]
        );
    }

    #[test]
    fn artifact_store_shapes() {
        let mut p = pipeline();
        p.artifact_stores.push(regional_store("us-east-1"));
        assert_eq!(validate(&p), Err(vec![PipelineError::MixedArtifactStores]));

        p.artifact_stores = vec![];
        assert_eq!(validate(&p), Err(vec![PipelineError::NoArtifactStore]));

        p.artifact_stores = vec![pipeline().artifact_stores[0].clone(); 2];
        assert_eq!(
            validate(&p),
            Err(vec![PipelineError::MultipleDefaultArtifactStores])
        );

        p.artifact_stores = vec![regional_store("us-east-1")];
        assert_eq!(validate(&p), Err(vec![PipelineError::RegionOnSingleStore]));

        p.artifact_stores = vec![regional_store("us-east-1"), regional_store("us-east-1")];
        assert_eq!(
            validate(&p),
            Err(vec![PipelineError::DuplicateArtifactStoreRegion(
                "us-east-1".to_string()
            )])
        );
    }

    #[test]
    fn regional_actions_need_a_store() {
        let mut p = pipeline();
        p.artifact_stores = vec![regional_store("us-west-2"), regional_store("us-east-1")];
        let mut deploy = build_action();
        deploy.name = "Deploy-eu".to_string();
        deploy.region = Some("eu-west-1".to_string());
        p.stages.push(Stage {
            name: "Deploy".to_string(),
            actions: vec![deploy],
        });
        assert_eq!(
            validate(&p),
            Err(vec![PipelineError::MissingRegionalStore {
                action: "Deploy-eu".to_string(),
                region: "eu-west-1".to_string(),
            }])
        );
    }

    #[test]
    fn variables_need_v2() {
        let mut p = pipeline();
        p.variables.push(Variable {
            name: "test_var1".to_string(),
            description: Some("This is test pipeline variable 1.".to_string()),
            default_value: Some("value1".to_string()),
        });
        assert_eq!(validate(&p), Err(vec![PipelineError::VariablesRequireV2]));

        p.pipeline_type = PipelineType::V2;
        assert_eq!(validate(&p), Ok(()));
    }

    #[test]
    fn run_order_bounds() {
        let mut p = pipeline();
        p.stages[1].actions[0].run_order = 0;
        assert!(matches!(
            validate(&p).unwrap_err()[0],
            PipelineError::RunOrderOutOfRange { run_order: 0, .. }
        ));
    }
}
