//! `aws_codepipeline` resource

pub mod expand;
pub mod model;
pub mod reconcile;
pub mod sdk;
pub mod validate;

use std::collections::HashMap;

use aws_sdk_codepipeline::types::Tag;
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use log::{debug, info};

use crate::tags::{self, TagChanges, Tags};
use crate::{AwsProvider, api_error, arn};
use model::PipelineDeclaration;

/// Check the cross-field rules on declared attributes.
///
/// References are not resolved yet at this point, so they are replaced
/// with a placeholder before the declaration is expanded.
pub fn check_declaration(attributes: &HashMap<String, Value>) -> Result<(), Vec<String>> {
    let masked: HashMap<String, Value> = attributes
        .iter()
        .map(|(k, v)| (k.clone(), mask_unresolved(v)))
        .collect();
    let pipeline = expand::expand(&masked).map_err(|e| vec![e.to_string()])?;
    validate::validate(&pipeline).map_err(|errors| errors.iter().map(|e| e.to_string()).collect())
}

const UNRESOLVED_PLACEHOLDER: &str = "(known after apply)";

fn mask_unresolved(value: &Value) -> Value {
    match value {
        v if !v.has_refs() => v.clone(),
        Value::List(items) => Value::List(items.iter().map(mask_unresolved).collect()),
        Value::Map(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), mask_unresolved(v)))
                .collect(),
        ),
        _ => Value::from(UNRESOLVED_PLACEHOLDER),
    }
}

/// Expand and validate a resolved declaration
fn desired_pipeline(resource: &Resource) -> ProviderResult<PipelineDeclaration> {
    let pipeline = expand::expand(&resource.attributes)
        .map_err(|e| ProviderError::new(e.to_string()).for_resource(resource.id.clone()))?;
    validate::validate(&pipeline).map_err(|errors| {
        let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
        ProviderError::new(format!("Invalid pipeline: {}", messages.join("; ")))
            .for_resource(resource.id.clone())
    })?;
    Ok(pipeline)
}

fn to_request(
    id: &ResourceId,
    pipeline: &PipelineDeclaration,
) -> ProviderResult<aws_sdk_codepipeline::types::PipelineDeclaration> {
    sdk::to_sdk(pipeline).map_err(|e| {
        ProviderError::new(format!("Failed to build pipeline request: {}", e)).for_resource(id.clone())
    })
}

/// State attributes for a pipeline as read from the API
fn pipeline_state(
    id: &ResourceId,
    pipeline: &PipelineDeclaration,
    pipeline_arn: &str,
    tags: &Tags,
) -> State {
    let mut attributes = expand::flatten(pipeline);
    attributes.insert("arn".to_string(), Value::from(pipeline_arn));
    attributes.insert("tags".to_string(), tags::to_value(tags));
    State::existing(id.clone(), attributes).with_identifier(pipeline.name.as_str())
}

impl AwsProvider {
    // ===== CodePipeline =====

    /// Live declaration, ARN and tags, or `None` when the pipeline is gone
    async fn describe_pipeline(
        &self,
        id: &ResourceId,
        name: &str,
    ) -> ProviderResult<Option<(PipelineDeclaration, String, Tags)>> {
        debug!("GetPipeline {}", name);
        let output = match self.codepipeline.get_pipeline().name(name).send().await {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_pipeline_not_found_exception()) =>
            {
                return Ok(None);
            }
            Err(err) => return Err(api_error("read pipeline", id, err)),
        };

        let Some(declaration) = output.pipeline() else {
            return Ok(None);
        };
        let pipeline = sdk::from_sdk(declaration);

        let pipeline_arn = match output.metadata().and_then(|m| m.pipeline_arn()) {
            Some(found) => found.to_string(),
            None => {
                let caller = self.caller_identity().await?;
                arn::regional(caller, "codepipeline", &self.region, &pipeline.name)
            }
        };

        let tags = self.pipeline_tags(id, &pipeline_arn).await?;
        Ok(Some((pipeline, pipeline_arn, tags)))
    }

    async fn pipeline_tags(&self, id: &ResourceId, pipeline_arn: &str) -> ProviderResult<Tags> {
        let mut tags = Tags::new();
        let mut next_token: Option<String> = None;
        loop {
            let output = self
                .codepipeline
                .list_tags_for_resource()
                .resource_arn(pipeline_arn)
                .set_next_token(next_token.take())
                .send()
                .await
                .map_err(|e| api_error("list pipeline tags", id, e))?;
            for tag in output.tags() {
                tags.insert(tag.key().to_string(), tag.value().to_string());
            }
            match output.next_token() {
                Some(token) => next_token = Some(token.to_string()),
                None => break,
            }
        }
        Ok(tags)
    }

    /// Read a pipeline, restoring masked secrets from `known` when given
    async fn read_codepipeline_with(
        &self,
        id: &ResourceId,
        name: &str,
        known: Option<&PipelineDeclaration>,
    ) -> ProviderResult<State> {
        match self.describe_pipeline(id, name).await? {
            Some((mut pipeline, pipeline_arn, tags)) => {
                if let Some(known) = known {
                    pipeline.retain_masked_secrets(known);
                }
                Ok(pipeline_state(id, &pipeline, &pipeline_arn, &tags))
            }
            None => {
                debug!("pipeline {} not found", name);
                Ok(State::not_found(id.clone()))
            }
        }
    }

    pub(crate) async fn read_codepipeline(
        &self,
        id: &ResourceId,
        name: &str,
    ) -> ProviderResult<State> {
        self.read_codepipeline_with(id, name, None).await
    }

    /// Re-read keeping secrets recorded in `previous`
    pub(crate) async fn refresh_codepipeline(
        &self,
        id: &ResourceId,
        name: &str,
        previous: &State,
    ) -> ProviderResult<State> {
        let known = expand::expand(&previous.attributes).ok();
        self.read_codepipeline_with(id, name, known.as_ref()).await
    }

    pub(crate) async fn create_codepipeline(&self, resource: Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let pipeline = desired_pipeline(&resource)?;
        let desired_tags = tags::from_value(resource.attributes.get("tags"));

        let mut request = self
            .codepipeline
            .create_pipeline()
            .pipeline(to_request(&id, &pipeline)?);
        for tag in sdk_tags(&id, &desired_tags)? {
            request = request.tags(tag);
        }
        request
            .send()
            .await
            .map_err(|e| api_error("create pipeline", &id, e))?;
        info!("created pipeline {}", pipeline.name);

        self.read_after_write(&id, &pipeline).await
    }

    /// Masked secrets in the live pipeline are compared against the values
    /// recorded in `from`, so a rotated secret is sent with the declaration.
    pub(crate) async fn update_codepipeline(
        &self,
        id: ResourceId,
        name: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let desired = desired_pipeline(&to)?;
        let Some((mut observed, pipeline_arn, observed_tags)) =
            self.describe_pipeline(&id, name).await?
        else {
            return Err(
                ProviderError::new(format!("Pipeline '{}' no longer exists", name))
                    .for_resource(id),
            );
        };
        if let Ok(recorded) = expand::expand(&from.attributes) {
            observed.retain_masked_secrets(&recorded);
        }

        let desired_tags = tags::from_value(to.attributes.get("tags"));
        let result = reconcile::reconcile(&desired, &observed, &desired_tags, &observed_tags);
        if result.requires_replace {
            return Err(ProviderError::new(format!(
                "Pipeline '{}' cannot be renamed in place",
                name
            ))
            .for_resource(id));
        }

        if let Some(update) = &result.update {
            debug!(
                "UpdatePipeline {} ({})",
                name,
                result.changed.join(", ")
            );
            self.codepipeline
                .update_pipeline()
                .pipeline(to_request(&id, update)?)
                .send()
                .await
                .map_err(|e| api_error("update pipeline", &id, e))?;
            info!("updated pipeline {}", name);
        }
        self.apply_pipeline_tags(&id, &pipeline_arn, &result.tags)
            .await?;

        self.read_after_write(&id, &desired).await
    }

    async fn read_after_write(
        &self,
        id: &ResourceId,
        pipeline: &PipelineDeclaration,
    ) -> ProviderResult<State> {
        let state = self
            .read_codepipeline_with(id, &pipeline.name, Some(pipeline))
            .await?;
        if !state.exists {
            return Err(ProviderError::new(format!(
                "Pipeline '{}' not found after write",
                pipeline.name
            ))
            .for_resource(id.clone()));
        }
        Ok(state)
    }

    async fn apply_pipeline_tags(
        &self,
        id: &ResourceId,
        pipeline_arn: &str,
        changes: &TagChanges,
    ) -> ProviderResult<()> {
        if !changes.to_remove.is_empty() {
            debug!("UntagResource {} {:?}", pipeline_arn, changes.to_remove);
            self.codepipeline
                .untag_resource()
                .resource_arn(pipeline_arn)
                .set_tag_keys(Some(changes.to_remove.clone()))
                .send()
                .await
                .map_err(|e| api_error("untag pipeline", id, e))?;
        }
        if !changes.to_add.is_empty() {
            debug!("TagResource {} {:?}", pipeline_arn, changes.to_add);
            self.codepipeline
                .tag_resource()
                .resource_arn(pipeline_arn)
                .set_tags(Some(sdk_tags(id, &changes.to_add)?))
                .send()
                .await
                .map_err(|e| api_error("tag pipeline", id, e))?;
        }
        Ok(())
    }

    /// DeletePipeline succeeds for pipelines that no longer exist
    pub(crate) async fn delete_codepipeline(&self, id: ResourceId, name: &str) -> ProviderResult<()> {
        self.codepipeline
            .delete_pipeline()
            .name(name)
            .send()
            .await
            .map_err(|e| api_error("delete pipeline", &id, e))?;
        info!("deleted pipeline {}", name);
        Ok(())
    }
}

fn sdk_tags(id: &ResourceId, tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder().key(k).value(v).build().map_err(|e| {
                ProviderError::new(format!("Invalid tag '{}': {}", k, e)).for_resource(id.clone())
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, Rules};
    use aws_sdk_codepipeline::operation::get_pipeline::{GetPipelineError, GetPipelineOutput};
    use aws_sdk_codepipeline::operation::list_tags_for_resource::ListTagsForResourceOutput;
    use aws_sdk_codepipeline::operation::tag_resource::TagResourceOutput;
    use aws_sdk_codepipeline::operation::update_pipeline::UpdatePipelineOutput;
    use aws_sdk_codepipeline::types::PipelineMetadata;
    use aws_sdk_codepipeline::types::error::PipelineNotFoundException;
    use aws_smithy_mocks::{Rule, mock};
    use model::fixtures::{pipeline, source_action};
    use model::MASKED_SECRET;

    const PIPELINE_ARN: &str = "arn:aws:codepipeline:us-west-2:123456789012:tf-test-pipeline";

    fn pipeline_id() -> ResourceId {
        ResourceId::new("aws_codepipeline", "test")
    }

    /// GetPipeline answering with the fixture, secrets masked as the API does
    fn get_masked_pipeline() -> Rule {
        let mut live = pipeline();
        live.stages[0].actions[0] = source_action(MASKED_SECRET);
        live.version = Some(1);
        let declaration = sdk::to_sdk(&live).unwrap();
        mock!(aws_sdk_codepipeline::Client::get_pipeline).then_output(move || {
            GetPipelineOutput::builder()
                .pipeline(declaration.clone())
                .metadata(PipelineMetadata::builder().pipeline_arn(PIPELINE_ARN).build())
                .build()
        })
    }

    fn list_no_tags() -> Rule {
        mock!(aws_sdk_codepipeline::Client::list_tags_for_resource)
            .then_output(|| ListTagsForResourceOutput::builder().build())
    }

    fn update_pipeline() -> Rule {
        mock!(aws_sdk_codepipeline::Client::update_pipeline)
            .then_output(|| UpdatePipelineOutput::builder().build())
    }

    fn recorded_state() -> State {
        State::existing(pipeline_id(), expand::flatten(&pipeline()))
            .with_identifier("tf-test-pipeline")
    }

    fn declared(declaration: &PipelineDeclaration) -> Resource {
        let mut resource = Resource::new("aws_codepipeline", "test");
        resource.attributes = expand::flatten(declaration)
            .into_iter()
            .filter(|(k, _)| k != "id")
            .collect();
        resource
    }

    fn attributes() -> HashMap<String, Value> {
        let flat = expand::flatten(&model::fixtures::pipeline());
        flat.into_iter().filter(|(k, _)| k != "id").collect()
    }

    #[test]
    fn declaration_with_references_passes_checks() {
        let mut attrs = attributes();
        attrs.insert(
            "role_arn".to_string(),
            Value::ResourceRef("aws_iam_role.codepipeline_role".to_string(), "arn".to_string()),
        );
        assert_eq!(check_declaration(&attrs), Ok(()));
    }

    #[test]
    fn declaration_rule_violations_are_listed() {
        let mut attrs = attributes();
        attrs.insert("pipeline_type".to_string(), Value::from("V1"));
        attrs.insert(
            "variable".to_string(),
            Value::List(vec![Value::Map(
                [("name".to_string(), Value::from("test_var1"))]
                    .into_iter()
                    .collect(),
            )]),
        );
        let Some(Value::List(stages)) = attrs.get_mut("stage") else {
            panic!("stage list expected");
        };
        stages.truncate(1);

        let errors = check_declaration(&attrs).unwrap_err();
        assert_eq!(
            errors,
            vec![
                "A pipeline needs at least 2 stages, found 1".to_string(),
                "variable blocks require pipeline_type = \"V2\"".to_string(),
            ]
        );
    }

    #[test]
    fn interpolated_strings_are_masked() {
        let value = Value::from("${aws_s3_bucket.test.bucket}");
        assert_eq!(mask_unresolved(&value), Value::from(UNRESOLVED_PLACEHOLDER));
        assert_eq!(mask_unresolved(&Value::from("plain")), Value::from("plain"));
    }

    #[test]
    fn state_carries_identifier_arn_and_tags() {
        let id = ResourceId::new("aws_codepipeline", "test");
        let mut tags = Tags::new();
        tags.insert("Name".to_string(), "test".to_string());
        let state = pipeline_state(
            &id,
            &model::fixtures::pipeline(),
            "arn:aws:codepipeline:us-west-2:123456789012:tf-test-pipeline",
            &tags,
        );
        assert!(state.exists);
        assert_eq!(state.identifier.as_deref(), Some("tf-test-pipeline"));
        assert_eq!(
            state.get_str("arn"),
            Some("arn:aws:codepipeline:us-west-2:123456789012:tf-test-pipeline")
        );
        assert_eq!(tags::from_value(state.attributes.get("tags")), tags);
    }

    #[test]
    fn desired_pipeline_reports_rule_violations() {
        let mut resource = Resource::new("aws_codepipeline", "test");
        resource.attributes = attributes();
        assert!(desired_pipeline(&resource).is_ok());

        resource
            .attributes
            .insert("execution_mode".to_string(), Value::from("SOMETIMES"));
        let err = desired_pipeline(&resource).unwrap_err();
        assert!(err.to_string().contains("execution_mode"));
    }

    #[tokio::test]
    async fn missing_pipeline_reads_as_not_found() {
        let not_found = mock!(aws_sdk_codepipeline::Client::get_pipeline).then_error(|| {
            GetPipelineError::PipelineNotFoundException(
                PipelineNotFoundException::builder().build(),
            )
        });
        let provider = mocks::provider(Rules {
            codepipeline: vec![&not_found],
            ..Default::default()
        });
        let state = provider
            .read_codepipeline(&pipeline_id(), "tf-test-pipeline")
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn refresh_keeps_recorded_secret() {
        let get = get_masked_pipeline();
        let tags = list_no_tags();
        let provider = mocks::provider(Rules {
            codepipeline: vec![&get, &tags],
            ..Default::default()
        });
        let state = provider
            .refresh_codepipeline(&pipeline_id(), "tf-test-pipeline", &recorded_state())
            .await
            .unwrap();
        let refreshed = expand::expand(&state.attributes).unwrap();
        assert_eq!(
            refreshed.stages[0].actions[0].configuration["OAuthToken"],
            "secret-token"
        );
    }

    #[tokio::test]
    async fn tag_only_change_skips_update_pipeline() {
        let get = get_masked_pipeline();
        let tags = list_no_tags();
        let tag = mock!(aws_sdk_codepipeline::Client::tag_resource)
            .match_requests(|req| req.resource_arn() == Some(PIPELINE_ARN))
            .then_output(|| TagResourceOutput::builder().build());
        let update = update_pipeline();
        let provider = mocks::provider(Rules {
            codepipeline: vec![&get, &tags, &tag, &update],
            ..Default::default()
        });

        let mut resource = declared(&pipeline());
        resource.attributes.insert(
            "tags".to_string(),
            Value::Map([("Name".to_string(), Value::from("test"))].into_iter().collect()),
        );
        let state = provider
            .update_codepipeline(pipeline_id(), "tf-test-pipeline", &recorded_state(), resource)
            .await
            .unwrap();

        assert!(state.exists);
        assert_eq!(tag.num_calls(), 1);
        assert_eq!(update.num_calls(), 0);
    }

    #[tokio::test]
    async fn rotated_secret_reaches_update_pipeline() {
        let get = get_masked_pipeline();
        let tags = list_no_tags();
        let update = mock!(aws_sdk_codepipeline::Client::update_pipeline)
            .match_requests(|req| {
                req.pipeline()
                    .and_then(|p| p.stages().first())
                    .and_then(|stage| stage.actions().first())
                    .and_then(|action| action.configuration())
                    .and_then(|config| config.get("OAuthToken"))
                    .is_some_and(|token| token == "rotated-token")
            })
            .then_output(|| UpdatePipelineOutput::builder().build());
        let provider = mocks::provider(Rules {
            codepipeline: vec![&get, &tags, &update],
            ..Default::default()
        });

        let mut desired = pipeline();
        desired.stages[0].actions[0] = source_action("rotated-token");
        let state = provider
            .update_codepipeline(
                pipeline_id(),
                "tf-test-pipeline",
                &recorded_state(),
                declared(&desired),
            )
            .await
            .unwrap();

        assert_eq!(update.num_calls(), 1);
        let written = expand::expand(&state.attributes).unwrap();
        assert_eq!(
            written.stages[0].actions[0].configuration["OAuthToken"],
            "rotated-token"
        );
    }

    #[tokio::test]
    async fn unchanged_secret_sends_nothing() {
        let get = get_masked_pipeline();
        let tags = list_no_tags();
        let update = update_pipeline();
        let provider = mocks::provider(Rules {
            codepipeline: vec![&get, &tags, &update],
            ..Default::default()
        });
        provider
            .update_codepipeline(
                pipeline_id(),
                "tf-test-pipeline",
                &recorded_state(),
                declared(&pipeline()),
            )
            .await
            .unwrap();
        assert_eq!(update.num_calls(), 0);
    }
}
