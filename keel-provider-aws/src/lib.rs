//! Keel AWS Provider
//!
//! Resource handlers for CodePipeline, CodeStar connections, IAM roles and
//! S3 buckets, plus the EFS mount target data source.

pub mod arn;
pub mod codepipeline;
mod codestarconnections;
mod efs;
mod iam;
mod s3;
pub mod schemas;
pub mod tags;

use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_codepipeline::Client as CodePipelineClient;
use aws_sdk_codestarconnections::Client as CodeStarClient;
use aws_sdk_efs::Client as EfsClient;
use aws_sdk_iam::Client as IamClient;
use aws_sdk_s3::Client as S3Client;
use aws_sdk_sts::Client as StsClient;
use aws_sdk_sts::error::DisplayErrorContext;
use keel_core::provider::{BoxFuture, Provider, ProviderError, ProviderResult, ResourceType};
use keel_core::resource::{Resource, ResourceId, State, Value};
use keel_core::schema::ResourceSchema;
use log::debug;
use tokio::sync::OnceCell;

use arn::CallerIdentity;

/// Schema errors first; cross-field rules only run on a well-formed declaration
fn validate_with(
    schema: ResourceSchema,
    resource: &Resource,
    check: impl Fn(&std::collections::HashMap<String, Value>) -> Result<(), Vec<String>>,
) -> Result<(), Vec<String>> {
    schema
        .validate(&resource.attributes)
        .map_err(|errors| errors.iter().map(|e| e.to_string()).collect::<Vec<_>>())?;
    check(&resource.attributes)
}

/// CodePipeline resource type
pub struct CodePipelineType;

impl ResourceType for CodePipelineType {
    fn name(&self) -> &'static str {
        "aws_codepipeline"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::codepipeline::pipeline_schema()
    }

    fn validate(&self, resource: &Resource) -> Result<(), Vec<String>> {
        validate_with(self.schema(), resource, codepipeline::check_declaration)
    }
}

/// CodeStar connection resource type
pub struct CodeStarConnectionType;

impl ResourceType for CodeStarConnectionType {
    fn name(&self) -> &'static str {
        "aws_codestarconnections_connection"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::codestarconnections::connection_schema()
    }

    fn validate(&self, resource: &Resource) -> Result<(), Vec<String>> {
        validate_with(self.schema(), resource, |attrs| {
            codestarconnections::check_connection(attrs).map_err(|e| vec![e])
        })
    }
}

/// IAM role resource type
pub struct IamRoleType;

impl ResourceType for IamRoleType {
    fn name(&self) -> &'static str {
        "aws_iam_role"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::iam::role_schema()
    }
}

/// IAM inline role policy resource type
pub struct IamRolePolicyType;

impl ResourceType for IamRolePolicyType {
    fn name(&self) -> &'static str {
        "aws_iam_role_policy"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::iam::role_policy_schema()
    }
}

/// S3 bucket resource type
pub struct S3BucketType;

impl ResourceType for S3BucketType {
    fn name(&self) -> &'static str {
        "aws_s3_bucket"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::s3::bucket_schema()
    }
}

/// EFS mount target data source
pub struct EfsMountTargetDataSource;

impl ResourceType for EfsMountTargetDataSource {
    fn name(&self) -> &'static str {
        "aws_efs_mount_target"
    }

    fn schema(&self) -> ResourceSchema {
        schemas::efs::mount_target_schema()
    }
}

/// Every resource type and data source this provider handles
pub fn resource_types() -> Vec<Box<dyn ResourceType>> {
    vec![
        Box::new(CodePipelineType),
        Box::new(CodeStarConnectionType),
        Box::new(IamRoleType),
        Box::new(IamRolePolicyType),
        Box::new(S3BucketType),
        Box::new(EfsMountTargetDataSource),
    ]
}

/// Wrap an SDK error with the failed action and the resource it was for
pub(crate) fn api_error<E>(action: &str, id: &ResourceId, err: E) -> ProviderError
where
    E: std::error::Error + Send + Sync + 'static,
{
    ProviderError::new(format!(
        "Failed to {}: {}",
        action,
        DisplayErrorContext(&err)
    ))
    .for_resource(id.clone())
    .with_cause(err)
}

/// AWS Provider
pub struct AwsProvider {
    codepipeline: CodePipelineClient,
    codestar: CodeStarClient,
    efs: EfsClient,
    iam: IamClient,
    s3: S3Client,
    sts: StsClient,
    region: String,
    caller: OnceCell<CallerIdentity>,
}

impl AwsProvider {
    /// Create a provider from manifest settings, falling back to the
    /// environment and shared config for anything not given.
    pub async fn from_settings(
        region: Option<&str>,
        profile: Option<&str>,
    ) -> ProviderResult<Self> {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = region {
            loader = loader.region(Region::new(region.to_string()));
        }
        if let Some(profile) = profile {
            loader = loader.profile_name(profile);
        }
        let config = loader.load().await;
        let region = config
            .region()
            .map(|r| r.to_string())
            .ok_or_else(|| ProviderError::new("No AWS region configured"))?;
        debug!("using region {}", region);
        Ok(Self::from_sdk_config(&config, region))
    }

    fn from_sdk_config(config: &SdkConfig, region: String) -> Self {
        Self {
            codepipeline: CodePipelineClient::new(config),
            codestar: CodeStarClient::new(config),
            efs: EfsClient::new(config),
            iam: IamClient::new(config),
            s3: S3Client::new(config),
            sts: StsClient::new(config),
            region,
            caller: OnceCell::new(),
        }
    }

    pub fn region(&self) -> &str {
        &self.region
    }

    /// Account and partition of the current credentials, fetched once
    pub(crate) async fn caller_identity(&self) -> ProviderResult<&CallerIdentity> {
        self.caller
            .get_or_try_init(|| async {
                debug!("GetCallerIdentity");
                let output = self
                    .sts
                    .get_caller_identity()
                    .send()
                    .await
                    .map_err(|e| {
                        ProviderError::new(format!(
                            "Failed to get caller identity: {}",
                            DisplayErrorContext(&e)
                        ))
                        .with_cause(e)
                    })?;
                Ok(CallerIdentity::from_caller_arn(
                    output.account().unwrap_or_default(),
                    output.arn().unwrap_or_default(),
                ))
            })
            .await
    }
}

fn unknown_type(id: &ResourceId) -> ProviderError {
    ProviderError::new(format!("Unknown resource type: {}", id.resource_type))
        .for_resource(id.clone())
}

impl Provider for AwsProvider {
    fn name(&self) -> &'static str {
        "aws"
    }

    fn resource_types(&self) -> Vec<Box<dyn ResourceType>> {
        resource_types()
    }

    fn read(
        &self,
        id: &ResourceId,
        identifier: Option<&str>,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.map(str::to_string);
        Box::pin(async move {
            let Some(identifier) = identifier else {
                return Ok(State::not_found(id));
            };
            match id.resource_type.as_str() {
                "aws_codepipeline" => self.read_codepipeline(&id, &identifier).await,
                "aws_codestarconnections_connection" => {
                    self.read_codestar_connection(&id, &identifier).await
                }
                "aws_iam_role" => self.read_iam_role(&id, &identifier).await,
                "aws_iam_role_policy" => self.read_iam_role_policy(&id, &identifier).await,
                "aws_s3_bucket" => self.read_s3_bucket(&id, &identifier).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn refresh<'a>(
        &'a self,
        id: &ResourceId,
        identifier: &str,
        previous: &State,
    ) -> BoxFuture<'a, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let previous = previous.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                "aws_codepipeline" => {
                    self.refresh_codepipeline(&id, &identifier, &previous)
                        .await
                }
                "aws_s3_bucket" => self.refresh_s3_bucket(&id, &identifier, &previous).await,
                _ => self.read(&id, Some(&identifier)).await,
            }
        })
    }

    fn read_data_source(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                "aws_efs_mount_target" => self.read_efs_mount_target(resource).await,
                _ => Err(ProviderError::new(format!(
                    "Unknown data source: {}",
                    resource.id.resource_type
                ))
                .for_resource(resource.id.clone())),
            }
        })
    }

    fn create(&self, resource: &Resource) -> BoxFuture<'_, ProviderResult<State>> {
        let resource = resource.clone();
        Box::pin(async move {
            match resource.id.resource_type.as_str() {
                "aws_codepipeline" => self.create_codepipeline(resource).await,
                "aws_codestarconnections_connection" => {
                    self.create_codestar_connection(resource).await
                }
                "aws_iam_role" => self.create_iam_role(resource).await,
                "aws_iam_role_policy" => self.create_iam_role_policy(resource).await,
                "aws_s3_bucket" => self.create_s3_bucket(resource).await,
                _ => Err(unknown_type(&resource.id)),
            }
        })
    }

    fn update(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
        to: &Resource,
    ) -> BoxFuture<'_, ProviderResult<State>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let from = from.clone();
        let to = to.clone();
        Box::pin(async move {
            match id.resource_type.as_str() {
                "aws_codepipeline" => {
                    self.update_codepipeline(id, &identifier, &from, to).await
                }
                "aws_codestarconnections_connection" => {
                    self.update_codestar_connection(id, &identifier, &from, to)
                        .await
                }
                "aws_iam_role" => self.update_iam_role(id, &identifier, &from, to).await,
                "aws_iam_role_policy" => self.update_iam_role_policy(to).await,
                "aws_s3_bucket" => self.update_s3_bucket(id, &identifier, &from, to).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }

    fn delete(
        &self,
        id: &ResourceId,
        identifier: &str,
        from: &State,
    ) -> BoxFuture<'_, ProviderResult<()>> {
        let id = id.clone();
        let identifier = identifier.to_string();
        let force_destroy = from
            .attributes
            .get("force_destroy")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        Box::pin(async move {
            match id.resource_type.as_str() {
                "aws_codepipeline" => self.delete_codepipeline(id, &identifier).await,
                "aws_codestarconnections_connection" => {
                    self.delete_codestar_connection(id, &identifier).await
                }
                "aws_iam_role" => self.delete_iam_role(id, &identifier).await,
                "aws_iam_role_policy" => self.delete_iam_role_policy(id, &identifier).await,
                "aws_s3_bucket" => self.delete_s3_bucket(id, &identifier, force_destroy).await,
                _ => Err(unknown_type(&id)),
            }
        })
    }
}

/// Provider backed by mocked SDK clients
#[cfg(test)]
pub(crate) mod mocks {
    use aws_smithy_mocks::{Rule, RuleMode, mock_client};

    use super::*;

    pub const ACCOUNT_ID: &str = "123456789012";

    /// Rules per service; a service without rules answers no calls
    #[derive(Default)]
    pub struct Rules<'a> {
        pub codepipeline: Vec<&'a Rule>,
        pub codestar: Vec<&'a Rule>,
        pub iam: Vec<&'a Rule>,
        pub s3: Vec<&'a Rule>,
    }

    pub fn provider(rules: Rules<'_>) -> AwsProvider {
        let none: Vec<&Rule> = Vec::new();
        let caller = CallerIdentity::from_caller_arn(
            ACCOUNT_ID,
            "arn:aws:iam::123456789012:user/keel",
        );
        AwsProvider {
            codepipeline: mock_client!(
                aws_sdk_codepipeline,
                RuleMode::MatchAny,
                &rules.codepipeline
            ),
            codestar: mock_client!(
                aws_sdk_codestarconnections,
                RuleMode::MatchAny,
                &rules.codestar
            ),
            efs: mock_client!(aws_sdk_efs, RuleMode::MatchAny, &none),
            iam: mock_client!(aws_sdk_iam, RuleMode::MatchAny, &rules.iam),
            s3: mock_client!(aws_sdk_s3, RuleMode::MatchAny, &rules.s3),
            sts: mock_client!(aws_sdk_sts, RuleMode::MatchAny, &none),
            region: "us-west-2".to_string(),
            caller: OnceCell::new_with(Some(caller)),
        }
    }
}
