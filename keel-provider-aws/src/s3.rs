//! `aws_s3_bucket` resource

use std::collections::HashMap;

use aws_sdk_s3::error::ProvideErrorMetadata;
use aws_sdk_s3::types::{
    BucketLocationConstraint, BucketVersioningStatus, CreateBucketConfiguration, Delete,
    ObjectIdentifier, Tag, Tagging, VersioningConfiguration,
};
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use log::{debug, info};

use crate::tags::{self, TagChanges, Tags};
use crate::{AwsProvider, api_error, arn};

/// DeleteObjects accepts at most this many keys per call
const DELETE_BATCH: usize = 1000;

/// GetBucketVersioning reports no status for a bucket that was never versioned
pub fn versioning_status(status: Option<&str>) -> &str {
    status.unwrap_or("Suspended")
}

/// us-east-1 buckets are created without a location constraint
pub fn location_constraint(region: &str) -> Option<CreateBucketConfiguration> {
    if region == "us-east-1" {
        return None;
    }
    Some(
        CreateBucketConfiguration::builder()
            .location_constraint(BucketLocationConstraint::from(region))
            .build(),
    )
}

/// `force_destroy` only exists on our side, so it is taken from the declaration
fn force_destroy(attributes: &HashMap<String, Value>) -> bool {
    attributes
        .get("force_destroy")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}

fn bucket_tags(id: &ResourceId, tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder().key(k).value(v).build().map_err(|e| {
                ProviderError::new(format!("Invalid tag '{}': {}", k, e)).for_resource(id.clone())
            })
        })
        .collect()
}

impl AwsProvider {
    // ===== S3 Bucket =====

    pub(crate) async fn read_s3_bucket(&self, id: &ResourceId, name: &str) -> ProviderResult<State> {
        debug!("HeadBucket {}", name);
        let head = match self.s3.head_bucket().bucket(name).send().await {
            Ok(output) => output,
            Err(err) => {
                use aws_sdk_s3::error::SdkError;

                // HeadBucket errors carry no body, only the status code
                let is_not_found = match &err {
                    SdkError::ServiceError(service_err) => {
                        service_err.err().is_not_found()
                            || service_err.raw().status().as_u16() == 404
                    }
                    _ => false,
                };
                if is_not_found {
                    debug!("bucket {} not found", name);
                    return Ok(State::not_found(id.clone()));
                }
                return Err(api_error("read bucket", id, err));
            }
        };

        let versioning = self
            .s3
            .get_bucket_versioning()
            .bucket(name)
            .send()
            .await
            .map_err(|e| api_error("read bucket versioning", id, e))?;

        let tags: Tags = match self.s3.get_bucket_tagging().bucket(name).send().await {
            Ok(output) => output
                .tag_set()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect(),
            Err(err)
                if err
                    .as_service_error()
                    .and_then(|e| e.code())
                    .is_some_and(|code| code == "NoSuchTagSet") =>
            {
                Tags::new()
            }
            Err(err) => return Err(api_error("read bucket tags", id, err)),
        };

        let caller = self.caller_identity().await?;
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::from(name));
        attributes.insert("bucket".to_string(), Value::from(name));
        attributes.insert(
            "arn".to_string(),
            Value::from(arn::s3_bucket(&caller.partition, name)),
        );
        attributes.insert(
            "region".to_string(),
            Value::from(head.bucket_region().unwrap_or(&self.region)),
        );
        attributes.insert(
            "versioning".to_string(),
            Value::from(versioning_status(versioning.status().map(|s| s.as_str()))),
        );
        attributes.insert("force_destroy".to_string(), Value::Bool(false));
        attributes.insert("tags".to_string(), tags::to_value(&tags));

        Ok(State::existing(id.clone(), attributes).with_identifier(name))
    }

    /// Re-read, keeping the recorded `force_destroy`
    pub(crate) async fn refresh_s3_bucket(
        &self,
        id: &ResourceId,
        name: &str,
        previous: &State,
    ) -> ProviderResult<State> {
        let mut state = self.read_s3_bucket(id, name).await?;
        if state.exists {
            state.attributes.insert(
                "force_destroy".to_string(),
                Value::Bool(force_destroy(&previous.attributes)),
            );
        }
        Ok(state)
    }

    pub(crate) async fn create_s3_bucket(&self, resource: Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = resource.get_str("bucket").ok_or_else(|| {
            ProviderError::new("Bucket name is required").for_resource(id.clone())
        })?;

        self.s3
            .create_bucket()
            .bucket(name)
            .set_create_bucket_configuration(location_constraint(&self.region))
            .send()
            .await
            .map_err(|e| api_error("create bucket", &id, e))?;
        info!("created bucket {}", name);

        if resource.get_str("versioning") == Some("Enabled") {
            self.put_versioning(&id, name, "Enabled").await?;
        }
        let desired_tags = tags::from_value(resource.attributes.get("tags"));
        if !desired_tags.is_empty() {
            self.put_bucket_tags(&id, name, &desired_tags).await?;
        }

        let mut state = self.read_s3_bucket(&id, name).await?;
        state.attributes.insert(
            "force_destroy".to_string(),
            Value::Bool(force_destroy(&resource.attributes)),
        );
        Ok(state)
    }

    pub(crate) async fn update_s3_bucket(
        &self,
        id: ResourceId,
        name: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let desired_versioning = to.get_str("versioning").unwrap_or("Suspended");
        if from.get_str("versioning") != Some(desired_versioning) {
            self.put_versioning(&id, name, desired_versioning).await?;
        }

        let desired_tags = tags::from_value(to.attributes.get("tags"));
        let changes = TagChanges::between(
            &tags::from_value(from.attributes.get("tags")),
            &desired_tags,
        );
        if !changes.is_empty() {
            // PutBucketTagging replaces the whole set
            if desired_tags.is_empty() {
                debug!("DeleteBucketTagging {}", name);
                self.s3
                    .delete_bucket_tagging()
                    .bucket(name)
                    .send()
                    .await
                    .map_err(|e| api_error("delete bucket tags", &id, e))?;
            } else {
                self.put_bucket_tags(&id, name, &desired_tags).await?;
            }
        }

        info!("updated bucket {}", name);
        let mut state = self.read_s3_bucket(&id, name).await?;
        state.attributes.insert(
            "force_destroy".to_string(),
            Value::Bool(force_destroy(&to.attributes)),
        );
        Ok(state)
    }

    async fn put_versioning(&self, id: &ResourceId, name: &str, status: &str) -> ProviderResult<()> {
        debug!("PutBucketVersioning {} {}", name, status);
        let config = VersioningConfiguration::builder()
            .status(BucketVersioningStatus::from(status))
            .build();
        self.s3
            .put_bucket_versioning()
            .bucket(name)
            .versioning_configuration(config)
            .send()
            .await
            .map_err(|e| api_error("configure versioning", id, e))?;
        Ok(())
    }

    async fn put_bucket_tags(&self, id: &ResourceId, name: &str, tags: &Tags) -> ProviderResult<()> {
        debug!("PutBucketTagging {}", name);
        let tagging = Tagging::builder()
            .set_tag_set(Some(bucket_tags(id, tags)?))
            .build()
            .map_err(|e| {
                ProviderError::new(format!("Invalid tagging: {}", e)).for_resource(id.clone())
            })?;
        self.s3
            .put_bucket_tagging()
            .bucket(name)
            .tagging(tagging)
            .send()
            .await
            .map_err(|e| api_error("tag bucket", id, e))?;
        Ok(())
    }

    pub(crate) async fn delete_s3_bucket(
        &self,
        id: ResourceId,
        name: &str,
        force: bool,
    ) -> ProviderResult<()> {
        if force {
            self.empty_bucket(&id, name).await?;
        }
        match self.s3.delete_bucket().bucket(name).send().await {
            Ok(_) => {
                info!("deleted bucket {}", name);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .and_then(|e| e.code())
                    .is_some_and(|code| code == "NoSuchBucket") =>
            {
                Ok(())
            }
            Err(err) => Err(api_error("delete bucket", &id, err)),
        }
    }

    /// Delete every object version and delete marker
    async fn empty_bucket(&self, id: &ResourceId, name: &str) -> ProviderResult<()> {
        let mut key_marker: Option<String> = None;
        let mut version_marker: Option<String> = None;
        loop {
            let page = match self
                .s3
                .list_object_versions()
                .bucket(name)
                .set_key_marker(key_marker.take())
                .set_version_id_marker(version_marker.take())
                .send()
                .await
            {
                Ok(page) => page,
                Err(err)
                    if err
                        .as_service_error()
                        .and_then(|e| e.code())
                        .is_some_and(|code| code == "NoSuchBucket") =>
                {
                    return Ok(());
                }
                Err(err) => return Err(api_error("list object versions", id, err)),
            };

            let versions = page
                .versions()
                .iter()
                .map(|v| (v.key(), v.version_id()))
                .chain(
                    page.delete_markers()
                        .iter()
                        .map(|m| (m.key(), m.version_id())),
                );
            let objects = versions
                .filter_map(|(key, version)| key.map(|k| (k, version)))
                .map(|(key, version)| {
                    ObjectIdentifier::builder()
                        .key(key)
                        .set_version_id(version.map(str::to_string))
                        .build()
                        .map_err(|e| {
                            ProviderError::new(format!("Invalid object key '{}': {}", key, e))
                                .for_resource(id.clone())
                        })
                })
                .collect::<ProviderResult<Vec<_>>>()?;

            for batch in objects.chunks(DELETE_BATCH) {
                debug!("DeleteObjects {} ({} keys)", name, batch.len());
                let delete = Delete::builder()
                    .set_objects(Some(batch.to_vec()))
                    .quiet(true)
                    .build()
                    .map_err(|e| {
                        ProviderError::new(format!("Invalid delete request: {}", e))
                            .for_resource(id.clone())
                    })?;
                self.s3
                    .delete_objects()
                    .bucket(name)
                    .delete(delete)
                    .send()
                    .await
                    .map_err(|e| api_error("delete objects", id, e))?;
            }

            if page.is_truncated() != Some(true) {
                break;
            }
            key_marker = page.next_key_marker().map(str::to_string);
            version_marker = page.next_version_id_marker().map(str::to_string);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, Rules};
    use aws_sdk_s3::error::ErrorMetadata;
    use aws_sdk_s3::operation::delete_bucket::DeleteBucketError;
    use aws_sdk_s3::operation::head_bucket::HeadBucketError;
    use aws_sdk_s3::types::error::NotFound;
    use aws_smithy_mocks::mock;

    fn bucket_id() -> ResourceId {
        ResourceId::new("aws_s3_bucket", "artifacts")
    }

    #[test]
    fn missing_versioning_status_reads_as_suspended() {
        assert_eq!(versioning_status(None), "Suspended");
        assert_eq!(versioning_status(Some("Enabled")), "Enabled");
    }

    #[test]
    fn location_constraint_outside_us_east_1() {
        assert!(location_constraint("us-east-1").is_none());
        let config = location_constraint("us-west-2").unwrap();
        assert_eq!(
            config.location_constraint(),
            Some(&BucketLocationConstraint::UsWest2)
        );
    }

    #[test]
    fn force_destroy_comes_from_declaration() {
        let mut attrs = HashMap::new();
        assert!(!force_destroy(&attrs));
        attrs.insert("force_destroy".to_string(), Value::Bool(true));
        assert!(force_destroy(&attrs));
    }

    #[tokio::test]
    async fn missing_bucket_reads_as_not_found() {
        let status_404 = mock!(aws_sdk_s3::Client::head_bucket)
            .sequence()
            .http_status(404, None)
            .build();
        let provider = mocks::provider(Rules {
            s3: vec![&status_404],
            ..Default::default()
        });
        let state = provider
            .read_s3_bucket(&bucket_id(), "tf-test-bucket")
            .await
            .unwrap();
        assert!(!state.exists);

        let modeled = mock!(aws_sdk_s3::Client::head_bucket)
            .then_error(|| HeadBucketError::NotFound(NotFound::builder().build()));
        let provider = mocks::provider(Rules {
            s3: vec![&modeled],
            ..Default::default()
        });
        let state = provider
            .read_s3_bucket(&bucket_id(), "tf-test-bucket")
            .await
            .unwrap();
        assert!(!state.exists);
    }

    #[tokio::test]
    async fn access_denied_is_an_error() {
        let forbidden = mock!(aws_sdk_s3::Client::head_bucket)
            .sequence()
            .http_status(403, None)
            .build();
        let provider = mocks::provider(Rules {
            s3: vec![&forbidden],
            ..Default::default()
        });
        let err = provider
            .read_s3_bucket(&bucket_id(), "tf-test-bucket")
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to read bucket"));
        assert_eq!(forbidden.num_calls(), 1);
    }

    #[tokio::test]
    async fn deleting_a_missing_bucket_succeeds() {
        let gone = mock!(aws_sdk_s3::Client::delete_bucket).then_error(|| {
            DeleteBucketError::generic(ErrorMetadata::builder().code("NoSuchBucket").build())
        });
        let provider = mocks::provider(Rules {
            s3: vec![&gone],
            ..Default::default()
        });
        provider
            .delete_s3_bucket(bucket_id(), "tf-test-bucket", false)
            .await
            .unwrap();
        assert_eq!(gone.num_calls(), 1);
    }
}
