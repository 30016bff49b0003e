//! `aws_codestarconnections_connection` resource
//!
//! The connection ARN is the identifier. New connections stay `PENDING`
//! until the handshake is completed in the console.

use std::collections::HashMap;

use aws_sdk_codestarconnections::types::{ProviderType, Tag};
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use log::{debug, info};

use crate::tags::{self, TagChanges, Tags};
use crate::{AwsProvider, api_error};

/// A connection is made either to a cloud provider or to a host
pub fn check_connection(attributes: &HashMap<String, Value>) -> Result<(), String> {
    match (
        attributes.contains_key("provider_type"),
        attributes.contains_key("host_arn"),
    ) {
        (true, true) => Err("provider_type and host_arn cannot both be set".to_string()),
        (false, false) => Err("One of provider_type or host_arn is required".to_string()),
        _ => Ok(()),
    }
}

/// Fields of a connection as reported by GetConnection
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ConnectionSnapshot {
    pub arn: String,
    pub name: String,
    pub provider_type: Option<String>,
    pub host_arn: Option<String>,
    pub connection_status: Option<String>,
    pub owner_account_id: Option<String>,
    pub tags: Tags,
}

impl ConnectionSnapshot {
    pub fn attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::from(self.arn.as_str()));
        attributes.insert("arn".to_string(), Value::from(self.arn.as_str()));
        attributes.insert("name".to_string(), Value::from(self.name.as_str()));
        // Host connections report the host's provider type; only one of the two is declared
        match (&self.host_arn, &self.provider_type) {
            (Some(host_arn), _) => {
                attributes.insert("host_arn".to_string(), Value::from(host_arn.as_str()));
            }
            (None, Some(provider_type)) => {
                attributes.insert(
                    "provider_type".to_string(),
                    Value::from(provider_type.as_str()),
                );
            }
            (None, None) => {}
        }
        if let Some(status) = &self.connection_status {
            attributes.insert(
                "connection_status".to_string(),
                Value::from(status.as_str()),
            );
        }
        if let Some(owner) = &self.owner_account_id {
            attributes.insert("owner_account_id".to_string(), Value::from(owner.as_str()));
        }
        attributes.insert("tags".to_string(), tags::to_value(&self.tags));
        attributes
    }
}

fn connection_tags(id: &ResourceId, tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder().key(k).value(v).build().map_err(|e| {
                ProviderError::new(format!("Invalid tag '{}': {}", k, e)).for_resource(id.clone())
            })
        })
        .collect()
}

impl AwsProvider {
    // ===== CodeStar Connection =====

    pub(crate) async fn read_codestar_connection(
        &self,
        id: &ResourceId,
        arn: &str,
    ) -> ProviderResult<State> {
        debug!("GetConnection {}", arn);
        let output = match self.codestar.get_connection().connection_arn(arn).send().await {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                debug!("connection {} not found", arn);
                return Ok(State::not_found(id.clone()));
            }
            Err(err) => return Err(api_error("read connection", id, err)),
        };
        let Some(connection) = output.connection() else {
            return Ok(State::not_found(id.clone()));
        };

        let tags = self
            .codestar
            .list_tags_for_resource()
            .resource_arn(arn)
            .send()
            .await
            .map_err(|e| api_error("list connection tags", id, e))?
            .tags()
            .iter()
            .map(|t| (t.key().to_string(), t.value().to_string()))
            .collect();

        let snapshot = ConnectionSnapshot {
            arn: connection.connection_arn().unwrap_or(arn).to_string(),
            name: connection.connection_name().unwrap_or_default().to_string(),
            provider_type: connection.provider_type().map(|p| p.as_str().to_string()),
            host_arn: connection.host_arn().map(str::to_string),
            connection_status: connection
                .connection_status()
                .map(|s| s.as_str().to_string()),
            owner_account_id: connection.owner_account_id().map(str::to_string),
            tags,
        };
        Ok(State::existing(id.clone(), snapshot.attributes()).with_identifier(arn))
    }

    pub(crate) async fn create_codestar_connection(
        &self,
        resource: Resource,
    ) -> ProviderResult<State> {
        let id = resource.id.clone();
        check_connection(&resource.attributes)
            .map_err(|msg| ProviderError::new(msg).for_resource(id.clone()))?;
        let name = resource.get_str("name").ok_or_else(|| {
            ProviderError::new("Connection name is required").for_resource(id.clone())
        })?;
        let desired_tags = tags::from_value(resource.attributes.get("tags"));

        let output = self
            .codestar
            .create_connection()
            .connection_name(name)
            .set_provider_type(resource.get_str("provider_type").map(ProviderType::from))
            .set_host_arn(resource.get_str("host_arn").map(str::to_string))
            .set_tags(Some(connection_tags(&id, &desired_tags)?).filter(|t| !t.is_empty()))
            .send()
            .await
            .map_err(|e| api_error("create connection", &id, e))?;
        let arn = output.connection_arn();
        info!("created connection {} ({})", name, arn);

        self.read_codestar_connection(&id, arn).await
    }

    /// Everything but tags forces replacement
    pub(crate) async fn update_codestar_connection(
        &self,
        id: ResourceId,
        arn: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        let changes = TagChanges::between(
            &tags::from_value(from.attributes.get("tags")),
            &tags::from_value(to.attributes.get("tags")),
        );
        if !changes.to_remove.is_empty() {
            self.codestar
                .untag_resource()
                .resource_arn(arn)
                .set_tag_keys(Some(changes.to_remove.clone()))
                .send()
                .await
                .map_err(|e| api_error("untag connection", &id, e))?;
        }
        if !changes.to_add.is_empty() {
            self.codestar
                .tag_resource()
                .resource_arn(arn)
                .set_tags(Some(connection_tags(&id, &changes.to_add)?))
                .send()
                .await
                .map_err(|e| api_error("tag connection", &id, e))?;
        }
        self.read_codestar_connection(&id, arn).await
    }

    pub(crate) async fn delete_codestar_connection(
        &self,
        id: ResourceId,
        arn: &str,
    ) -> ProviderResult<()> {
        match self
            .codestar
            .delete_connection()
            .connection_arn(arn)
            .send()
            .await
        {
            Ok(_) => {
                info!("deleted connection {}", arn);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_resource_not_found_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(api_error("delete connection", &id, err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{self, Rules};
    use aws_sdk_codestarconnections::operation::delete_connection::DeleteConnectionError;
    use aws_sdk_codestarconnections::operation::get_connection::GetConnectionError;
    use aws_sdk_codestarconnections::types::error::ResourceNotFoundException;
    use aws_smithy_mocks::mock;

    const CONNECTION_ARN: &str =
        "arn:aws:codestar-connections:us-west-2:123456789012:connection/0123abcd";

    #[test]
    fn provider_type_or_host_arn() {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("test-connection"));
        assert!(check_connection(&attrs).is_err());

        attrs.insert("provider_type".to_string(), Value::from("GitHub"));
        assert!(check_connection(&attrs).is_ok());

        attrs.insert(
            "host_arn".to_string(),
            Value::from("arn:aws:codestar-connections:us-west-2:123456789012:host/ghes-1"),
        );
        assert!(check_connection(&attrs).is_err());
    }

    #[test]
    fn host_connections_omit_provider_type() {
        let snapshot = ConnectionSnapshot {
            arn: "arn:aws:codestar-connections:us-west-2:123456789012:connection/abc".to_string(),
            name: "ghes".to_string(),
            provider_type: Some("GitHubEnterpriseServer".to_string()),
            host_arn: Some(
                "arn:aws:codestar-connections:us-west-2:123456789012:host/ghes-1".to_string(),
            ),
            connection_status: Some("PENDING".to_string()),
            ..Default::default()
        };
        let attrs = snapshot.attributes();
        assert!(attrs.get("provider_type").is_none());
        assert!(attrs.contains_key("host_arn"));
        assert_eq!(attrs["connection_status"], Value::from("PENDING"));
        assert_eq!(attrs["id"], attrs["arn"]);
    }

    #[test]
    fn cloud_connections_report_provider_type() {
        let snapshot = ConnectionSnapshot {
            arn: "arn:aws:codestar-connections:us-west-2:123456789012:connection/abc".to_string(),
            name: "github".to_string(),
            provider_type: Some("GitHub".to_string()),
            ..Default::default()
        };
        assert_eq!(
            snapshot.attributes()["provider_type"],
            Value::from("GitHub")
        );
    }

    #[tokio::test]
    async fn missing_connection_reads_as_not_found() {
        let not_found = mock!(aws_sdk_codestarconnections::Client::get_connection).then_error(|| {
            GetConnectionError::ResourceNotFoundException(
                ResourceNotFoundException::builder().build(),
            )
        });
        let provider = mocks::provider(Rules {
            codestar: vec![&not_found],
            ..Default::default()
        });
        let id = ResourceId::new("aws_codestarconnections_connection", "test");
        let state = provider
            .read_codestar_connection(&id, CONNECTION_ARN)
            .await
            .unwrap();
        assert!(!state.exists);
        assert_eq!(not_found.num_calls(), 1);
    }

    #[tokio::test]
    async fn deleting_a_missing_connection_succeeds() {
        let not_found = mock!(aws_sdk_codestarconnections::Client::delete_connection)
            .then_error(|| {
                DeleteConnectionError::ResourceNotFoundException(
                    ResourceNotFoundException::builder().build(),
                )
            });
        let provider = mocks::provider(Rules {
            codestar: vec![&not_found],
            ..Default::default()
        });
        let id = ResourceId::new("aws_codestarconnections_connection", "test");
        assert!(
            provider
                .delete_codestar_connection(id, CONNECTION_ARN)
                .await
                .is_ok()
        );
    }
}
