//! `aws_iam_role` and `aws_iam_role_policy` resources

use std::collections::HashMap;

use aws_sdk_iam::types::Tag;
use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use keel_core::schema::types::json_document;
use log::{debug, info};

use crate::tags::{self, TagChanges, Tags};
use crate::{AwsProvider, api_error};

/// IAM returns policy documents URL-encoded
pub fn decode_policy(document: &str) -> String {
    urlencoding::decode(document)
        .map(|decoded| decoded.into_owned())
        .unwrap_or_else(|_| document.to_string())
}

/// `<role>:<policy>` identifier of an inline role policy
pub fn role_policy_identifier(role: &str, policy: &str) -> String {
    format!("{}:{}", role, policy)
}

pub fn parse_role_policy_identifier(identifier: &str) -> Option<(&str, &str)> {
    identifier
        .split_once(':')
        .filter(|(role, policy)| !role.is_empty() && !policy.is_empty())
}

fn required<'a>(resource: &'a Resource, key: &str) -> ProviderResult<&'a str> {
    resource.get_str(key).ok_or_else(|| {
        ProviderError::new(format!("'{}' is required", key)).for_resource(resource.id.clone())
    })
}

/// Fields of a role as reported by GetRole
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RoleSnapshot {
    pub name: String,
    pub arn: String,
    pub role_id: String,
    pub path: String,
    pub description: Option<String>,
    pub max_session_duration: Option<i32>,
    pub assume_role_policy: Option<String>,
    pub tags: Tags,
}

impl RoleSnapshot {
    pub fn attributes(&self) -> HashMap<String, Value> {
        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::from(self.name.as_str()));
        attributes.insert("name".to_string(), Value::from(self.name.as_str()));
        attributes.insert("arn".to_string(), Value::from(self.arn.as_str()));
        attributes.insert("unique_id".to_string(), Value::from(self.role_id.as_str()));
        attributes.insert("path".to_string(), Value::from(self.path.as_str()));
        if let Some(description) = &self.description {
            attributes.insert("description".to_string(), Value::from(description.as_str()));
        }
        if let Some(duration) = self.max_session_duration {
            attributes.insert(
                "max_session_duration".to_string(),
                Value::Int(duration as i64),
            );
        }
        if let Some(policy) = &self.assume_role_policy {
            attributes.insert(
                "assume_role_policy".to_string(),
                Value::from(decode_policy(policy)),
            );
        }
        attributes.insert("tags".to_string(), tags::to_value(&self.tags));
        attributes
    }
}

fn iam_tags(id: &ResourceId, tags: &Tags) -> ProviderResult<Vec<Tag>> {
    tags.iter()
        .map(|(k, v)| {
            Tag::builder().key(k).value(v).build().map_err(|e| {
                ProviderError::new(format!("Invalid tag '{}': {}", k, e)).for_resource(id.clone())
            })
        })
        .collect()
}

/// Policy documents are compared as JSON, not as text
fn policy_changed(from: &State, to: &Resource, key: &str) -> bool {
    match (from.attributes.get(key), to.attributes.get(key)) {
        (Some(a), Some(b)) => !json_document().values_equal(a, b),
        (None, None) => false,
        _ => true,
    }
}

impl AwsProvider {
    // ===== IAM Role =====

    pub(crate) async fn read_iam_role(&self, id: &ResourceId, name: &str) -> ProviderResult<State> {
        debug!("GetRole {}", name);
        let output = match self.iam.get_role().role_name(name).send().await {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                debug!("role {} not found", name);
                return Ok(State::not_found(id.clone()));
            }
            Err(err) => return Err(api_error("read role", id, err)),
        };
        let Some(role) = output.role() else {
            return Ok(State::not_found(id.clone()));
        };

        let snapshot = RoleSnapshot {
            name: role.role_name().to_string(),
            arn: role.arn().to_string(),
            role_id: role.role_id().to_string(),
            path: role.path().to_string(),
            description: role.description().map(str::to_string),
            max_session_duration: role.max_session_duration(),
            assume_role_policy: role.assume_role_policy_document().map(str::to_string),
            tags: role
                .tags()
                .iter()
                .map(|t| (t.key().to_string(), t.value().to_string()))
                .collect(),
        };
        Ok(State::existing(id.clone(), snapshot.attributes()).with_identifier(name))
    }

    pub(crate) async fn create_iam_role(&self, resource: Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let name = required(&resource, "name")?;
        let desired_tags = tags::from_value(resource.attributes.get("tags"));

        self.iam
            .create_role()
            .role_name(name)
            .assume_role_policy_document(required(&resource, "assume_role_policy")?)
            .path(resource.get_str("path").unwrap_or("/"))
            .set_description(resource.get_str("description").map(str::to_string))
            .set_max_session_duration(
                resource
                    .attributes
                    .get("max_session_duration")
                    .and_then(Value::as_int)
                    .map(|n| n as i32),
            )
            .set_tags(Some(iam_tags(&id, &desired_tags)?).filter(|t| !t.is_empty()))
            .send()
            .await
            .map_err(|e| api_error("create role", &id, e))?;
        info!("created role {}", name);

        self.read_iam_role(&id, name).await
    }

    pub(crate) async fn update_iam_role(
        &self,
        id: ResourceId,
        name: &str,
        from: &State,
        to: Resource,
    ) -> ProviderResult<State> {
        if policy_changed(from, &to, "assume_role_policy") {
            debug!("UpdateAssumeRolePolicy {}", name);
            self.iam
                .update_assume_role_policy()
                .role_name(name)
                .policy_document(required(&to, "assume_role_policy")?)
                .send()
                .await
                .map_err(|e| api_error("update assume role policy", &id, e))?;
        }

        let description = to.get_str("description");
        let duration = to
            .attributes
            .get("max_session_duration")
            .and_then(Value::as_int);
        if description != from.get_str("description")
            || duration
                != from
                    .attributes
                    .get("max_session_duration")
                    .and_then(Value::as_int)
        {
            debug!("UpdateRole {}", name);
            self.iam
                .update_role()
                .role_name(name)
                .description(description.unwrap_or_default())
                .set_max_session_duration(duration.map(|n| n as i32))
                .send()
                .await
                .map_err(|e| api_error("update role", &id, e))?;
        }

        let changes = TagChanges::between(
            &tags::from_value(from.attributes.get("tags")),
            &tags::from_value(to.attributes.get("tags")),
        );
        if !changes.to_remove.is_empty() {
            self.iam
                .untag_role()
                .role_name(name)
                .set_tag_keys(Some(changes.to_remove.clone()))
                .send()
                .await
                .map_err(|e| api_error("untag role", &id, e))?;
        }
        if !changes.to_add.is_empty() {
            self.iam
                .tag_role()
                .role_name(name)
                .set_tags(Some(iam_tags(&id, &changes.to_add)?))
                .send()
                .await
                .map_err(|e| api_error("tag role", &id, e))?;
        }

        info!("updated role {}", name);
        self.read_iam_role(&id, name).await
    }

    /// Inline policies and attached managed policies go first; IAM refuses
    /// to delete a role that still has them.
    pub(crate) async fn delete_iam_role(&self, id: ResourceId, name: &str) -> ProviderResult<()> {
        let inline = match self.inline_policy_names(&id, name).await? {
            Some(names) => names,
            None => {
                debug!("role {} already gone", name);
                return Ok(());
            }
        };
        for policy in inline {
            debug!("DeleteRolePolicy {}:{}", name, policy);
            self.iam
                .delete_role_policy()
                .role_name(name)
                .policy_name(&policy)
                .send()
                .await
                .map_err(|e| api_error("delete inline role policy", &id, e))?;
        }

        let attached = self
            .iam
            .list_attached_role_policies()
            .role_name(name)
            .send()
            .await
            .map_err(|e| api_error("list attached role policies", &id, e))?;
        for policy_arn in attached
            .attached_policies()
            .iter()
            .filter_map(|p| p.policy_arn())
        {
            debug!("DetachRolePolicy {} {}", name, policy_arn);
            self.iam
                .detach_role_policy()
                .role_name(name)
                .policy_arn(policy_arn)
                .send()
                .await
                .map_err(|e| api_error("detach role policy", &id, e))?;
        }

        match self.iam.delete_role().role_name(name).send().await {
            Ok(_) => {
                info!("deleted role {}", name);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(api_error("delete role", &id, err)),
        }
    }

    /// `None` when the role does not exist
    async fn inline_policy_names(
        &self,
        id: &ResourceId,
        role: &str,
    ) -> ProviderResult<Option<Vec<String>>> {
        let mut names = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let output = match self
                .iam
                .list_role_policies()
                .role_name(role)
                .set_marker(marker.take())
                .send()
                .await
            {
                Ok(output) => output,
                Err(err)
                    if err
                        .as_service_error()
                        .is_some_and(|e| e.is_no_such_entity_exception()) =>
                {
                    return Ok(None);
                }
                Err(err) => return Err(api_error("list role policies", id, err)),
            };
            names.extend(output.policy_names().iter().cloned());
            match output.marker() {
                Some(next) if output.is_truncated() => marker = Some(next.to_string()),
                _ => break,
            }
        }
        Ok(Some(names))
    }

    // ===== IAM Role Policy =====

    pub(crate) async fn read_iam_role_policy(
        &self,
        id: &ResourceId,
        identifier: &str,
    ) -> ProviderResult<State> {
        let Some((role, policy)) = parse_role_policy_identifier(identifier) else {
            return Err(ProviderError::new(format!(
                "Invalid role policy ID '{}', expected <role>:<policy>",
                identifier
            ))
            .for_resource(id.clone()));
        };

        debug!("GetRolePolicy {}", identifier);
        let output = match self
            .iam
            .get_role_policy()
            .role_name(role)
            .policy_name(policy)
            .send()
            .await
        {
            Ok(output) => output,
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                debug!("role policy {} not found", identifier);
                return Ok(State::not_found(id.clone()));
            }
            Err(err) => return Err(api_error("read role policy", id, err)),
        };

        let mut attributes = HashMap::new();
        attributes.insert("id".to_string(), Value::from(identifier));
        attributes.insert("role".to_string(), Value::from(output.role_name()));
        attributes.insert("name".to_string(), Value::from(output.policy_name()));
        attributes.insert(
            "policy".to_string(),
            Value::from(decode_policy(output.policy_document())),
        );
        Ok(State::existing(id.clone(), attributes).with_identifier(identifier))
    }

    async fn put_iam_role_policy(&self, resource: &Resource) -> ProviderResult<String> {
        let role = required(resource, "role")?;
        let name = required(resource, "name")?;
        self.iam
            .put_role_policy()
            .role_name(role)
            .policy_name(name)
            .policy_document(required(resource, "policy")?)
            .send()
            .await
            .map_err(|e| api_error("put role policy", &resource.id, e))?;
        Ok(role_policy_identifier(role, name))
    }

    pub(crate) async fn create_iam_role_policy(&self, resource: Resource) -> ProviderResult<State> {
        let identifier = self.put_iam_role_policy(&resource).await?;
        info!("created role policy {}", identifier);
        self.read_iam_role_policy(&resource.id, &identifier).await
    }

    /// Only the document can change in place
    pub(crate) async fn update_iam_role_policy(&self, to: Resource) -> ProviderResult<State> {
        let identifier = self.put_iam_role_policy(&to).await?;
        info!("updated role policy {}", identifier);
        self.read_iam_role_policy(&to.id, &identifier).await
    }

    pub(crate) async fn delete_iam_role_policy(
        &self,
        id: ResourceId,
        identifier: &str,
    ) -> ProviderResult<()> {
        let Some((role, policy)) = parse_role_policy_identifier(identifier) else {
            return Err(ProviderError::new(format!(
                "Invalid role policy ID '{}', expected <role>:<policy>",
                identifier
            ))
            .for_resource(id));
        };
        match self
            .iam
            .delete_role_policy()
            .role_name(role)
            .policy_name(policy)
            .send()
            .await
        {
            Ok(_) => {
                info!("deleted role policy {}", identifier);
                Ok(())
            }
            Err(err)
                if err
                    .as_service_error()
                    .is_some_and(|e| e.is_no_such_entity_exception()) =>
            {
                Ok(())
            }
            Err(err) => Err(api_error("delete role policy", &id, err)),
        }
    }
}
