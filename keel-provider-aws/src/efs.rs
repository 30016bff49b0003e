//! `aws_efs_mount_target` data source

use std::collections::HashMap;

use keel_core::provider::{ProviderError, ProviderResult};
use keel_core::resource::{Resource, ResourceId, State, Value};
use log::debug;

use crate::arn::{self, CallerIdentity};
use crate::{AwsProvider, api_error};

/// Lookup arguments; DescribeMountTargets takes any one of them
const LOOKUP_KEYS: [&str; 3] = ["access_point_id", "file_system_id", "mount_target_id"];

/// The fields of a mount target this data source reports
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MountTarget {
    pub mount_target_id: String,
    pub file_system_id: String,
    pub subnet_id: String,
    pub availability_zone_id: Option<String>,
    pub availability_zone_name: Option<String>,
    pub ip_address: Option<String>,
    pub network_interface_id: Option<String>,
    pub owner_id: Option<String>,
}

fn dns_suffix(partition: &str) -> &'static str {
    match partition {
        "aws-cn" => "amazonaws.com.cn",
        _ => "amazonaws.com",
    }
}

/// `<fs-id>.efs.<region>.<suffix>`
pub fn dns_name(file_system_id: &str, region: &str, partition: &str) -> String {
    format!(
        "{}.efs.{}.{}",
        file_system_id,
        region,
        dns_suffix(partition)
    )
}

/// `<az-name>.<fs-id>.efs.<region>.<suffix>`
pub fn mount_target_dns_name(
    availability_zone_name: &str,
    file_system_id: &str,
    region: &str,
    partition: &str,
) -> String {
    format!(
        "{}.{}",
        availability_zone_name,
        dns_name(file_system_id, region, partition)
    )
}

pub fn file_system_arn(caller: &CallerIdentity, region: &str, file_system_id: &str) -> String {
    arn::regional(
        caller,
        "elasticfilesystem",
        region,
        &format!("file-system/{}", file_system_id),
    )
}

/// The lookup must match exactly one mount target
pub fn single_match(mut matches: Vec<MountTarget>) -> Result<MountTarget, String> {
    match matches.len() {
        1 => Ok(matches.remove(0)),
        0 => Err("Search returned no EFS mount targets".to_string()),
        n => Err(format!(
            "Search returned {} EFS mount targets, use more specific arguments",
            n
        )),
    }
}

/// Data source attributes: the lookup arguments plus everything computed
pub fn mount_target_attributes(
    target: &MountTarget,
    security_groups: &[String],
    access_point_id: Option<&str>,
    caller: &CallerIdentity,
    region: &str,
) -> HashMap<String, Value> {
    let mut attributes = HashMap::new();
    let mut put = |key: &str, value: &str| {
        attributes.insert(key.to_string(), Value::from(value));
    };

    put("id", &target.mount_target_id);
    put("mount_target_id", &target.mount_target_id);
    put("file_system_id", &target.file_system_id);
    put("subnet_id", &target.subnet_id);
    put(
        "file_system_arn",
        &file_system_arn(caller, region, &target.file_system_id),
    );
    put(
        "dns_name",
        &dns_name(&target.file_system_id, region, &caller.partition),
    );
    for (key, value) in [
        ("availability_zone_id", &target.availability_zone_id),
        ("availability_zone_name", &target.availability_zone_name),
        ("ip_address", &target.ip_address),
        ("network_interface_id", &target.network_interface_id),
        ("owner_id", &target.owner_id),
    ] {
        if let Some(v) = value {
            put(key, v);
        }
    }
    if let Some(az) = &target.availability_zone_name {
        put(
            "mount_target_dns_name",
            &mount_target_dns_name(az, &target.file_system_id, region, &caller.partition),
        );
    }
    if let Some(access_point_id) = access_point_id {
        put("access_point_id", access_point_id);
    }

    attributes.insert(
        "security_groups".to_string(),
        Value::List(
            security_groups
                .iter()
                .map(|s| Value::from(s.as_str()))
                .collect(),
        ),
    );
    attributes
}

impl AwsProvider {
    // ===== EFS =====

    pub(crate) async fn read_efs_mount_target(&self, resource: Resource) -> ProviderResult<State> {
        let id = resource.id.clone();
        let lookup = |key: &str| resource.get_str(key).map(str::to_string);
        if LOOKUP_KEYS.iter().all(|&key| lookup(key).is_none()) {
            return Err(ProviderError::new(format!(
                "One of {} is required",
                LOOKUP_KEYS.join(", ")
            ))
            .for_resource(id));
        }
        let access_point_id = lookup("access_point_id");

        let matches = self
            .describe_mount_targets(
                &id,
                access_point_id.clone(),
                lookup("file_system_id"),
                lookup("mount_target_id"),
            )
            .await?;
        let target =
            single_match(matches).map_err(|msg| ProviderError::new(msg).for_resource(id.clone()))?;

        debug!("DescribeMountTargetSecurityGroups {}", target.mount_target_id);
        let security_groups = self
            .efs
            .describe_mount_target_security_groups()
            .mount_target_id(&target.mount_target_id)
            .send()
            .await
            .map_err(|e| api_error("read mount target security groups", &id, e))?
            .security_groups()
            .to_vec();

        let caller = self.caller_identity().await?;
        let attributes = mount_target_attributes(
            &target,
            &security_groups,
            access_point_id.as_deref(),
            caller,
            &self.region,
        );
        Ok(State::existing(id, attributes).with_identifier(target.mount_target_id.as_str()))
    }

    async fn describe_mount_targets(
        &self,
        id: &ResourceId,
        access_point_id: Option<String>,
        file_system_id: Option<String>,
        mount_target_id: Option<String>,
    ) -> ProviderResult<Vec<MountTarget>> {
        let mut found = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            debug!("DescribeMountTargets");
            let result = self
                .efs
                .describe_mount_targets()
                .set_access_point_id(access_point_id.clone())
                .set_file_system_id(file_system_id.clone())
                .set_mount_target_id(mount_target_id.clone())
                .set_marker(marker.take())
                .send()
                .await;
            let output = match result {
                Ok(output) => output,
                Err(err)
                    if err.as_service_error().is_some_and(|e| {
                        e.is_mount_target_not_found()
                            || e.is_file_system_not_found()
                            || e.is_access_point_not_found()
                    }) =>
                {
                    return Ok(found);
                }
                Err(err) => return Err(api_error("describe mount targets", id, err)),
            };

            found.extend(output.mount_targets().iter().map(|t| MountTarget {
                mount_target_id: t.mount_target_id().to_string(),
                file_system_id: t.file_system_id().to_string(),
                subnet_id: t.subnet_id().to_string(),
                availability_zone_id: t.availability_zone_id().map(str::to_string),
                availability_zone_name: t.availability_zone_name().map(str::to_string),
                ip_address: t.ip_address().map(str::to_string),
                network_interface_id: t.network_interface_id().map(str::to_string),
                owner_id: t.owner_id().map(str::to_string),
            }));

            match output.next_marker() {
                Some(next) => marker = Some(next.to_string()),
                None => break,
            }
        }
        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caller() -> CallerIdentity {
        CallerIdentity {
            account_id: "123456789012".to_string(),
            partition: "aws".to_string(),
        }
    }

    fn target() -> MountTarget {
        MountTarget {
            mount_target_id: "fsmt-12345678".to_string(),
            file_system_id: "fs-12345678".to_string(),
            subnet_id: "subnet-12345678".to_string(),
            availability_zone_id: Some("usw2-az1".to_string()),
            availability_zone_name: Some("us-west-2a".to_string()),
            ip_address: Some("10.0.1.10".to_string()),
            network_interface_id: Some("eni-12345678".to_string()),
            owner_id: Some("123456789012".to_string()),
        }
    }

    #[test]
    fn derives_dns_names_and_arn() {
        assert_eq!(
            dns_name("fs-12345678", "us-west-2", "aws"),
            "fs-12345678.efs.us-west-2.amazonaws.com"
        );
        assert_eq!(
            mount_target_dns_name("us-west-2a", "fs-12345678", "us-west-2", "aws"),
            "us-west-2a.fs-12345678.efs.us-west-2.amazonaws.com"
        );
        assert_eq!(
            dns_name("fs-1", "cn-north-1", "aws-cn"),
            "fs-1.efs.cn-north-1.amazonaws.com.cn"
        );
        assert_eq!(
            file_system_arn(&caller(), "us-west-2", "fs-12345678"),
            "arn:aws:elasticfilesystem:us-west-2:123456789012:file-system/fs-12345678"
        );
    }

    #[test]
    fn exactly_one_match_is_required() {
        assert_eq!(single_match(vec![target()]), Ok(target()));
        assert_eq!(
            single_match(vec![]),
            Err("Search returned no EFS mount targets".to_string())
        );
        assert!(
            single_match(vec![target(), target()])
                .unwrap_err()
                .starts_with("Search returned 2 EFS mount targets")
        );
    }

    #[test]
    fn attributes_cover_computed_fields() {
        let groups = vec!["sg-1".to_string(), "sg-2".to_string()];
        let attrs = mount_target_attributes(&target(), &groups, Some("fsap-1"), &caller(), "us-west-2");
        assert_eq!(attrs["id"], Value::from("fsmt-12345678"));
        assert_eq!(attrs["access_point_id"], Value::from("fsap-1"));
        assert_eq!(
            attrs["mount_target_dns_name"],
            Value::from("us-west-2a.fs-12345678.efs.us-west-2.amazonaws.com")
        );
        assert_eq!(attrs["security_groups"].as_list().unwrap().len(), 2);
        assert_eq!(attrs["owner_id"], Value::from("123456789012"));
    }

    #[test]
    fn optional_fields_may_be_absent() {
        let bare = MountTarget {
            mount_target_id: "fsmt-1".to_string(),
            file_system_id: "fs-1".to_string(),
            subnet_id: "subnet-1".to_string(),
            ..Default::default()
        };
        let attrs = mount_target_attributes(&bare, &[], None, &caller(), "us-west-2");
        assert!(attrs.get("mount_target_dns_name").is_none());
        assert!(attrs.get("access_point_id").is_none());
        assert_eq!(attrs["dns_name"], Value::from("fs-1.efs.us-west-2.amazonaws.com"));
    }
}
