//! EFS data source schema definitions

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema};

use super::types as aws_types;

/// Returns the schema for the mount target data source
pub fn mount_target_schema() -> ResourceSchema {
    let computed = |name: &str| AttributeSchema::new(name, AttributeType::String).computed();

    ResourceSchema::data_source("aws_efs_mount_target")
        .with_description("Looks up a single EFS mount target")
        .attribute(AttributeSchema::new("access_point_id", AttributeType::String))
        .attribute(AttributeSchema::new("file_system_id", AttributeType::String))
        .attribute(AttributeSchema::new("mount_target_id", AttributeType::String))
        .attribute(computed("availability_zone_id"))
        .attribute(computed("availability_zone_name"))
        .attribute(computed("dns_name"))
        .attribute(AttributeSchema::new("file_system_arn", aws_types::arn()).computed())
        .attribute(computed("id"))
        .attribute(computed("ip_address"))
        .attribute(computed("mount_target_dns_name"))
        .attribute(computed("network_interface_id"))
        .attribute(computed("owner_id"))
        .attribute(
            AttributeSchema::new(
                "security_groups",
                AttributeType::Set(Box::new(AttributeType::String)),
            )
            .computed(),
        )
        .attribute(computed("subnet_id"))
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![mount_target_schema()]
}
