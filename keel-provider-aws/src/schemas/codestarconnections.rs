//! CodeStar connection schema definition

use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

/// Returns the schema for CodeStar connections
pub fn connection_schema() -> ResourceSchema {
    ResourceSchema::new("aws_codestarconnections_connection")
        .with_description("A connection to an external source provider")
        .attribute(
            AttributeSchema::new("name", AttributeType::String)
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("provider_type", aws_types::connection_provider_type())
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("host_arn", aws_types::arn())
                .force_new()
                .with_description("Host of a self-managed provider such as GitHubEnterpriseServer"),
        )
        .attribute(AttributeSchema::new("tags", types::tags()))
        .attribute(AttributeSchema::new("arn", aws_types::arn()).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("connection_status", AttributeType::String).computed())
        .attribute(AttributeSchema::new("owner_account_id", AttributeType::String).computed())
}

pub fn schemas() -> Vec<ResourceSchema> {
    vec![connection_schema()]
}
