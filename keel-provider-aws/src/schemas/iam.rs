//! IAM role and inline role policy schema definitions

use keel_core::resource::Value;
use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

/// Returns the schema for IAM roles
pub fn role_schema() -> ResourceSchema {
    ResourceSchema::new("aws_iam_role")
        .with_description("An IAM role")
        .attribute(
            AttributeSchema::new("name", aws_types::iam_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("assume_role_policy", types::json_document())
                .required()
                .with_description("Trust policy document"),
        )
        .attribute(AttributeSchema::new("description", AttributeType::String))
        .attribute(
            AttributeSchema::new("path", AttributeType::String)
                .force_new()
                .with_default(Value::from("/")),
        )
        .attribute(
            AttributeSchema::new("max_session_duration", aws_types::max_session_duration())
                .with_default(Value::Int(3600)),
        )
        .attribute(AttributeSchema::new("tags", types::tags()))
        .attribute(AttributeSchema::new("arn", aws_types::arn()).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("unique_id", AttributeType::String).computed())
}

/// Returns the schema for inline role policies
pub fn role_policy_schema() -> ResourceSchema {
    ResourceSchema::new("aws_iam_role_policy")
        .with_description("An inline policy embedded in an IAM role")
        .attribute(
            AttributeSchema::new("name", aws_types::iam_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("role", aws_types::iam_name())
                .required()
                .force_new()
                .with_description("Name of the role the policy belongs to"),
        )
        .attribute(AttributeSchema::new("policy", types::json_document()).required())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
}

/// Returns all IAM-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![role_schema(), role_policy_schema()]
}
