//! S3 bucket schema definition

use keel_core::resource::Value;
use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;

/// Returns the schema for S3 buckets
pub fn bucket_schema() -> ResourceSchema {
    ResourceSchema::new("aws_s3_bucket")
        .with_description("An S3 bucket for object storage")
        .attribute(
            AttributeSchema::new("bucket", aws_types::s3_bucket_name())
                .required()
                .force_new(),
        )
        .attribute(
            AttributeSchema::new("force_destroy", AttributeType::Bool)
                .with_default(Value::Bool(false))
                .with_description("Delete all objects and versions before deleting the bucket"),
        )
        .attribute(
            AttributeSchema::new("versioning", aws_types::versioning_status())
                .with_default(Value::from("Suspended"))
                .with_description("Versioning status of the bucket"),
        )
        .attribute(AttributeSchema::new("tags", types::tags()))
        .attribute(AttributeSchema::new("arn", aws_types::arn()).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
        .attribute(AttributeSchema::new("region", aws_types::aws_region()).computed())
}

/// Returns all S3-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![bucket_schema()]
}
