//! AWS resource schema definitions

pub mod codepipeline;
pub mod codestarconnections;
pub mod efs;
pub mod iam;
pub mod s3;
pub mod types;

use keel_core::schema::ResourceSchema;

/// Returns all AWS schemas
pub fn all_schemas() -> Vec<ResourceSchema> {
    let mut schemas = Vec::new();
    schemas.extend(codepipeline::schemas());
    schemas.extend(codestarconnections::schemas());
    schemas.extend(efs::schemas());
    schemas.extend(iam::schemas());
    schemas.extend(s3::schemas());
    schemas
}
