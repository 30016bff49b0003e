//! CodePipeline schema definition

use keel_core::resource::Value;
use keel_core::schema::{AttributeSchema, AttributeType, ResourceSchema, types};

use super::types as aws_types;
use crate::codepipeline::model::{ExecutionMode, PipelineType};

fn enum_of(values: &[&str]) -> AttributeType {
    AttributeType::Enum(values.iter().map(|s| s.to_string()).collect())
}

fn string_list() -> AttributeType {
    AttributeType::List(Box::new(AttributeType::String))
}

fn encryption_key_block() -> AttributeType {
    AttributeType::Struct {
        name: "encryption_key".to_string(),
        fields: vec![
            AttributeSchema::new("id", AttributeType::String).required(),
            AttributeSchema::new("type", enum_of(&["KMS"]))
                .required()
                .with_default(Value::from("KMS")),
        ],
    }
}

fn artifact_store_block() -> AttributeType {
    AttributeType::Struct {
        name: "artifact_store".to_string(),
        fields: vec![
            AttributeSchema::new("location", AttributeType::String)
                .required()
                .with_description("S3 bucket holding pipeline artifacts"),
            AttributeSchema::new("type", enum_of(&["S3"]))
                .required()
                .with_default(Value::from("S3")),
            AttributeSchema::new("region", aws_types::aws_region())
                .with_description("Required on every store of a cross-region pipeline"),
            AttributeSchema::new("encryption_key", encryption_key_block()),
        ],
    }
}

fn action_block() -> AttributeType {
    AttributeType::Struct {
        name: "action".to_string(),
        fields: vec![
            AttributeSchema::new("name", AttributeType::String).required(),
            AttributeSchema::new(
                "category",
                enum_of(&[
                    "Source", "Build", "Deploy", "Test", "Invoke", "Approval", "Compute",
                ]),
            )
            .required(),
            AttributeSchema::new("owner", enum_of(&["AWS", "ThirdParty", "Custom"])).required(),
            AttributeSchema::new("provider", AttributeType::String).required(),
            AttributeSchema::new("version", AttributeType::String).required(),
            AttributeSchema::new("input_artifacts", string_list()),
            AttributeSchema::new("output_artifacts", string_list()),
            AttributeSchema::new(
                "configuration",
                AttributeType::Map(Box::new(AttributeType::String)),
            )
            .sensitive()
            .with_description("Provider-specific settings; secrets come back as \"****\""),
            AttributeSchema::new("run_order", types::positive_int())
                .with_default(Value::Int(1)),
            AttributeSchema::new("region", aws_types::aws_region()),
            AttributeSchema::new("namespace", AttributeType::String),
            AttributeSchema::new("role_arn", aws_types::arn()),
        ],
    }
}

fn stage_block() -> AttributeType {
    AttributeType::Struct {
        name: "stage".to_string(),
        fields: vec![
            AttributeSchema::new("name", AttributeType::String).required(),
            AttributeSchema::new("action", AttributeType::List(Box::new(action_block())))
                .required(),
        ],
    }
}

fn variable_block() -> AttributeType {
    AttributeType::Struct {
        name: "variable".to_string(),
        fields: vec![
            AttributeSchema::new("name", AttributeType::String).required(),
            AttributeSchema::new("default_value", AttributeType::String),
            AttributeSchema::new("description", AttributeType::String),
        ],
    }
}

/// Returns the schema for CodePipeline pipelines
pub fn pipeline_schema() -> ResourceSchema {
    ResourceSchema::new("aws_codepipeline")
        .with_description("A CodePipeline pipeline")
        .attribute(
            AttributeSchema::new("name", aws_types::pipeline_name())
                .required()
                .force_new(),
        )
        .attribute(AttributeSchema::new("role_arn", aws_types::arn()).required())
        .attribute(
            AttributeSchema::new(
                "artifact_store",
                AttributeType::Set(Box::new(artifact_store_block())),
            )
            .required(),
        )
        .attribute(
            AttributeSchema::new("stage", AttributeType::List(Box::new(stage_block())))
                .required(),
        )
        .attribute(
            AttributeSchema::new("execution_mode", enum_of(&ExecutionMode::ALL))
                .with_default(Value::from(ExecutionMode::default().as_str())),
        )
        .attribute(
            AttributeSchema::new("pipeline_type", enum_of(&PipelineType::ALL))
                .with_default(Value::from(PipelineType::default().as_str())),
        )
        .attribute(
            AttributeSchema::new("variable", AttributeType::List(Box::new(variable_block())))
                .with_description("Only valid with pipeline_type = \"V2\""),
        )
        .attribute(AttributeSchema::new("tags", types::tags()))
        .attribute(AttributeSchema::new("arn", aws_types::arn()).computed())
        .attribute(AttributeSchema::new("id", AttributeType::String).computed())
}

/// Returns all CodePipeline-related schemas
pub fn schemas() -> Vec<ResourceSchema> {
    vec![pipeline_schema()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn block(entries: &[(&str, Value)]) -> Value {
        Value::Map(
            entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        )
    }

    fn action(name: &str) -> Value {
        block(&[
            ("name", Value::from(name)),
            ("category", Value::from("Build")),
            ("owner", Value::from("AWS")),
            ("provider", Value::from("CodeBuild")),
            ("version", Value::from("1")),
        ])
    }

    fn attributes() -> HashMap<String, Value> {
        let mut attrs = HashMap::new();
        attrs.insert("name".to_string(), Value::from("tf-test-pipeline"));
        attrs.insert(
            "role_arn".to_string(),
            Value::ResourceRef("aws_iam_role.codepipeline_role".to_string(), "arn".to_string()),
        );
        attrs.insert(
            "artifact_store".to_string(),
            Value::List(vec![block(&[("location", Value::from("bucket"))])]),
        );
        attrs.insert(
            "stage".to_string(),
            Value::List(vec![block(&[
                ("name", Value::from("Build")),
                ("action", Value::List(vec![action("Build")])),
            ])]),
        );
        attrs
    }

    #[test]
    fn valid_pipeline() {
        assert!(pipeline_schema().validate(&attributes()).is_ok());
    }

    #[test]
    fn unknown_category_is_rejected() {
        let mut attrs = attributes();
        let mut bad = action("Build");
        if let Value::Map(m) = &mut bad {
            m.insert("category".to_string(), Value::from("Compile"));
        }
        attrs.insert(
            "stage".to_string(),
            Value::List(vec![block(&[
                ("name", Value::from("Build")),
                ("action", Value::List(vec![bad])),
            ])]),
        );
        assert!(pipeline_schema().validate(&attrs).is_err());
    }

    #[test]
    fn defaults_fill_nested_blocks() {
        let filled = pipeline_schema().apply_defaults(&attributes());
        assert_eq!(filled["execution_mode"], Value::from("SUPERSEDED"));
        assert_eq!(filled["pipeline_type"], Value::from("V1"));
        let store = filled["artifact_store"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(store["type"], Value::from("S3"));
        let stage = filled["stage"].as_list().unwrap()[0].as_map().unwrap();
        let action = stage["action"].as_list().unwrap()[0].as_map().unwrap();
        assert_eq!(action["run_order"], Value::Int(1));
    }

    #[test]
    fn name_forces_replacement() {
        assert_eq!(pipeline_schema().force_new_attributes(), vec!["name"]);
    }
}
