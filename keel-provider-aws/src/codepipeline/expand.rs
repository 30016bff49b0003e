//! Conversion between resource attributes and `PipelineDeclaration`

use std::collections::{BTreeMap, HashMap};

use keel_core::resource::Value;

use super::model::{
    Action, ArtifactStore, EncryptionKey, PipelineDeclaration, Stage, Variable,
};
use super::validate::PipelineError;

type Block = HashMap<String, Value>;

/// Build a declaration from resource attributes.
///
/// Schema validation has already run, so this only fails on values that
/// are missing or still unresolved.
pub fn expand(attributes: &Block) -> Result<PipelineDeclaration, PipelineError> {
    let artifact_stores = blocks(attributes, "artifact_store")?
        .iter()
        .map(|b| expand_artifact_store(b))
        .collect::<Result<Vec<_>, _>>()?;

    let stages = blocks(attributes, "stage")?
        .iter()
        .map(|b| expand_stage(b))
        .collect::<Result<Vec<_>, _>>()?;

    let variables = blocks(attributes, "variable")?
        .iter()
        .map(|b| {
            Ok(Variable {
                name: required_str(b, "variable.name", "name")?,
                description: optional_str(b, "description"),
                default_value: optional_str(b, "default_value"),
            })
        })
        .collect::<Result<Vec<_>, PipelineError>>()?;

    let execution_mode = match optional_str(attributes, "execution_mode") {
        Some(s) => s.parse().map_err(|message| PipelineError::InvalidAttribute {
            attribute: "execution_mode".to_string(),
            message,
        })?,
        None => Default::default(),
    };
    let pipeline_type = match optional_str(attributes, "pipeline_type") {
        Some(s) => s.parse().map_err(|message| PipelineError::InvalidAttribute {
            attribute: "pipeline_type".to_string(),
            message,
        })?,
        None => Default::default(),
    };

    Ok(PipelineDeclaration {
        name: required_str(attributes, "name", "name")?,
        role_arn: required_str(attributes, "role_arn", "role_arn")?,
        artifact_stores,
        stages,
        execution_mode,
        pipeline_type,
        variables,
        version: None,
    })
}

fn expand_artifact_store(block: &Block) -> Result<ArtifactStore, PipelineError> {
    let encryption_key = match block.get("encryption_key").and_then(Value::as_map) {
        Some(key) => Some(EncryptionKey {
            id: required_str(key, "artifact_store.encryption_key.id", "id")?,
            key_type: optional_str(key, "type").unwrap_or_else(|| "KMS".to_string()),
        }),
        None => None,
    };
    Ok(ArtifactStore {
        location: required_str(block, "artifact_store.location", "location")?,
        store_type: optional_str(block, "type").unwrap_or_else(|| "S3".to_string()),
        region: optional_str(block, "region"),
        encryption_key,
    })
}

fn expand_stage(block: &Block) -> Result<Stage, PipelineError> {
    let actions = blocks(block, "action")?
        .iter()
        .map(|b| expand_action(b))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(Stage {
        name: required_str(block, "stage.name", "name")?,
        actions,
    })
}

fn expand_action(block: &Block) -> Result<Action, PipelineError> {
    let run_order = match block.get("run_order") {
        Some(Value::Int(n)) => {
            i32::try_from(*n).map_err(|_| PipelineError::InvalidAttribute {
                attribute: "action.run_order".to_string(),
                message: format!("{} is out of range", n),
            })?
        }
        Some(other) if other.has_refs() => return Err(unresolved("action.run_order")),
        _ => Action::DEFAULT_RUN_ORDER,
    };

    let mut configuration = BTreeMap::new();
    if let Some(map) = block.get("configuration").and_then(Value::as_map) {
        for (key, value) in map {
            match value {
                Value::String(s) if !value.has_refs() => {
                    configuration.insert(key.clone(), s.clone());
                }
                _ => return Err(unresolved(&format!("action.configuration.{}", key))),
            }
        }
    }

    Ok(Action {
        name: required_str(block, "action.name", "name")?,
        category: required_str(block, "action.category", "category")?,
        owner: required_str(block, "action.owner", "owner")?,
        provider: required_str(block, "action.provider", "provider")?,
        version: required_str(block, "action.version", "version")?,
        input_artifacts: artifact_names(block, "input_artifacts"),
        output_artifacts: artifact_names(block, "output_artifacts"),
        configuration,
        run_order,
        region: optional_str(block, "region"),
        namespace: optional_str(block, "namespace"),
        role_arn: optional_str(block, "role_arn"),
    })
}

/// The API never reports empty artifact names, so they are not sent either
fn artifact_names(block: &Block, key: &str) -> Vec<String> {
    block
        .get(key)
        .and_then(Value::as_list)
        .unwrap_or_default()
        .iter()
        .filter_map(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn blocks<'a>(attributes: &'a Block, key: &str) -> Result<Vec<&'a Block>, PipelineError> {
    match attributes.get(key) {
        None => Ok(Vec::new()),
        Some(Value::List(items)) => items
            .iter()
            .map(|item| item.as_map().ok_or_else(|| unresolved(key)))
            .collect(),
        Some(Value::Map(map)) => Ok(vec![map]),
        Some(_) => Err(unresolved(key)),
    }
}

fn required_str(block: &Block, path: &str, key: &str) -> Result<String, PipelineError> {
    match block.get(key) {
        Some(value @ Value::String(s)) if !value.has_refs() => Ok(s.clone()),
        Some(value) if value.has_refs() => Err(unresolved(path)),
        _ => Err(PipelineError::MissingAttribute(path.to_string())),
    }
}

/// Empty strings count as unset
fn optional_str(block: &Block, key: &str) -> Option<String> {
    block
        .get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

fn unresolved(path: &str) -> PipelineError {
    PipelineError::InvalidAttribute {
        attribute: path.to_string(),
        message: "value is not known yet".to_string(),
    }
}

/// Attributes describing a declaration, without `arn` and `tags`
pub fn flatten(pipeline: &PipelineDeclaration) -> Block {
    let mut attributes = Block::new();
    attributes.insert("id".to_string(), Value::from(pipeline.name.as_str()));
    attributes.insert("name".to_string(), Value::from(pipeline.name.as_str()));
    attributes.insert(
        "role_arn".to_string(),
        Value::from(pipeline.role_arn.as_str()),
    );
    attributes.insert(
        "artifact_store".to_string(),
        Value::List(
            pipeline
                .artifact_stores
                .iter()
                .map(flatten_artifact_store)
                .collect(),
        ),
    );
    attributes.insert(
        "stage".to_string(),
        Value::List(pipeline.stages.iter().map(flatten_stage).collect()),
    );
    attributes.insert(
        "execution_mode".to_string(),
        Value::from(pipeline.execution_mode.as_str()),
    );
    attributes.insert(
        "pipeline_type".to_string(),
        Value::from(pipeline.pipeline_type.as_str()),
    );
    if !pipeline.variables.is_empty() {
        let variables = pipeline
            .variables
            .iter()
            .map(|v| {
                let mut block = Block::new();
                block.insert("name".to_string(), Value::from(v.name.as_str()));
                insert_opt(&mut block, "description", &v.description);
                insert_opt(&mut block, "default_value", &v.default_value);
                Value::Map(block)
            })
            .collect();
        attributes.insert("variable".to_string(), Value::List(variables));
    }
    attributes
}

fn flatten_artifact_store(store: &ArtifactStore) -> Value {
    let mut block = Block::new();
    block.insert("location".to_string(), Value::from(store.location.as_str()));
    block.insert("type".to_string(), Value::from(store.store_type.as_str()));
    insert_opt(&mut block, "region", &store.region);
    if let Some(key) = &store.encryption_key {
        let mut key_block = Block::new();
        key_block.insert("id".to_string(), Value::from(key.id.as_str()));
        key_block.insert("type".to_string(), Value::from(key.key_type.as_str()));
        block.insert("encryption_key".to_string(), Value::Map(key_block));
    }
    Value::Map(block)
}

fn flatten_stage(stage: &Stage) -> Value {
    let mut block = Block::new();
    block.insert("name".to_string(), Value::from(stage.name.as_str()));
    block.insert(
        "action".to_string(),
        Value::List(stage.actions.iter().map(flatten_action).collect()),
    );
    Value::Map(block)
}

fn flatten_action(action: &Action) -> Value {
    let mut block = Block::new();
    for (key, value) in [
        ("name", &action.name),
        ("category", &action.category),
        ("owner", &action.owner),
        ("provider", &action.provider),
        ("version", &action.version),
    ] {
        block.insert(key.to_string(), Value::from(value.as_str()));
    }
    block.insert("run_order".to_string(), Value::Int(action.run_order as i64));
    insert_opt(&mut block, "region", &action.region);
    insert_opt(&mut block, "namespace", &action.namespace);
    insert_opt(&mut block, "role_arn", &action.role_arn);
    for (key, names) in [
        ("input_artifacts", &action.input_artifacts),
        ("output_artifacts", &action.output_artifacts),
    ] {
        if !names.is_empty() {
            block.insert(
                key.to_string(),
                Value::List(names.iter().map(|n| Value::from(n.as_str())).collect()),
            );
        }
    }
    if !action.configuration.is_empty() {
        block.insert(
            "configuration".to_string(),
            Value::Map(
                action
                    .configuration
                    .iter()
                    .map(|(k, v)| (k.clone(), Value::from(v.as_str())))
                    .collect(),
            ),
        );
    }
    Value::Map(block)
}

fn insert_opt(block: &mut Block, key: &str, value: &Option<String>) {
    if let Some(v) = value {
        block.insert(key.to_string(), Value::from(v.as_str()));
    }
}
