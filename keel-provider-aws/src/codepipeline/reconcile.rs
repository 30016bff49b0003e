//! Pipeline reconciler
//!
//! Decides how a live pipeline converges on its declaration. UpdatePipeline
//! takes the whole declaration, so any change to stores, stages, actions,
//! execution mode, pipeline type or variables is carried by one full
//! declaration. Only a rename needs a new pipeline. Tags live on the
//! pipeline ARN and are converged with separate tag/untag calls.
//!
//! The API masks secret configuration values. Callers restore them from the
//! declaration recorded in state before reconciling, so a masked value left
//! in `observed` is unknown and counts as a change.

use super::model::{ArtifactStore, PipelineDeclaration};
use crate::tags::{TagChanges, Tags};

#[derive(Debug, Clone, PartialEq)]
pub struct Reconciliation {
    /// Attribute names that differ, in schema order
    pub changed: Vec<&'static str>,
    pub requires_replace: bool,
    /// Declaration to send with UpdatePipeline, if the declaration changed
    pub update: Option<PipelineDeclaration>,
    pub tags: TagChanges,
}

impl Reconciliation {
    pub fn is_noop(&self) -> bool {
        self.changed.is_empty() && self.tags.is_empty()
    }
}

pub fn reconcile(
    desired: &PipelineDeclaration,
    observed: &PipelineDeclaration,
    desired_tags: &Tags,
    observed_tags: &Tags,
) -> Reconciliation {
    let mut changed = Vec::new();

    if desired.name != observed.name {
        changed.push("name");
    }
    if desired.role_arn != observed.role_arn {
        changed.push("role_arn");
    }
    if !same_stores(&desired.artifact_stores, &observed.artifact_stores) {
        changed.push("artifact_store");
    }
    if desired.stages != observed.stages {
        changed.push("stage");
    }
    if desired.execution_mode != observed.execution_mode {
        changed.push("execution_mode");
    }
    if desired.pipeline_type != observed.pipeline_type {
        changed.push("pipeline_type");
    }
    if desired.variables != observed.variables {
        changed.push("variable");
    }

    let requires_replace = changed.contains(&"name");
    let declaration_changed = changed.iter().any(|attr| *attr != "name");
    let update = (!requires_replace && declaration_changed).then(|| PipelineDeclaration {
        version: observed.version,
        ..desired.clone()
    });

    Reconciliation {
        changed,
        requires_replace,
        update,
        tags: TagChanges::between(observed_tags, desired_tags),
    }
}

/// Stores are matched by region, so their order does not matter
fn same_stores(desired: &[ArtifactStore], observed: &[ArtifactStore]) -> bool {
    desired.len() == observed.len()
        && desired.iter().all(|d| {
            observed
                .iter()
                .find(|o| o.region == d.region)
                .is_some_and(|o| o == d)
        })
}
