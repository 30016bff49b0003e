//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.
//! References are re-resolved before each step so that values produced
//! earlier in the same apply (a freshly created role's ARN, say) flow into
//! the resources that depend on them.

use log::{debug, info};

use crate::effect::Effect;
use crate::graph::{self, BindingMap};
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{Resource, ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted { id: ResourceId },
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<Result<EffectOutcome, ProviderError>>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip actual side effects
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
    bindings: BindingMap,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
            bindings: BindingMap::new(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    /// Values known before the apply starts (declarations merged with state)
    pub fn with_bindings(mut self, bindings: BindingMap) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;
        let mut bindings = self.bindings.clone();

        for effect in plan.effects() {
            let result = self.execute_effect(effect, &mut bindings).await;

            match &result {
                Ok(_) => success_count += 1,
                Err(_) => {
                    failure_count += 1;
                    if !self.config.continue_on_error {
                        outcomes.push(result);
                        break;
                    }
                }
            }

            outcomes.push(result);
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect
    async fn execute_effect(
        &self,
        effect: &Effect,
        bindings: &mut BindingMap,
    ) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        match effect {
            Effect::Read { resource } => {
                let resource = resolved(resource, bindings)?;
                debug!("reading data source {}", resource.id);
                let state = self.provider.read_data_source(&resource).await?;
                graph::record_state(bindings, &resource, &state);
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let resource = resolved(resource, bindings)?;
                info!("creating {}", resource.id);
                let state = self.provider.create(&resource).await?;
                graph::record_state(bindings, &resource, &state);
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let to = resolved(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                info!("updating {}", id);
                let state = self.provider.update(id, identifier, from, &to).await?;
                graph::record_state(bindings, &to, &state);
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                let to = resolved(to, bindings)?;
                let identifier = identifier_of(id, from)?;
                info!("replacing {} (delete, then create)", id);
                self.provider.delete(id, identifier, from).await?;
                let state = self.provider.create(&to).await?;
                graph::record_state(bindings, &to, &state);
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete { id, from } => {
                let identifier = identifier_of(id, from)?;
                info!("deleting {}", id);
                self.provider.delete(id, identifier, from).await?;
                bindings.remove(&id.binding());
                Ok(EffectOutcome::Deleted { id: id.clone() })
            }
        }
    }

    /// Re-read destroyed resources and return those that still exist
    pub async fn check_destroyed(
        &self,
        targets: &[(ResourceId, String)],
    ) -> ProviderResult<Vec<ResourceId>> {
        let mut remaining = Vec::new();
        for (id, identifier) in targets {
            let state = self.provider.read(id, Some(identifier)).await?;
            if state.exists {
                remaining.push(id.clone());
            }
        }
        Ok(remaining)
    }
}

fn resolved(resource: &Resource, bindings: &BindingMap) -> ProviderResult<Resource> {
    let resource = graph::resolve_resource(resource, bindings);
    if let Some((key, _)) = resource.attributes.iter().find(|(_, v)| v.has_refs()) {
        return Err(ProviderError::new(format!(
            "Attribute '{}' refers to a value that is not known yet",
            key
        ))
        .for_resource(resource.id.clone()));
    }
    Ok(resource)
}

fn identifier_of<'a>(id: &ResourceId, from: &'a State) -> ProviderResult<&'a str> {
    from.identifier.as_deref().ok_or_else(|| {
        ProviderError::new("No identifier recorded for this resource").for_resource(id.clone())
    })
}
