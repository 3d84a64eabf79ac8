//! Interpreter - Execute Effects using a Provider
//!
//! The Interpreter executes Effects contained in a Plan in order,
//! collecting the results. This is where side effects actually occur.

use std::ops::ControlFlow;

use log::info;

use crate::effect::Effect;
use crate::finder::ignore_not_found;
use crate::plan::Plan;
use crate::provider::{Provider, ProviderError, ProviderResult};
use crate::resource::{ResourceId, State};

/// Result of executing each Effect
#[derive(Debug)]
pub enum EffectOutcome {
    /// Read succeeded
    Read { state: State },
    /// Create succeeded
    Created { state: State },
    /// Update succeeded
    Updated { state: State },
    /// Delete and re-create succeeded
    Replaced { state: State },
    /// Delete succeeded
    Deleted,
    /// Skipped (e.g., dry-run)
    Skipped { reason: String },
}

/// Result of executing the entire Plan
#[derive(Debug)]
pub struct ApplyResult {
    pub outcomes: Vec<(ResourceId, Result<EffectOutcome, ProviderError>)>,
    pub success_count: usize,
    pub failure_count: usize,
}

impl ApplyResult {
    pub fn is_success(&self) -> bool {
        self.failure_count == 0
    }
}

/// Callbacks around each effect of [`Interpreter::apply_with`]
pub trait ApplyHooks {
    /// Rewrite an effect before it runs. An error fails the effect without
    /// reaching the provider.
    fn prepare(&mut self, effect: &Effect) -> ProviderResult<Effect> {
        Ok(effect.clone())
    }

    /// Observe the result of an effect. `Break` stops the apply.
    fn finished(
        &mut self,
        _effect: &Effect,
        _result: &ProviderResult<EffectOutcome>,
    ) -> ControlFlow<()> {
        ControlFlow::Continue(())
    }
}

impl ApplyHooks for () {}

/// Interpreter configuration
#[derive(Debug, Clone, Default)]
pub struct InterpreterConfig {
    /// If true, skip effects that change the cloud. Data source reads still run.
    pub dry_run: bool,
    /// Continue on error
    pub continue_on_error: bool,
}

/// Interpreter that executes Effects using a Provider
pub struct Interpreter<P: Provider> {
    provider: P,
    config: InterpreterConfig,
}

impl<P: Provider> Interpreter<P> {
    pub fn new(provider: P) -> Self {
        Self {
            provider,
            config: InterpreterConfig::default(),
        }
    }

    pub fn with_config(mut self, config: InterpreterConfig) -> Self {
        self.config = config;
        self
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn config(&self) -> &InterpreterConfig {
        &self.config
    }

    /// Execute a Plan, interpreting all Effects and causing side effects
    pub async fn apply(&self, plan: &Plan) -> ApplyResult {
        self.apply_with(plan, &mut ()).await
    }

    /// Execute a Plan, calling `hooks` around every effect
    pub async fn apply_with<H: ApplyHooks>(&self, plan: &Plan, hooks: &mut H) -> ApplyResult {
        let mut outcomes = Vec::new();
        let mut success_count = 0;
        let mut failure_count = 0;

        for effect in plan.effects() {
            let id = effect.resource_id().clone();
            let (effect, result) = match hooks.prepare(effect) {
                Ok(prepared) => {
                    let result = self.execute(&prepared).await;
                    (prepared, result)
                }
                Err(e) => (effect.clone(), Err(e.for_resource(id.clone()))),
            };
            let failed = result.is_err();
            if failed {
                failure_count += 1;
            } else {
                success_count += 1;
            }
            let flow = hooks.finished(&effect, &result);
            outcomes.push((id, result));

            if flow.is_break() || (failed && !self.config.continue_on_error) {
                break;
            }
        }

        ApplyResult {
            outcomes,
            success_count,
            failure_count,
        }
    }

    /// Execute a single Effect. Errors carry the resource id.
    pub async fn execute(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        if self.config.dry_run && effect.is_mutating() {
            return Ok(EffectOutcome::Skipped {
                reason: "dry-run mode".to_string(),
            });
        }

        let id = effect.resource_id().clone();
        self.execute_effect(effect)
            .await
            .map_err(|e| e.for_resource(id))
    }

    async fn execute_effect(&self, effect: &Effect) -> ProviderResult<EffectOutcome> {
        match effect {
            Effect::Read(resource) => {
                let state = self.provider.read_data_source(resource).await?;
                Ok(EffectOutcome::Read { state })
            }
            Effect::Create(resource) => {
                let state = self.provider.create(resource).await?;
                info!("{}: created", resource.id);
                Ok(EffectOutcome::Created { state })
            }
            Effect::Update { id, from, to, .. } => {
                let identifier = from.identifier.as_deref().unwrap_or("");
                let state = self.provider.update(id, identifier, from, to).await?;
                info!("{}: updated", id);
                Ok(EffectOutcome::Updated { state })
            }
            Effect::Replace { id, from, to, .. } => {
                let identifier = from.identifier.as_deref().unwrap_or("");
                ignore_not_found(self.provider.delete(id, identifier, &from.attributes).await)?;
                let state = self.provider.create(to).await?;
                info!("{}: replaced", id);
                Ok(EffectOutcome::Replaced { state })
            }
            Effect::Delete {
                id,
                identifier,
                attributes,
            } => {
                ignore_not_found(self.provider.delete(id, identifier, attributes).await)?;
                info!("{}: deleted", id);
                Ok(EffectOutcome::Deleted)
            }
        }
    }
}
