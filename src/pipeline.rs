//! # Pipeline
//!
//! Runs the stages in order:
//!
//! ```text
//! ProgramNode<()> → check → analyze → encode → evaluate → Value
//! ```
//!
//! Each stage is a pure function of its input; the first error aborts the
//! run. [`Pipeline`] exposes the stages one by one for callers that want the
//! intermediate trees, [`run`] chains them.

use tracing::{debug, info, trace};

use crate::ast::ProgramNode;
use crate::config::PipelineConfig;
use crate::core::{self, CoreTerm};
use crate::error::PipelineError;
use crate::interpreter::{self, EffectPolicy, Host, SystemHost, Value};
use crate::termination::{self, ProvenTree};
use crate::types::{self, TypedTree};

/// A configured pipeline. Holds no per-run state, so one instance may serve
/// any number of runs, also from several threads.
#[derive(Debug, Clone, Default)]
pub struct Pipeline {
    config: PipelineConfig,
    policy: EffectPolicy,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        let policy = EffectPolicy::from_config(&config.effects);
        Pipeline { config, policy }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn policy(&self) -> &EffectPolicy {
        &self.policy
    }

    pub fn check<T>(&self, tree: &ProgramNode<T>) -> Result<TypedTree, PipelineError> {
        let typed = types::check(tree, self.config.typing)?;
        debug!(discipline = %self.config.typing, ty = %typed.info(), "checked");
        Ok(typed)
    }

    pub fn analyze(&self, tree: &TypedTree) -> Result<ProvenTree, PipelineError> {
        Ok(termination::analyze(tree)?)
    }

    pub fn encode(&self, tree: &ProvenTree) -> Result<CoreTerm, PipelineError> {
        let term = core::encode(tree)?;
        trace!(term = %term, "core term");
        Ok(term)
    }

    pub fn evaluate(&self, term: &CoreTerm, host: &dyn Host) -> Result<Value, PipelineError> {
        Ok(interpreter::evaluate_with_host(term, &self.policy, host)?)
    }

    /// Runs every stage against `host`.
    pub fn run_with_host<T>(
        &self,
        tree: &ProgramNode<T>,
        host: &dyn Host,
    ) -> Result<Value, PipelineError> {
        let typed = self.check(tree)?;
        let proven = self.analyze(&typed)?;
        let term = self.encode(&proven)?;
        let value = self.evaluate(&term, host)?;
        info!(
            discipline = %self.config.typing,
            policy = self.policy.name(),
            result = value.type_name(),
            "run finished"
        );
        Ok(value)
    }

    pub fn run<T>(&self, tree: &ProgramNode<T>) -> Result<Value, PipelineError> {
        let host = SystemHost::new(self.config.effects.network_timeout());
        self.run_with_host(tree, &host)
    }
}

/// Runs `tree` through the whole pipeline under `config`.
pub fn run<T>(tree: &ProgramNode<T>, config: &PipelineConfig) -> Result<Value, PipelineError> {
    Pipeline::new(config.clone()).run(tree)
}

pub fn run_with_host<T>(
    tree: &ProgramNode<T>,
    config: &PipelineConfig,
    host: &dyn Host,
) -> Result<Value, PipelineError> {
    Pipeline::new(config.clone()).run_with_host(tree, host)
}
