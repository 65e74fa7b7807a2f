//! # Evaluator
//!
//! Reduces a core term to a [`Value`] under an [`EffectPolicy`].
//!
//! ## Strategy
//!
//! Call by value, left to right. Environments are persistent ([`Scope`] for
//! de Bruijn indices, [`Environment`] for names). The only mutable state is
//! the fuel budget of a running fixed point, created per outermost call, so
//! independent runs may proceed on separate threads over the same term.
//!
//! ## Fixed Points
//!
//! A fixed point is unrolled one activation at a time. Before every
//! activation its guard is checked:
//!
//! - **fuel**: every activation below one outermost call spends from a single
//!   budget, so a branching recursion cannot unroll more often in total than
//!   its recorded bound plus the outermost activation,
//! - **measure**: the member's measure must be a natural number strictly below
//!   the measure of the activation that made the call,
//! - **structural**: the decreasing argument must be structurally smaller
//!   than in the activation that made the call.
//!
//! A failed check is a `TerminationViolation`; it means the proof the term
//! carries was wrong, which the analyzer should never let happen.
//!
//! ## Effects
//!
//! Every `Perform` consults the run's policy, which in turn talks to a
//! [`Host`]. Tests substitute their own host to observe or forbid real I/O.
//!
//! ## Reference Interpreter
//!
//! [`evaluate_reference`] runs an unchecked program tree directly. It shares
//! operators and effect handling with the core evaluator and exists to check
//! that encoding preserves meaning.

mod effects;
mod environment;
mod eval;
mod host;
mod ops;
mod reference;
mod runtime;
mod scope;
mod value;

use std::fmt;

use thiserror::Error;
use tracing::debug;

use crate::ast::Location;
use crate::core::CoreTerm;

pub use effects::{default_mocks, EffectPolicy, PURE_ENV_MOCK, PURE_FILE_MOCK};
pub use environment::{Environment, RecMember};
pub use host::{Host, SystemHost};
pub use reference::evaluate_reference;
pub use runtime::RValue;
pub use scope::Scope;
pub use value::{Closure, ClosureData, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeErrorKind {
    NotCallable,
    UnboundVariable,
    EffectNotMocked,
    EffectForbidden,
    TerminationViolation,
    InvalidOperand,
    EffectFailed,
    /// The result still contains a function.
    NotData,
}

impl fmt::Display for RuntimeErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            RuntimeErrorKind::NotCallable => "NotCallable",
            RuntimeErrorKind::UnboundVariable => "UnboundVariable",
            RuntimeErrorKind::EffectNotMocked => "EffectNotMocked",
            RuntimeErrorKind::EffectForbidden => "EffectForbidden",
            RuntimeErrorKind::TerminationViolation => "TerminationViolation",
            RuntimeErrorKind::InvalidOperand => "InvalidOperand",
            RuntimeErrorKind::EffectFailed => "EffectFailed",
            RuntimeErrorKind::NotData => "NotData",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{location}: {kind}: {message}")]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub location: Location,
    pub message: String,
}

impl RuntimeError {
    pub fn new(kind: RuntimeErrorKind, location: &Location, message: impl Into<String>) -> Self {
        RuntimeError {
            kind,
            location: location.clone(),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> RuntimeErrorKind {
        self.kind
    }

    pub fn location(&self) -> &Location {
        &self.location
    }
}

/// What every step of a run can see: the policy, the host, and the location
/// of the innermost located term being reduced.
pub(crate) struct Context<'r> {
    pub policy: &'r EffectPolicy,
    pub host: &'r dyn Host,
    pub location: Location,
    /// Fixed-point activations so far.
    pub activations: u64,
}

impl<'r> Context<'r> {
    pub fn new(policy: &'r EffectPolicy, host: &'r dyn Host) -> Self {
        Context {
            policy,
            host,
            location: Location::default(),
            activations: 0,
        }
    }

    pub fn error(&self, kind: RuntimeErrorKind, message: impl Into<String>) -> RuntimeError {
        RuntimeError::new(kind, &self.location, message)
    }
}

/// Evaluates a core term against the real host.
pub fn evaluate(term: &CoreTerm, policy: &EffectPolicy) -> Result<Value, RuntimeError> {
    evaluate_with_host(term, policy, &SystemHost::default())
}

pub fn evaluate_with_host(
    term: &CoreTerm,
    policy: &EffectPolicy,
    host: &dyn Host,
) -> Result<Value, RuntimeError> {
    let mut cx = Context::new(policy, host);
    let value = term.eval(&Scope::empty(), &mut cx)?;
    debug!(
        policy = policy.name(),
        activations = cx.activations,
        "evaluated core term"
    );
    let kind = value.type_name();
    value.into_data().ok_or_else(|| {
        cx.error(
            RuntimeErrorKind::NotData,
            format!("the result ({kind}) contains a function"),
        )
    })
}
