use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use crate::ast::Location;
use crate::core::{CoreTerm, FixMember};

use super::scope::Scope;
use super::value::Value;

/// Values while a core term is being reduced.
pub type RValue<'t> = Value<Callable<'t>>;

/// The non-data values of the core evaluator.
#[derive(Debug, Clone)]
pub enum Callable<'t> {
    /// `\x. body` closed over `env`.
    Closure {
        body: &'t CoreTerm,
        env: Scope<'t>,
    },
    /// A fixed point together with the guard state of one activation.
    Fix(Arc<FixValue<'t>>, GuardState),
    /// The packed arguments of a call to a recursive group member.
    Packed {
        name: &'t str,
        args: Vec<RValue<'t>>,
    },
}

impl PartialEq for Callable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (
                Callable::Closure { body: a, env: _ },
                Callable::Closure { body: b, env: _ },
            ) => std::ptr::eq(*a, *b),
            (Callable::Fix(a, sa), Callable::Fix(b, sb)) => Arc::ptr_eq(a, b) && sa == sb,
            (
                Callable::Packed { name: a, args: x },
                Callable::Packed { name: b, args: y },
            ) => a == b && x == y,
            _ => false,
        }
    }
}

/// The shared part of a fixed point: what every activation needs.
#[derive(Debug)]
pub struct FixValue<'t> {
    /// `\self. ...`, evaluating to the function over packed inputs.
    pub body: &'t CoreTerm,
    pub env: Scope<'t>,
    pub members: &'t [FixMember],
    pub check: FixCheck<'t>,
    pub location: Location,
}

/// What is checked on every unrolling.
#[derive(Debug)]
pub enum FixCheck<'t> {
    /// Unrollings allowed to one outermost call, counting every branch.
    Fuel(i64),
    Measure(&'t [CoreTerm]),
    Structural(&'t [usize]),
}

#[derive(Debug, Clone)]
pub enum GuardState {
    /// The budget shared by every activation below one outermost call,
    /// `None` before that call starts.
    Fuel(Option<Arc<FuelBudget>>),
    /// Measure of the enclosing activation, `None` for the outermost call.
    Below(Option<u64>),
}

impl PartialEq for GuardState {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (GuardState::Fuel(Some(a)), GuardState::Fuel(Some(b))) => Arc::ptr_eq(a, b),
            (GuardState::Fuel(None), GuardState::Fuel(None)) => true,
            (GuardState::Below(a), GuardState::Below(b)) => a == b,
            _ => false,
        }
    }
}

/// Remaining unrollings; negative means exhausted.
#[derive(Debug)]
pub struct FuelBudget(AtomicI64);

impl FuelBudget {
    pub fn new(fuel: i64) -> Self {
        FuelBudget(AtomicI64::new(fuel))
    }

    /// Spends one unrolling and returns what was left before it.
    pub fn burn(&self) -> i64 {
        self.0.fetch_sub(1, Ordering::Relaxed)
    }
}
